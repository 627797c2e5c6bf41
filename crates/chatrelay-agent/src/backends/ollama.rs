use super::{http_client, LlmBackend};
use crate::config::ModelConfig;
use async_trait::async_trait;
use chatrelay_core::{GenerationResult, RelayError, RelayResult};
use serde::{Deserialize, Serialize};

/// Ollama backend using the non-streaming `/api/generate` endpoint.
///
/// The composed prompt is sent verbatim as a raw completion prompt; the
/// reported `eval_count` (tokens produced) becomes the token usage.
pub struct OllamaBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaBackend {
    /// Backend for the Ollama server `config` points at.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: http_client(),
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> RelayResult<GenerationResult> {
        let url = format!("{}/api/generate", self.config.base_url());
        let body = GenerateRequest {
            model: &self.config.model_id,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Http(format!("Ollama request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RelayError::Http(e.to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            return Err(RelayError::Http(format!(
                "Ollama API error {status}: {detail}"
            )));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)?;
        Ok(GenerationResult::new(parsed.response, parsed.eval_count))
    }
}

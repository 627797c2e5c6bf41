use super::{http_client, LlmBackend};
use crate::config::{LlmProvider, ModelConfig};
use async_trait::async_trait;
use chatrelay_core::{GenerationResult, RelayError, RelayResult};

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, OpenRouter, Groq, and any other provider that
/// implements the chat completions API. The composed prompt is sent as a
/// single user message.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// Backend for an OpenAI-compatible endpoint.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: http_client(),
        }
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter requires extra headers
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request.header("X-Title", "chatrelay")
        } else {
            request
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> RelayResult<GenerationResult> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let request = self.add_provider_headers(self.http.post(&url));

        let resp = request
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RelayError::Http(e.to_string()))?;

        // Gateways in front of the API answer errors with HTML, not JSON.
        if !status.is_success() {
            return Err(RelayError::Http(format!("OpenAI API error {status}: {text}")));
        }

        let resp_body: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| RelayError::Http(format!("OpenAI response is not JSON: {e}")))?;
        parse_openai_response(&resp_body)
    }
}

/// Extract the reply text and completion token count from a response body.
pub fn parse_openai_response(body: &serde_json::Value) -> RelayResult<GenerationResult> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| RelayError::Http(format!("OpenAI response has no content: {body}")))?;
    let usage = body["usage"]["completion_tokens"].as_u64();
    Ok(GenerationResult::new(content, usage))
}

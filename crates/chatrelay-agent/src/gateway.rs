use crate::backends::ollama::OllamaBackend;
use crate::backends::openai::OpenAiBackend;
use crate::backends::LlmBackend;
use crate::config::{LlmProvider, ModelConfig};
use chatrelay_core::{GenerationResult, RelayError, RelayResult};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Generation gateway: dispatches a composed prompt to the configured backend.
///
/// The gateway performs no retries. Every backend failure, including an
/// expired timeout, comes back as [`RelayError::Generation`] carrying the
/// backend's own error text.
pub struct GenerationGateway {
    backend: Box<dyn LlmBackend>,
    timeout: Option<Duration>,
}

impl GenerationGateway {
    /// Build the backend that `config.provider` names.
    pub fn new(config: ModelConfig) -> Self {
        let timeout = config.timeout();
        let backend: Box<dyn LlmBackend> = match config.provider {
            LlmProvider::Ollama => Box::new(OllamaBackend::new(config)),
            LlmProvider::OpenAi | LlmProvider::OpenRouter | LlmProvider::Groq => {
                Box::new(OpenAiBackend::new(config))
            }
        };
        Self { backend, timeout }
    }

    /// Create from a pre-built backend (for custom providers and tests).
    pub fn from_backend(backend: Box<dyn LlmBackend>) -> Self {
        Self {
            backend,
            timeout: None,
        }
    }

    /// Bound each call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Name of the underlying backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Generate a reply for a fully composed prompt.
    pub async fn generate(&self, prompt: &str) -> RelayResult<GenerationResult> {
        let started = Instant::now();
        let call = self.backend.generate(prompt);

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(RelayError::Generation(format!(
                    "{} backend timed out after {:?}",
                    self.backend.name(),
                    limit
                ))),
            },
            None => call.await,
        };

        match outcome {
            Ok(result) => {
                debug!(
                    backend = self.backend.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    token_usage = ?result.token_usage,
                    "Generation completed"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "Generation failed");
                Err(into_generation_error(e))
            }
        }
    }
}

fn into_generation_error(err: RelayError) -> RelayError {
    match err {
        RelayError::Generation(msg) => RelayError::Generation(msg),
        RelayError::Http(msg) => RelayError::Generation(msg),
        other => RelayError::Generation(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatrelay_core::ErrorKind;

    struct SlowBackend;

    #[async_trait]
    impl LlmBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _prompt: &str) -> RelayResult<GenerationResult> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(GenerationResult::new("late", None))
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl LlmBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _prompt: &str) -> RelayResult<GenerationResult> {
            Err(RelayError::Http("model 'x' not found".into()))
        }
    }

    #[tokio::test]
    async fn test_timeout_becomes_generation_error() {
        let gateway = GenerationGateway::from_backend(Box::new(SlowBackend))
            .with_timeout(Duration::from_millis(50));
        let err = gateway.generate("hi").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generation);
        assert!(err.to_string().contains("slow backend timed out"));
    }

    #[tokio::test]
    async fn test_backend_error_text_preserved() {
        let gateway = GenerationGateway::from_backend(Box::new(FailingBackend));
        let err = gateway.generate("hi").await.unwrap_err();
        assert!(matches!(err, RelayError::Generation(ref m) if m == "model 'x' not found"));
    }

    #[test]
    fn test_provider_selection() {
        let gateway = GenerationGateway::new(ModelConfig::default());
        assert_eq!(gateway.backend_name(), "ollama");

        let openai = GenerationGateway::new(ModelConfig {
            provider: LlmProvider::Groq,
            ..ModelConfig::default()
        });
        assert_eq!(openai.backend_name(), "openai");
    }
}

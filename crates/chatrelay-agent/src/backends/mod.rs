/// Ollama `/api/generate` backend.
pub mod ollama;
/// OpenAI-compatible chat completions backend.
pub mod openai;

use async_trait::async_trait;
use chatrelay_core::{GenerationResult, RelayResult};

/// Trait for text-generation backends.
///
/// A backend turns one fully composed prompt into one reply. It reports its
/// own failures however it likes; the gateway is responsible for mapping them
/// into the session layer's vocabulary.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `LlmBackend` for your struct
/// 3. Add the variant to `LlmProvider` in `config.rs`
/// 4. Wire it up in `GenerationGateway::new()` in `gateway.rs`
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Generate a reply for `prompt`.
    async fn generate(&self, prompt: &str) -> RelayResult<GenerationResult>;
}

/// Shared HTTP client construction: bounded connect time, no overall timeout
/// (the gateway owns that).
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

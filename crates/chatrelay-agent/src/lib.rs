//! Generation gateway for chatrelay.
//!
//! The [`GenerationGateway`] is the single translation boundary between the
//! session layer and a text-generation backend. Backends implement
//! [`LlmBackend`]; the gateway applies the configured timeout and folds every
//! backend failure into [`chatrelay_core::RelayError::Generation`].

/// Provider backends.
pub mod backends;
/// Model and provider configuration.
pub mod config;
/// The gateway itself.
pub mod gateway;

pub use backends::LlmBackend;
pub use config::{LlmProvider, ModelConfig};
pub use gateway::GenerationGateway;

//! Core types and error definitions for chatrelay.
//!
//! This crate provides the vocabulary shared by every chatrelay crate: the
//! unified error type, the identity of a conversing user, a single exchange
//! in a conversation, and the normalized result of a generation call.
//!
//! # Main types
//!
//! - [`RelayError`]: Unified error enum for all chatrelay subsystems.
//! - [`RelayResult`]: Convenience alias for `Result<T, RelayError>`.
//! - [`UserId`]: Opaque identity supplied by the chat transport.
//! - [`Turn`]: One (user message, AI reply) pair.
//! - [`GenerationResult`]: Text plus the backend-reported token usage.

/// Error types shared across the workspace.
pub mod error;
/// Conversation primitives.
pub mod message;

pub use error::{ErrorKind, RelayError, RelayResult};
pub use message::{GenerationResult, Turn, UserId};

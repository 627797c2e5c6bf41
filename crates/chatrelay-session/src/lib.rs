//! Session and history management for chatrelay.
//!
//! - [`Transcript`]: bounded, ordered list of turns.
//! - [`HistoryStore`]: durable per-user persistence, with
//!   [`SqliteHistoryStore`], [`FileHistoryStore`] and [`InMemoryHistoryStore`].
//! - [`SessionManager`]: enforces the window, composes prompts, and
//!   serializes each user's read-modify-write through [`UserLocks`].

/// Session policy.
pub mod config;
/// Per-user serialization.
pub mod locks;
/// Turn handling and role management.
pub mod manager;
/// Prompt composition.
pub mod prompt;
/// Stored per-user state.
pub mod session;
/// SQLite history store.
#[cfg(feature = "sqlite")]
pub mod sqlite;
/// Store trait and the file and in-memory stores.
pub mod store;
/// Bounded turn history.
pub mod transcript;

pub use config::{SessionConfig, DEFAULT_WINDOW};
pub use locks::UserLocks;
pub use manager::{SessionManager, TurnReply};
pub use prompt::{compose_prompt, DEFAULT_ROLE};
pub use session::UserSession;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteHistoryStore;
pub use store::{FileHistoryStore, HistoryStore, InMemoryHistoryStore};
pub use transcript::Transcript;

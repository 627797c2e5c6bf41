use crate::transcript::Transcript;
use chatrelay_core::{Turn, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The persisted state of one user: their role and retained transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    /// Owner of this session.
    pub user_id: UserId,
    /// Persona prepended to every prompt.
    pub role: String,
    /// Retained turns, oldest first.
    pub transcript: Transcript,
    /// Time of the last recorded change.
    pub updated_at: DateTime<Utc>,
}

impl UserSession {
    /// A session with the given role and an empty transcript.
    pub fn new(user_id: UserId, role: impl Into<String>) -> Self {
        Self {
            user_id,
            role: role.into(),
            transcript: Transcript::new(),
            updated_at: Utc::now(),
        }
    }

    /// Record a completed turn, keeping at most `window` turns.
    pub fn record_turn(&mut self, turn: Turn, window: usize) -> usize {
        self.updated_at = Utc::now();
        self.transcript.push_bounded(turn, window)
    }

    /// Number of retained turns.
    pub fn turn_count(&self) -> usize {
        self.transcript.len()
    }
}

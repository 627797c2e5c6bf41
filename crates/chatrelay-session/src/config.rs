use crate::prompt::DEFAULT_ROLE;
use chatrelay_core::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};

/// Maximum number of turns kept per user unless configured otherwise.
pub const DEFAULT_WINDOW: usize = 10;

/// Session policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Turns retained per user; older turns are evicted first.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Role used for users who never set one.
    #[serde(default = "default_role")]
    pub default_role: String,
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            default_role: default_role(),
        }
    }
}

impl SessionConfig {
    /// Reject a zero window or a blank default role.
    pub fn validate(&self) -> RelayResult<()> {
        if self.window == 0 {
            return Err(RelayError::Config(
                "session.window must be at least 1".to_string(),
            ));
        }
        if self.default_role.trim().is_empty() {
            return Err(RelayError::Config(
                "session.default_role must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

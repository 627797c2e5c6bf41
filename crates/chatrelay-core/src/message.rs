use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a conversing user, as supplied by the chat transport.
///
/// Telegram user ids are signed 64-bit integers; other transports map their
/// identities onto the same space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// The raw integer value.
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

/// One exchange in a conversation: what the user said and what the AI replied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// The user's message text.
    #[serde(rename = "user")]
    pub user_text: String,
    /// The generated reply.
    #[serde(rename = "ai")]
    pub ai_text: String,
}

impl Turn {
    /// Creates a new turn.
    pub fn new(user_text: impl Into<String>, ai_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            ai_text: ai_text.into(),
        }
    }
}

/// Normalized output of a generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// The generated text.
    pub text: String,
    /// Backend-reported token usage, passed through opaquely. `None` when the
    /// backend does not report it.
    #[serde(default)]
    pub token_usage: Option<u64>,
}

impl GenerationResult {
    /// Creates a result with the given text and usage.
    pub fn new(text: impl Into<String>, token_usage: Option<u64>) -> Self {
        Self {
            text: text.into(),
            token_usage,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_parse_and_display() {
        let id: UserId = " 123456789 ".parse().unwrap();
        assert_eq!(id, UserId(123_456_789));
        assert_eq!(id.to_string(), "123456789");
        assert!("alice".parse::<UserId>().is_err());
    }

    #[test]
    fn test_turn_serializes_with_short_keys() {
        let turn = Turn::new("Hello", "Hi there!");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json, serde_json::json!({"user": "Hello", "ai": "Hi there!"}));
    }
}

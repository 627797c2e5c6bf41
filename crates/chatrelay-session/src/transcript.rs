use chatrelay_core::{RelayError, RelayResult, Turn};
use serde::{Deserialize, Serialize};

/// The ordered turns retained for one user, oldest first.
///
/// Persisted as a JSON array of `{"user": .., "ai": ..}` objects, so any text
/// (markers, newlines, quotes) round-trips exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// An empty transcript.
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Wrap `turns` as-is, oldest first.
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    /// Append `turn`, then evict the oldest turns until at most `window`
    /// remain. Returns the number of evicted turns.
    pub fn push_bounded(&mut self, turn: Turn, window: usize) -> usize {
        self.turns.push(turn);
        self.truncate(window)
    }

    /// Drop oldest turns until at most `window` remain.
    pub fn truncate(&mut self, window: usize) -> usize {
        if self.turns.len() > window {
            let excess = self.turns.len() - window;
            self.turns.drain(..excess);
            excess
        } else {
            0
        }
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether there are no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Turns oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    /// The turns as a slice, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The most recent turn.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Encode for the store boundary.
    pub fn to_json(&self) -> RelayResult<String> {
        Ok(serde_json::to_string(&self.turns)?)
    }

    /// Decode from the store boundary. A blank column is an empty transcript.
    pub fn from_json(data: &str) -> RelayResult<Self> {
        if data.trim().is_empty() {
            return Ok(Self::new());
        }
        let turns: Vec<Turn> = serde_json::from_str(data)
            .map_err(|e| RelayError::Store(format!("Failed to parse transcript: {e}")))?;
        Ok(Self { turns })
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

use crate::config::SessionConfig;
use crate::locks::UserLocks;
use crate::prompt::compose_prompt;
use crate::session::UserSession;
use crate::store::HistoryStore;
use chatrelay_agent::GenerationGateway;
use chatrelay_core::{RelayError, RelayResult, Turn, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a successful turn hands back to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    /// The generated reply.
    pub text: String,
    /// Token usage reported by the backend, if any.
    pub token_usage: Option<u64>,
    /// Turns stored for the user after this one was recorded.
    pub retained_turns: usize,
}

/// Mediates every read and write of user sessions.
///
/// Holds no session state of its own: each operation re-reads the store and
/// writes the result back in a single `put`. Mutating operations for the same
/// user are serialized through [`UserLocks`]; the lock is held across the
/// whole turn, generation included, so one user's requests run in order.
pub struct SessionManager {
    store: Arc<dyn HistoryStore>,
    gateway: Arc<GenerationGateway>,
    locks: UserLocks,
    config: SessionConfig,
}

impl SessionManager {
    /// Wire a manager over `store` and `gateway`; fails on an invalid `config`.
    pub fn new(
        store: Arc<dyn HistoryStore>,
        gateway: Arc<GenerationGateway>,
        config: SessionConfig,
    ) -> RelayResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            gateway,
            locks: UserLocks::new(),
            config,
        })
    }

    /// The active session policy.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The user's stored role, or `None` when no session exists.
    pub async fn get_role(&self, user_id: UserId) -> RelayResult<Option<String>> {
        Ok(self.store.get(user_id).await?.map(|s| s.role))
    }

    /// The user's full stored session, if any.
    pub async fn get_session(&self, user_id: UserId) -> RelayResult<Option<UserSession>> {
        self.store.get(user_id).await
    }

    /// Replace the user's role. The transcript is reset to empty.
    pub async fn set_role(&self, user_id: UserId, role: &str) -> RelayResult<()> {
        if role.trim().is_empty() {
            return Err(RelayError::Validation(
                "role must not be empty".to_string(),
            ));
        }

        let _guard = self.locks.acquire(user_id).await;
        self.store.put(&UserSession::new(user_id, role)).await?;
        info!(user_id = %user_id, role_len = role.len(), "Role set, history reset");
        Ok(())
    }

    /// Remove the user's session entirely.
    pub async fn clear_history(&self, user_id: UserId) -> RelayResult<()> {
        let _guard = self.locks.acquire(user_id).await;
        self.store.clear(user_id).await?;
        info!(user_id = %user_id, "History cleared");
        Ok(())
    }

    /// Run one conversational turn.
    ///
    /// Nothing is written unless generation succeeds; on success the new turn
    /// is appended, the window enforced and the session persisted in one put.
    pub async fn handle_turn(&self, user_id: UserId, user_text: &str) -> RelayResult<TurnReply> {
        let _guard = self.locks.acquire(user_id).await;

        let mut session = self
            .store
            .get(user_id)
            .await?
            .unwrap_or_else(|| UserSession::new(user_id, self.config.default_role.as_str()));

        let prompt = compose_prompt(&session.role, &session.transcript, user_text);
        debug!(
            user_id = %user_id,
            prior_turns = session.turn_count(),
            prompt_len = prompt.len(),
            "Composed prompt"
        );

        let result = self.gateway.generate(&prompt).await.inspect_err(|e| {
            warn!(user_id = %user_id, error = %e, "Turn not recorded");
        })?;

        let evicted = session.record_turn(
            Turn::new(user_text, result.text.as_str()),
            self.config.window,
        );
        self.store.put(&session).await?;

        info!(
            user_id = %user_id,
            turns = session.turn_count(),
            evicted,
            token_usage = ?result.token_usage,
            "Turn recorded"
        );

        Ok(TurnReply {
            text: result.text,
            token_usage: result.token_usage,
            retained_turns: session.turn_count(),
        })
    }
}

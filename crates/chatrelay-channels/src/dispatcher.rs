use crate::channel::{Channel, ChannelEvent, ChannelMessage};
use crate::command::Command;
use chatrelay_core::{ErrorKind, RelayError, UserId};
use chatrelay_session::SessionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const WELCOME: &str = "Hi! I'm a chat bot backed by a language model. Send me your question.";
const ROLE_MISSING: &str = "Enter a role after the command.";
const NO_ROLE: &str = "No role set.\nSet one with /setrole [role]";
const PLEASE_WAIT: &str = "Generating a reply, please wait...";

/// Presentation switches for dispatcher replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Send model replies with Markdown formatting.
    #[serde(default = "default_true")]
    pub markdown: bool,
    /// Follow each reply with a "Tokens used" line when usage is known.
    #[serde(default = "default_true")]
    pub show_token_usage: bool,
    /// Send a notice before generation starts.
    #[serde(default = "default_true")]
    pub progress_notice: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            markdown: true,
            show_token_usage: true,
            progress_notice: true,
        }
    }
}

/// Routes inbound chat messages to the [`SessionManager`] and sends the
/// outcome back through the originating [`Channel`].
pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    channel: Arc<dyn Channel>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Route messages from `channel` to `sessions`.
    pub fn new(
        sessions: Arc<SessionManager>,
        channel: Arc<dyn Channel>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            sessions,
            channel,
            config,
        }
    }

    /// Consume channel events until the sender side closes.
    ///
    /// Each message is handled on its own task, so a slow generation for one
    /// user never delays replies to another.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ChannelEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::MessageReceived(msg) => {
                    let dispatcher = Arc::clone(&self);
                    tokio::spawn(async move { dispatcher.handle(msg).await });
                }
                ChannelEvent::Connected(name) => info!(channel = %name, "Channel connected"),
                ChannelEvent::Disconnected(name) => warn!(channel = %name, "Channel disconnected"),
            }
        }
        info!("Event stream closed, dispatcher stopping");
    }

    /// Handle one inbound message to completion, replies included.
    pub async fn handle(&self, msg: ChannelMessage) {
        let Some(user_id) = sender_of(&msg) else {
            warn!(
                channel_id = %msg.channel_id,
                sender_id = %msg.sender_id,
                "Dropping message without a numeric sender"
            );
            return;
        };

        match Command::parse(&msg.content) {
            Command::Start => self.reply(&msg, WELCOME).await,
            Command::Clear => match self.sessions.clear_history(user_id).await {
                Ok(()) => self.reply(&msg, "History cleared!").await,
                Err(e) => self.report(&msg, user_id, &e).await,
            },
            Command::SetRole(role) => match self.sessions.set_role(user_id, &role).await {
                Ok(()) => self.reply(&msg, format!("New role set: {role}")).await,
                Err(RelayError::Validation(_)) => self.reply(&msg, ROLE_MISSING).await,
                Err(e) => self.report(&msg, user_id, &e).await,
            },
            Command::GetRole => match self.sessions.get_role(user_id).await {
                Ok(Some(role)) => self.reply(&msg, format!("Current role: {role}")).await,
                Ok(None) => self.reply(&msg, NO_ROLE).await,
                Err(e) => self.report(&msg, user_id, &e).await,
            },
            Command::Text(text) => self.converse(&msg, user_id, &text).await,
        }
    }

    async fn converse(&self, msg: &ChannelMessage, user_id: UserId, text: &str) {
        if self.config.progress_notice {
            self.reply(msg, PLEASE_WAIT).await;
        }

        match self.sessions.handle_turn(user_id, text).await {
            Ok(reply) => {
                self.send(ChannelMessage::reply_to(msg, reply.text).with_markdown(self.config.markdown))
                    .await;
                if let (true, Some(tokens)) = (self.config.show_token_usage, reply.token_usage) {
                    self.reply(msg, format!("Tokens used: {tokens}")).await;
                }
                info!(user_id = %user_id, "Reply sent");
            }
            Err(e) => self.report(msg, user_id, &e).await,
        }
    }

    async fn report(&self, msg: &ChannelMessage, user_id: UserId, error: &RelayError) {
        warn!(user_id = %user_id, error = %error, "Request failed");
        self.reply(msg, describe_error(error)).await;
    }

    async fn reply(&self, to: &ChannelMessage, content: impl Into<String>) {
        self.send(ChannelMessage::reply_to(to, content)).await;
    }

    async fn send(&self, message: ChannelMessage) {
        let channel_id = message.channel_id.clone();
        match self.channel.send(message).await {
            Ok(()) => debug!(channel = self.channel.name(), channel_id = %channel_id, "Sent"),
            Err(e) => warn!(
                channel = self.channel.name(),
                channel_id = %channel_id,
                error = %e,
                "Failed to deliver reply"
            ),
        }
    }
}

/// The user a message belongs to. Private chats carry no separate sender in
/// some updates, so the chat id stands in.
fn sender_of(msg: &ChannelMessage) -> Option<UserId> {
    msg.sender_id
        .parse()
        .or_else(|_| msg.channel_id.parse())
        .ok()
}

/// Human-readable text for a failed request.
pub fn describe_error(error: &RelayError) -> String {
    match error.kind() {
        ErrorKind::Generation => format!("An error occurred: {error}"),
        ErrorKind::Store => {
            "Your conversation history is unavailable right now. Please try again later."
                .to_string()
        }
        ErrorKind::Validation => error.to_string(),
        ErrorKind::Config | ErrorKind::Channel => format!("An error occurred: {error}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatrelay_agent::{GenerationGateway, LlmBackend};
    use chatrelay_core::{GenerationResult, RelayResult};
    use chatrelay_session::{InMemoryHistoryStore, SessionConfig};
    use tokio::sync::Mutex;

    /// Records every outbound message.
    #[derive(Default)]
    struct MockChannel {
        sent: Mutex<Vec<ChannelMessage>>,
    }

    impl MockChannel {
        async fn texts(&self) -> Vec<String> {
            self.sent.lock().await.iter().map(|m| m.content.clone()).collect()
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        fn name(&self) -> &str {
            "mock"
        }

        async fn send(&self, message: ChannelMessage) -> RelayResult<()> {
            self.sent.lock().await.push(message);
            Ok(())
        }
    }

    /// Replies with fixed Markdown, or fails when the message ends in "fail".
    struct FakeBackend;

    #[async_trait]
    impl LlmBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }

        async fn generate(&self, prompt: &str) -> RelayResult<GenerationResult> {
            if prompt.ends_with("fail\nAI:") {
                return Err(RelayError::Generation("model exploded".into()));
            }
            Ok(GenerationResult::new("**hi**", Some(7)))
        }
    }

    fn setup(config: DispatcherConfig) -> (Dispatcher, Arc<MockChannel>) {
        let gateway = GenerationGateway::from_backend(Box::new(FakeBackend));
        let sessions = SessionManager::new(
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(gateway),
            SessionConfig::default(),
        )
        .unwrap();
        let channel = Arc::new(MockChannel::default());
        let dispatcher = Dispatcher::new(Arc::new(sessions), channel.clone(), config);
        (dispatcher, channel)
    }

    fn inbound(text: &str) -> ChannelMessage {
        ChannelMessage {
            channel_id: "42".into(),
            sender_id: "42".into(),
            content: text.into(),
            markdown: false,
        }
    }

    #[tokio::test]
    async fn test_start_sends_welcome() {
        let (dispatcher, channel) = setup(DispatcherConfig::default());
        dispatcher.handle(inbound("/start")).await;
        assert_eq!(channel.texts().await, vec![WELCOME.to_string()]);
    }

    #[tokio::test]
    async fn test_turn_sends_notice_reply_and_usage() {
        let (dispatcher, channel) = setup(DispatcherConfig::default());
        dispatcher.handle(inbound("Hello")).await;

        let sent = channel.sent.lock().await.clone();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].content, PLEASE_WAIT);
        assert_eq!(sent[1].content, "**hi**");
        assert!(sent[1].markdown);
        assert_eq!(sent[2].content, "Tokens used: 7");
        assert!(sent.iter().all(|m| m.channel_id == "42"));
    }

    #[tokio::test]
    async fn test_quiet_config_sends_only_reply() {
        let (dispatcher, channel) = setup(DispatcherConfig {
            markdown: false,
            show_token_usage: false,
            progress_notice: false,
        });
        dispatcher.handle(inbound("Hello")).await;

        let sent = channel.sent.lock().await.clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "**hi**");
        assert!(!sent[0].markdown);
    }

    #[tokio::test]
    async fn test_role_commands() {
        let (dispatcher, channel) = setup(DispatcherConfig::default());
        dispatcher.handle(inbound("/getrole")).await;
        dispatcher.handle(inbound("/setrole")).await;
        dispatcher.handle(inbound("/setrole@relay_bot You are a pirate")).await;
        dispatcher.handle(inbound("/getrole")).await;

        assert_eq!(
            channel.texts().await,
            vec![
                NO_ROLE.to_string(),
                ROLE_MISSING.to_string(),
                "New role set: You are a pirate".to_string(),
                "Current role: You are a pirate".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_resets_role() {
        let (dispatcher, channel) = setup(DispatcherConfig::default());
        dispatcher.handle(inbound("/setrole Pirate")).await;
        dispatcher.handle(inbound("/clear")).await;
        dispatcher.handle(inbound("/getrole")).await;

        let texts = channel.texts().await;
        assert_eq!(texts[1], "History cleared!");
        assert_eq!(texts[2], NO_ROLE);
    }

    #[tokio::test]
    async fn test_generation_error_reported_to_user() {
        let (dispatcher, channel) = setup(DispatcherConfig::default());
        dispatcher.handle(inbound("please fail")).await;

        let texts = channel.texts().await;
        assert_eq!(texts.len(), 2);
        assert!(texts[1].contains("model exploded"));
    }

    #[tokio::test]
    async fn test_non_numeric_sender_falls_back_to_chat() {
        let (dispatcher, channel) = setup(DispatcherConfig::default());
        let mut msg = inbound("/start");
        msg.sender_id = String::new();
        dispatcher.handle(msg).await;
        assert_eq!(channel.texts().await.len(), 1);

        let mut msg = inbound("/start");
        msg.sender_id = "anon".into();
        msg.channel_id = "room".into();
        dispatcher.handle(msg).await;
        assert_eq!(channel.texts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_run_handles_events_until_closed() {
        let (dispatcher, channel) = setup(DispatcherConfig::default());
        let (tx, rx) = mpsc::channel(8);
        let runner = tokio::spawn(Arc::new(dispatcher).run(rx));

        tx.send(ChannelEvent::Connected("mock".into())).await.unwrap();
        tx.send(ChannelEvent::MessageReceived(inbound("/start")))
            .await
            .unwrap();
        drop(tx);
        runner.await.unwrap();

        // The message task may still be running after the loop exits.
        for _ in 0..50 {
            if !channel.texts().await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(channel.texts().await, vec![WELCOME.to_string()]);
    }

    #[test]
    fn test_store_errors_are_not_leaked() {
        let text = describe_error(&RelayError::Store("SQLite error: disk I/O".into()));
        assert!(!text.contains("SQLite"));
    }
}

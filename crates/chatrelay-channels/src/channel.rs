use async_trait::async_trait;
use chatrelay_core::RelayResult;
use serde::{Deserialize, Serialize};

/// A message travelling in either direction through a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Conversation to deliver to (Telegram chat id).
    pub channel_id: String,
    /// Author of an inbound message; empty for outbound ones.
    pub sender_id: String,
    /// Message text.
    pub content: String,
    /// Ask the transport to render `content` as Markdown.
    #[serde(default)]
    pub markdown: bool,
}

impl ChannelMessage {
    /// A plain-text reply into the conversation `to` came from.
    pub fn reply_to(to: &ChannelMessage, content: impl Into<String>) -> Self {
        Self {
            channel_id: to.channel_id.clone(),
            sender_id: String::new(),
            content: content.into(),
            markdown: false,
        }
    }

    /// Set the Markdown flag.
    pub fn with_markdown(mut self, markdown: bool) -> Self {
        self.markdown = markdown;
        self
    }
}

/// Something a channel reports to the dispatcher.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A user sent a message.
    MessageReceived(ChannelMessage),
    /// The named channel started receiving.
    Connected(String),
    /// The named channel stopped receiving.
    Disconnected(String),
}

/// A chat platform the relay can reply through.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;
    /// Deliver `message` to `message.channel_id`.
    async fn send(&self, message: ChannelMessage) -> RelayResult<()>;
}

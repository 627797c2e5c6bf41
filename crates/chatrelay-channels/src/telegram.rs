use crate::channel::{Channel, ChannelEvent, ChannelMessage};
use async_trait::async_trait;
use chatrelay_core::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Telegram refuses messages longer than this many characters.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Telegram Bot API channel adapter.
///
/// Uses the Telegram Bot HTTP API for sending messages and long-polling
/// (`getUpdates`) for receiving them. Incoming messages are forwarded
/// through a `tokio::sync::mpsc` channel as [`ChannelEvent`]s.
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
    event_tx: mpsc::Sender<ChannelEvent>,
    event_rx: Option<mpsc::Receiver<ChannelEvent>>,
}

// ── Telegram API response types ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessagePayload>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessagePayload {
    from: Option<TelegramUser>,
    chat: TelegramChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

// ── Implementation ──────────────────────────────────────────────────────────

impl TelegramChannel {
    /// Create a new `TelegramChannel`.
    ///
    /// * `bot_token` – The bot token obtained from @BotFather.
    /// * `event_buffer` – Capacity of the internal mpsc event buffer.
    pub fn new(bot_token: impl Into<String>, event_buffer: usize) -> Self {
        let (event_tx, event_rx) = mpsc::channel(event_buffer);
        Self {
            bot_token: bot_token.into(),
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
            client: reqwest::Client::new(),
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Point the adapter at a different Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Long-poll timeout passed to `getUpdates`.
    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    /// Take the receiving half of the event channel.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.event_rx.take()
    }

    /// Start long-polling the Telegram `getUpdates` endpoint.
    ///
    /// Runs until the event receiver is dropped, forwarding every incoming
    /// text message as a [`ChannelEvent::MessageReceived`]. Network failures
    /// are retried with backoff; an API-level rejection (bad token, conflict
    /// with another poller) ends polling with an error.
    pub async fn poll_updates(&self) -> RelayResult<()> {
        let mut offset: Option<i64> = None;
        let mut backoff = Duration::from_secs(1);

        if self
            .event_tx
            .send(ChannelEvent::Connected("telegram".into()))
            .await
            .is_err()
        {
            return Ok(());
        }

        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => {
                    backoff = Duration::from_secs(1);
                    updates
                }
                Err(RelayError::Http(e)) => {
                    warn!(error = %e, retry_in = ?backoff, "Telegram poll failed");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(30));
                    continue;
                }
                Err(e) => {
                    let _ = self
                        .event_tx
                        .send(ChannelEvent::Disconnected("telegram".into()))
                        .await;
                    return Err(e);
                }
            };

            for update in updates {
                // Advance the offset so we do not receive this update again.
                offset = Some(update.update_id + 1);

                let Some(msg) = update.message else { continue };
                let Some(text) = msg.text else { continue };

                let channel_message = ChannelMessage {
                    channel_id: msg.chat.id.to_string(),
                    sender_id: msg.from.map(|u| u.id.to_string()).unwrap_or_default(),
                    content: text,
                    markdown: false,
                };

                // Best-effort send; if the receiver is dropped we stop.
                if self
                    .event_tx
                    .send(ChannelEvent::MessageReceived(channel_message))
                    .await
                    .is_err()
                {
                    return Ok(());
                }
            }
        }
    }

    async fn get_updates(&self, offset: Option<i64>) -> RelayResult<Vec<TelegramUpdate>> {
        let url = self.api_url("getUpdates");
        let mut params: Vec<(&str, String)> =
            vec![("timeout", self.poll_timeout_secs.to_string())];
        if let Some(off) = offset {
            params.push(("offset", off.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .timeout(Duration::from_secs(self.poll_timeout_secs + 10))
            .send()
            .await
            .map_err(|e| RelayError::Http(format!("Telegram poll error: {e}")))?;

        let body: TelegramResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| RelayError::Http(format!("Telegram parse error: {e}")))?;

        if !body.ok {
            return Err(RelayError::Channel(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }

        Ok(body.result.unwrap_or_default())
    }

    async fn send_chunk(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<&str>,
    ) -> RelayResult<TelegramResponse<serde_json::Value>> {
        let payload = SendMessageRequest {
            chat_id,
            text,
            parse_mode,
        };

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::Channel(format!("Telegram send error: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| RelayError::Channel(format!("Telegram parse error: {e}")))
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

/// Split `text` into pieces Telegram will accept, preferring line breaks.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            for ch in line.chars() {
                if current_len == max_chars {
                    chunks.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                current.push(ch);
                current_len += 1;
            }
        } else {
            current.push_str(line);
            current_len += line_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: ChannelMessage) -> RelayResult<()> {
        let parse_mode = message.markdown.then_some("Markdown");

        for chunk in split_message(&message.content, MAX_MESSAGE_CHARS) {
            let mut body = self
                .send_chunk(&message.channel_id, &chunk, parse_mode)
                .await?;

            // Model output is not guaranteed to be valid Telegram Markdown.
            if !body.ok && parse_mode.is_some() {
                debug!(
                    description = body.description.as_deref().unwrap_or_default(),
                    "Markdown rejected, resending as plain text"
                );
                body = self.send_chunk(&message.channel_id, &chunk, None).await?;
            }

            if !body.ok {
                return Err(RelayError::Channel(format!(
                    "Telegram sendMessage failed: {}",
                    body.description.unwrap_or_default()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reply(chat: &str, text: &str, markdown: bool) -> ChannelMessage {
        ChannelMessage {
            channel_id: chat.into(),
            sender_id: String::new(),
            content: text.into(),
            markdown,
        }
    }

    #[test]
    fn test_split_short_message_untouched() {
        assert_eq!(split_message("hello", 10), vec!["hello".to_string()]);
    }

    #[test]
    fn test_split_prefers_line_breaks() {
        let chunks = split_message("aaaa\nbbbb\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n".to_string(), "cccc".to_string()]);
    }

    #[test]
    fn test_split_long_line_on_char_boundaries() {
        let text = "ж".repeat(25);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[tokio::test]
    async fn test_send_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": "42", "text": "*hi*", "parse_mode": "Markdown"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let channel = TelegramChannel::new("TOKEN", 8).with_api_base(server.uri());
        channel.send(reply("42", "*hi*", true)).await.unwrap();
    }

    #[tokio::test]
    async fn test_markdown_rejection_falls_back_to_plain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(serde_json::json!({"parse_mode": "Markdown"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: can't parse entities"
            })))
            .expect(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let channel = TelegramChannel::new("TOKEN", 8).with_api_base(server.uri());
        channel.send(reply("42", "broken *markdown", true)).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_failure_is_channel_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "ok": false,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .mount(&server)
            .await;

        let channel = TelegramChannel::new("TOKEN", 8).with_api_base(server.uri());
        let err = channel.send(reply("42", "hi", false)).await.unwrap_err();
        assert!(matches!(err, RelayError::Channel(ref m) if m.contains("blocked")));
    }

    #[tokio::test]
    async fn test_poll_forwards_text_messages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botTOKEN/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": [
                    {"update_id": 10, "message": {"message_id": 1, "from": {"id": 7, "first_name": "A"}, "chat": {"id": 7}, "text": "Hello"}},
                    {"update_id": 11, "message": {"message_id": 2, "from": {"id": 7, "first_name": "A"}, "chat": {"id": 7}}}
                ]
            })))
            .mount(&server)
            .await;

        let mut channel = TelegramChannel::new("TOKEN", 8)
            .with_api_base(server.uri())
            .with_poll_timeout(0);
        let mut rx = channel.take_event_receiver().unwrap();
        let poller = tokio::spawn(async move { channel.poll_updates().await });

        assert!(matches!(rx.recv().await, Some(ChannelEvent::Connected(_))));
        match rx.recv().await {
            Some(ChannelEvent::MessageReceived(msg)) => {
                assert_eq!(msg.channel_id, "7");
                assert_eq!(msg.sender_id, "7");
                assert_eq!(msg.content, "Hello");
            }
            other => panic!("expected message, got {other:?}"),
        }

        drop(rx);
        let result = tokio::time::timeout(Duration::from_secs(5), poller)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_poll_rejected_token_returns_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botTOKEN/getUpdates"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "ok": false, "error_code": 401, "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let mut channel = TelegramChannel::new("TOKEN", 8).with_api_base(server.uri());
        let _rx = channel.take_event_receiver().unwrap();
        let err = channel.poll_updates().await.unwrap_err();
        assert!(matches!(err, RelayError::Channel(ref m) if m.contains("Unauthorized")));
    }
}

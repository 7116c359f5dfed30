//! Minimal blocking client for the Telegram Bot API.
//!
//! Two calls cover the whole bridge: `getUpdates` long-polling for the
//! inbound command channel and `sendMessage` for notifications and replies.
//! Responses are deserialized into the narrow subset of fields the router
//! needs; everything else in the API payload is ignored.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, trace};

/// Outbound side of a chat conversation, as a seam: `TelegramClient` is
/// the real implementation, tests substitute recording sinks.
pub trait ChatSink: Send + Sync {
    fn send(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;
}

impl ChatSink for TelegramClient {
    fn send(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.send_message(chat_id, text).map(|_| ())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("telegram api refused the call: {0}")]
    Api(String),
    #[error("telegram transport failure: {0}")]
    Transport(String),
    #[error("malformed telegram response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Api errors are deterministic and not worth a retry; transport and
    /// decode failures may clear up.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Api(_))
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    pub fn sender_id(&self) -> Option<i64> {
        self.from.as_ref().map(|u| u.id)
    }

    /// Text of the message this one replies to, if any.
    pub fn reply_to_text(&self) -> Option<&str> {
        self.reply_to_message
            .as_deref()
            .and_then(|m| m.text.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Chat {
    pub id: i64,
}

pub struct TelegramClient {
    agent: ureq::Agent,
    base_url: String,
}

/// Headroom over the server-side long-poll window so the server, not the
/// socket, terminates the wait.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(5))
                .build(),
            base_url: format!("https://api.telegram.org/bot{}", token),
        }
    }

    /// Validate the credential and return the bot identity.
    pub fn get_me(&self) -> Result<User, TransportError> {
        let url = format!("{}/getMe", self.base_url);
        let response = self
            .agent
            .post(&url)
            .timeout(SEND_TIMEOUT)
            .call()
            .map_err(map_ureq_error)?;
        unwrap_envelope(response)
    }

    /// Long-poll for inbound updates. Blocks up to `timeout`; returns an
    /// empty vec when the window elapses without traffic.
    pub fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TransportError> {
        let url = format!("{}/getUpdates", self.base_url);
        trace!(offset, timeout_secs = timeout.as_secs(), "telegram:get_updates");
        let response = self
            .agent
            .post(&url)
            .timeout(timeout + LONG_POLL_GRACE)
            .send_json(serde_json::json!({
                "offset": offset,
                "timeout": timeout.as_secs(),
                "allowed_updates": ["message"],
            }))
            .map_err(map_ureq_error)?;
        unwrap_envelope(response)
    }

    /// Send a markdown message to a chat. Falls back to plain text when the
    /// API rejects the markup (unbalanced markers in pane content).
    pub fn send_message(&self, chat_id: i64, text: &str) -> Result<Message, TransportError> {
        match self.send_message_inner(chat_id, text, Some("Markdown")) {
            Err(TransportError::Api(desc)) if desc.to_lowercase().contains("parse") => {
                debug!("markdown rejected, resending as plain text");
                self.send_message_inner(chat_id, text, None)
            }
            other => other,
        }
    }

    fn send_message_inner(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<Message, TransportError> {
        let url = format!("{}/sendMessage", self.base_url);
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(mode) = parse_mode {
            body["parse_mode"] = serde_json::Value::String(mode.to_string());
        }
        let response = self
            .agent
            .post(&url)
            .timeout(SEND_TIMEOUT)
            .send_json(body)
            .map_err(map_ureq_error)?;
        unwrap_envelope(response)
    }
}

fn map_ureq_error(error: ureq::Error) -> TransportError {
    match error {
        ureq::Error::Status(code, response) => {
            let description = response
                .into_json::<ApiEnvelope<serde_json::Value>>()
                .ok()
                .and_then(|env| env.description)
                .unwrap_or_else(|| format!("http status {}", code));
            TransportError::Api(description)
        }
        ureq::Error::Transport(t) => TransportError::Transport(t.to_string()),
    }
}

fn unwrap_envelope<T: serde::de::DeserializeOwned + Default>(
    response: ureq::Response,
) -> Result<T, TransportError> {
    let envelope: ApiEnvelope<T> = response
        .into_json()
        .map_err(|e| TransportError::Decode(e.to_string()))?;
    if !envelope.ok {
        return Err(TransportError::Api(
            envelope
                .description
                .unwrap_or_else(|| "unknown api error".to_string()),
        ));
    }
    envelope
        .result
        .ok_or_else(|| TransportError::Decode("ok response without result".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_deserialization_with_reply_linkage() {
        let payload = r#"{
            "update_id": 901,
            "message": {
                "message_id": 55,
                "from": {"id": 7, "username": "operator"},
                "chat": {"id": -100123},
                "text": "run the tests",
                "reply_to_message": {
                    "message_id": 54,
                    "chat": {"id": -100123},
                    "text": "✅ *work complete* — [claude_alpha]"
                }
            }
        }"#;
        let update: Update = serde_json::from_str(payload).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.sender_id(), Some(7));
        assert_eq!(message.text.as_deref(), Some("run the tests"));
        assert!(
            message
                .reply_to_text()
                .unwrap()
                .contains("[claude_alpha]")
        );
    }

    #[test]
    fn envelope_error_surfaces_description() {
        let payload = r#"{"ok": false, "description": "Unauthorized"}"#;
        let envelope: ApiEnvelope<Vec<Update>> = serde_json::from_str(payload).unwrap();
        assert!(!envelope.ok);
        assert_eq!(envelope.description.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn api_errors_are_not_retryable() {
        assert!(!TransportError::Api("bad".into()).is_retryable());
        assert!(TransportError::Transport("reset".into()).is_retryable());
    }
}

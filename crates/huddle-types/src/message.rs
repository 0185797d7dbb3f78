//! Chat message and wire frame types for Huddle.
//!
//! - [`StoredMessage`] is the persistence read model returned by history queries.
//! - [`ServerFrame`] is every JSON text frame the server sends to a client.
//! - [`ClientFrame`] is every JSON text frame a client may send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::error::ClientFrameError;
use crate::identity::Identity;

/// Kind of a persisted chat message.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (message_type IN ('user_message', 'assistant_message'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    UserMessage,
    AssistantMessage,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::UserMessage => "user_message",
            MessageKind::AssistantMessage => "assistant_message",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_message" => Ok(MessageKind::UserMessage),
            "assistant_message" => Ok(MessageKind::AssistantMessage),
            other => Err(format!("invalid message kind: '{other}'")),
        }
    }
}

/// A message as read back from persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub sender: String,
    pub text: String,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
}

/// Output of the responder port for one assistant request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub text: String,
    pub detected_intent: String,
}

/// Frame sent from the server to a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once when the session joins, before history.
    Connected { identity: Identity, user_id: String },
    /// Recent conversation history, oldest first.
    History {
        messages: Vec<StoredMessage>,
        count: usize,
    },
    /// A chat message from another participant.
    UserMessage {
        sender: String,
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// A reply from the assistant.
    AssistantMessage {
        sender: String,
        text: String,
        detected_intent: String,
        timestamp: DateTime<Utc>,
    },
    /// The previous client frame could not be processed.
    Error { message: String },
    /// The sender is being rate limited; the message was dropped.
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },
    /// Reply to a client `ping`.
    Pong,
}

impl ServerFrame {
    /// Serialize this frame to its JSON text representation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frame sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// A chat message. Also the interpretation of frames without a `type`.
    Message { text: String },
    /// Keep-alive.
    Ping,
}

impl ClientFrame {
    /// Parse a client text frame.
    ///
    /// A missing `type` defaults to `message`; a missing `text` is treated as empty.
    pub fn parse(raw: &str) -> Result<Self, ClientFrameError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ClientFrameError::InvalidJson(e.to_string()))?;

        let tag = value
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::trim)
            .unwrap_or("message");

        match tag {
            "message" => {
                let text = value
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string();
                Ok(ClientFrame::Message { text })
            }
            "ping" => Ok(ClientFrame::Ping),
            other => Err(ClientFrameError::UnknownType(other.to_string())),
        }
    }
}

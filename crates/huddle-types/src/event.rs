//! Pipeline event envelopes.
//!
//! Every unit of work that flows through the event queue is an
//! [`EventEnvelope`]. The set of variants is closed: consumers match on it
//! exhaustively, and decoding a payload whose tag names no variant fails with
//! [`EnvelopeError::UnknownVariant`] instead of being dropped.
//!
//! Producers usually build one of the typed event structs
//! ([`UserMessageEvent`], [`AssistantRequestEvent`], [`AssistantResponseEvent`])
//! and let the publisher convert it via `Into<EventEnvelope>`.

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;
use crate::identity::Identity;

/// Tagged unit of work flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    /// A participant sent a chat message.
    UserMessage { sender: Identity, text: String },
    /// A participant's message asked the assistant something.
    AssistantRequest { sender: Identity, text: String },
    /// The assistant produced a reply.
    AssistantResponse {
        text: String,
        original_text: String,
        detected_intent: String,
    },
}

impl EventEnvelope {
    /// Wire tags of every variant, in declaration order.
    pub const TAGS: [&'static str; 3] = ["user_message", "assistant_request", "assistant_response"];

    /// The `type` tag this envelope serializes with.
    pub fn tag(&self) -> &'static str {
        match self {
            EventEnvelope::UserMessage { .. } => Self::TAGS[0],
            EventEnvelope::AssistantRequest { .. } => Self::TAGS[1],
            EventEnvelope::AssistantResponse { .. } => Self::TAGS[2],
        }
    }

    /// Decode an envelope from JSON, distinguishing unknown tags from
    /// malformed known ones.
    pub fn decode(json: &str) -> Result<Self, EnvelopeError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

        let tag = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(EnvelopeError::MissingTag)?;

        if !Self::TAGS.contains(&tag) {
            return Err(EnvelopeError::UnknownVariant(tag.to_string()));
        }

        serde_json::from_value(value).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }
}

/// A participant sent a chat message.
#[derive(Debug, Clone)]
pub struct UserMessageEvent {
    pub sender: Identity,
    pub text: String,
}

/// A participant asked the assistant something.
#[derive(Debug, Clone)]
pub struct AssistantRequestEvent {
    pub sender: Identity,
    pub text: String,
}

/// The assistant produced a reply to `original_text`.
#[derive(Debug, Clone)]
pub struct AssistantResponseEvent {
    pub text: String,
    pub original_text: String,
    pub detected_intent: String,
}

impl From<UserMessageEvent> for EventEnvelope {
    fn from(e: UserMessageEvent) -> Self {
        EventEnvelope::UserMessage {
            sender: e.sender,
            text: e.text,
        }
    }
}

impl From<AssistantRequestEvent> for EventEnvelope {
    fn from(e: AssistantRequestEvent) -> Self {
        EventEnvelope::AssistantRequest {
            sender: e.sender,
            text: e.text,
        }
    }
}

impl From<AssistantResponseEvent> for EventEnvelope {
    fn from(e: AssistantResponseEvent) -> Self {
        EventEnvelope::AssistantResponse {
            text: e.text,
            original_text: e.original_text,
            detected_intent: e.detected_intent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::parse("alice").unwrap()
    }

    #[test]
    fn user_message_serializes_with_type_tag() {
        let env: EventEnvelope = UserMessageEvent {
            sender: alice(),
            text: "hi".to_string(),
        }
        .into();
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"type\":\"user_message\""));
        assert!(json.contains("\"sender\":\"alice\""));
        assert_eq!(env.tag(), "user_message");
    }

    #[test]
    fn decode_known_variant() {
        let env = EventEnvelope::decode(
            r#"{"type":"assistant_response","text":"hello","original_text":"hi","detected_intent":"default"}"#,
        )
        .unwrap();
        assert!(matches!(
            env,
            EventEnvelope::AssistantResponse { ref detected_intent, .. } if detected_intent == "default"
        ));
    }

    #[test]
    fn decode_unknown_variant_is_protocol_error() {
        let err = EventEnvelope::decode(r#"{"type":"typing","sender":"alice"}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::UnknownVariant(ref t) if t == "typing"));
    }

    #[test]
    fn decode_missing_tag() {
        let err = EventEnvelope::decode(r#"{"sender":"alice","text":"hi"}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingTag));
    }

    #[test]
    fn decode_known_tag_with_bad_fields_is_malformed() {
        let err = EventEnvelope::decode(r#"{"type":"user_message","text":"hi"}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed(_)));
    }

    #[test]
    fn tags_cover_every_variant() {
        let envelopes = [
            EventEnvelope::UserMessage {
                sender: alice(),
                text: String::new(),
            },
            EventEnvelope::AssistantRequest {
                sender: alice(),
                text: String::new(),
            },
            EventEnvelope::AssistantResponse {
                text: String::new(),
                original_text: String::new(),
                detected_intent: String::new(),
            },
        ];
        for env in &envelopes {
            let json = serde_json::to_string(env).unwrap();
            assert_eq!(EventEnvelope::decode(&json).unwrap().tag(), env.tag());
        }
    }
}

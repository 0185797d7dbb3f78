//! Keyword-matching responder.
//!
//! Intents are checked in declaration order; the first intent with any keyword
//! contained in the lowercased request wins. Requests matching nothing get the
//! `default` intent, whose reply echoes the question back.

use huddle_types::message::AssistantReply;

use super::Responder;

/// Intent name used when no keyword matches.
pub const DEFAULT_INTENT: &str = "default";

struct Intent {
    name: &'static str,
    keywords: &'static [&'static str],
    reply: &'static str,
}

const INTENTS: &[Intent] = &[
    Intent {
        name: "python",
        keywords: &["python", "py", "django", "flask", "fastapi"],
        reply: "Python is a high-level language prized for readable code. It shows up \
                everywhere from web backends to data pipelines and scripting.",
    },
    Intent {
        name: "async",
        keywords: &["async", "await", "asyncio", "concurrent", "asynchronous"],
        reply: "Async code lets one thread juggle many waiting tasks. It shines for \
                I/O-bound work such as sockets, HTTP calls and database queries.",
    },
    Intent {
        name: "websocket",
        keywords: &["websocket", "ws://", "real-time", "bidirectional", "connection"],
        reply: "A WebSocket is a long-lived, two-way channel between client and server. \
                This chat room runs on one.",
    },
    Intent {
        name: "event",
        keywords: &["event", "queue", "publisher", "consumer", "event-driven"],
        reply: "In an event-driven design, producers publish events to a queue and a \
                consumer reacts to them. Here every chat message travels through such \
                a pipeline before it is stored and fanned out.",
    },
    Intent {
        name: "database",
        keywords: &["database", "sqlite", "sql", "store", "persistence"],
        reply: "Messages in this room are stored in SQLite, a small embedded database. \
                New participants receive recent history from it when they join.",
    },
];

/// Rule-based [`Responder`] with a fixed intent table.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordResponder;

impl KeywordResponder {
    pub fn new() -> Self {
        Self
    }

    /// Name of the first intent whose keywords appear in `text`.
    pub fn detect_intent(&self, text: &str) -> &'static str {
        let lowered = text.to_lowercase();
        INTENTS
            .iter()
            .find(|intent| intent.keywords.iter().any(|k| lowered.contains(k)))
            .map(|intent| intent.name)
            .unwrap_or(DEFAULT_INTENT)
    }
}

impl Responder for KeywordResponder {
    fn respond(&self, text: &str) -> AssistantReply {
        let intent = self.detect_intent(text);
        let reply = INTENTS
            .iter()
            .find(|i| i.name == intent)
            .map(|i| i.reply.to_string())
            .unwrap_or_else(|| {
                format!(
                    "I'm a simple keyword assistant. You asked: '{text}'. Try asking \
                     about Python, async code, WebSockets, events or databases."
                )
            });

        AssistantReply {
            text: reply,
            detected_intent: intent.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_python() {
        let reply = KeywordResponder::new().respond("what is python");
        assert_eq!(reply.detected_intent, "python");
        assert!(reply.text.contains("Python"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(KeywordResponder::new().detect_intent("Tell me about SQLITE"), "database");
    }

    #[test]
    fn first_intent_in_table_order_wins() {
        // "async" and "queue" both match; async is declared first
        assert_eq!(
            KeywordResponder::new().detect_intent("async queue handling"),
            "async"
        );
    }

    #[test]
    fn unmatched_text_falls_back_to_default() {
        let reply = KeywordResponder::new().respond("how is the weather");
        assert_eq!(reply.detected_intent, DEFAULT_INTENT);
        assert!(reply.text.contains("how is the weather"));
    }

    #[test]
    fn empty_request_uses_default() {
        let reply = KeywordResponder::new().respond("");
        assert_eq!(reply.detected_intent, DEFAULT_INTENT);
    }
}

//! Responder port: turns an assistant request into a reply.

pub mod keyword;

use huddle_types::message::AssistantReply;

pub use keyword::KeywordResponder;

/// Produces the assistant's reply for a request text.
///
/// Implementations must be infallible; anything they cannot classify falls
/// back to a default intent.
pub trait Responder: Send + Sync + 'static {
    fn respond(&self, text: &str) -> AssistantReply;
}

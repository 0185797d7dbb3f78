//! Publishing side of the event pipeline.

use huddle_types::event::EventEnvelope;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

/// Errors from publishing an event.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The pipeline has shut down and no longer accepts events.
    #[error("event pipeline is closed")]
    Closed,
}

/// Cloneable handle for enqueueing events.
///
/// Publishing only enqueues; dispatch happens later on the consumer task.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<EventEnvelope>,
}

impl EventPublisher {
    pub(crate) fn new(tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Wrap `event` in its envelope and enqueue it, waiting for space if the
    /// queue is full.
    pub async fn publish(&self, event: impl Into<EventEnvelope>) -> Result<(), PublishError> {
        let envelope = event.into();
        let tag = envelope.tag();
        self.tx
            .send(envelope)
            .await
            .map_err(|_| PublishError::Closed)?;
        trace!(tag, "event published");
        Ok(())
    }

    /// Ingress envelopes currently waiting for the consumer.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("depth", &self.depth())
            .field("max_capacity", &self.max_capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::channel;
    use crate::test_support::id;
    use huddle_types::event::{AssistantRequestEvent, EventEnvelope};

    #[tokio::test]
    async fn typed_event_is_wrapped() {
        let (publisher, mut queue) = channel(4);
        publisher
            .publish(AssistantRequestEvent {
                sender: id("alice"),
                text: "what is python".to_string(),
            })
            .await
            .unwrap();

        let envelope = queue.next().await.unwrap();
        assert_eq!(envelope.tag(), "assistant_request");
        assert!(matches!(envelope, EventEnvelope::AssistantRequest { ref text, .. } if text == "what is python"));
    }

    #[tokio::test]
    async fn depth_tracks_buffered_envelopes() {
        let (publisher, mut queue) = channel(4);
        assert_eq!(publisher.depth(), 0);

        publisher
            .publish(EventEnvelope::UserMessage {
                sender: id("bob"),
                text: "hi".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(publisher.depth(), 1);

        queue.next().await.unwrap();
        assert_eq!(publisher.depth(), 0);
    }

    #[tokio::test]
    async fn closed_after_queue_dropped() {
        let (publisher, queue) = channel(4);
        drop(queue);
        assert!(publisher.is_closed());
        let err = publisher
            .publish(EventEnvelope::UserMessage {
                sender: id("bob"),
                text: "anyone?".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Closed));
    }
}

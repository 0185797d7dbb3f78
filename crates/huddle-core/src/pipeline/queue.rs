//! Ordered, bounded event queue.
//!
//! Two lanes feed the single reader:
//! - **ingress**: a bounded mpsc channel shared by every [`EventPublisher`].
//!   A full channel suspends publishers until the consumer catches up.
//! - **follow-ups**: envelopes the consumer derives while dispatching. They are
//!   buffered locally and handed out before the next ingress envelope, so the
//!   reader never waits on space in its own queue.

use std::collections::VecDeque;

use huddle_types::event::EventEnvelope;
use tokio::sync::mpsc;

use super::publisher::EventPublisher;

/// Create a connected publisher/queue pair with room for `capacity` ingress
/// envelopes. A capacity of zero is treated as one.
pub fn channel(capacity: usize) -> (EventPublisher, EventQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventPublisher::new(tx),
        EventQueue {
            ingress: rx,
            follow_ups: VecDeque::new(),
        },
    )
}

/// Receiving side of the pipeline. Owned by exactly one consumer.
pub struct EventQueue {
    ingress: mpsc::Receiver<EventEnvelope>,
    follow_ups: VecDeque<EventEnvelope>,
}

impl EventQueue {
    /// Next envelope in dispatch order.
    ///
    /// Suspends while both lanes are empty. Returns `None` once ingress is
    /// closed (or every publisher is gone) and nothing is left to hand out.
    /// Cancel-safe: dropping the future never loses an envelope.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(envelope) = self.follow_ups.pop_front() {
            return Some(envelope);
        }
        self.ingress.recv().await
    }

    /// Queue an envelope produced by the consumer itself.
    pub fn push_follow_up(&mut self, envelope: EventEnvelope) {
        self.follow_ups.push_back(envelope);
    }

    /// Stop accepting new ingress envelopes. Already-buffered envelopes stay
    /// available through [`next`](Self::next); waiting publishers fail with
    /// `PublishError::Closed`.
    pub fn close(&mut self) {
        self.ingress.close();
    }

    /// Envelopes currently buffered across both lanes.
    pub fn len(&self) -> usize {
        self.ingress.len() + self.follow_ups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("ingress", &self.ingress.len())
            .field("follow_ups", &self.follow_ups.len())
            .finish()
    }
}

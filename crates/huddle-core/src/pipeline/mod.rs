//! Event-driven message pipeline.
//!
//! ```text
//! transport ──publish──▶ EventQueue ──next──▶ EventConsumer ──▶ persistence
//!                            ▲                     │        └─▶ registry broadcast
//!                            └──── follow-ups ─────┘  (assistant request/response)
//! ```
//!
//! A [`Pipeline`] is built explicitly at startup, hands out cloneable
//! [`EventPublisher`]s, and is shut down explicitly. There is no global queue.

pub mod consumer;
pub mod publisher;
pub mod queue;

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::repository::message::MessageRepository;
use crate::responder::Responder;

pub use consumer::{ConsumerReport, ConsumerSettings, EventConsumer};
pub use publisher::{EventPublisher, PublishError};
pub use queue::EventQueue;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("event consumer task failed: {0}")]
    ConsumerTask(String),
}

/// Running pipeline: the queue, its consumer task and a publisher factory.
pub struct Pipeline {
    publisher: EventPublisher,
    shutdown: CancellationToken,
    consumer: JoinHandle<ConsumerReport>,
}

impl Pipeline {
    /// Build the queue and spawn the consumer on the current runtime.
    pub fn start<R, P, H>(
        queue_capacity: usize,
        repository: Arc<R>,
        responder: Arc<P>,
        registry: Arc<ConnectionRegistry<H>>,
        settings: ConsumerSettings,
    ) -> Self
    where
        R: MessageRepository,
        P: Responder,
        H: ConnectionHandle,
    {
        let (publisher, queue) = queue::channel(queue_capacity);
        let shutdown = CancellationToken::new();
        let consumer = EventConsumer::new(queue, repository, responder, registry, settings);
        let consumer = tokio::spawn(consumer.run(shutdown.clone()));

        info!(queue_capacity = publisher.max_capacity(), "event pipeline started");
        Self {
            publisher,
            shutdown,
            consumer,
        }
    }

    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    /// Stop accepting events, dispatch whatever is buffered, and wait for the
    /// consumer to finish.
    pub async fn shutdown(self) -> Result<ConsumerReport, PipelineError> {
        self.shutdown.cancel();
        self.consumer
            .await
            .map_err(|e| PipelineError::ConsumerTask(e.to_string()))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("publisher", &self.publisher)
            .field("stopping", &self.shutdown.is_cancelled())
            .finish()
    }
}

//! Single-reader event consumer.
//!
//! The consumer owns the [`EventQueue`] and dispatches one envelope at a time,
//! in queue order. Each dispatch finishes (persistence, broadcast, follow-up)
//! before the next envelope is taken. A panic inside a dispatch is caught and
//! logged; the loop keeps running.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use huddle_types::config::AssistantConfig;
use huddle_types::error::IdentityError;
use huddle_types::event::{AssistantRequestEvent, AssistantResponseEvent, EventEnvelope};
use huddle_types::identity::Identity;
use huddle_types::message::{MessageKind, ServerFrame};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::EventQueue;
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::repository::message::MessageRepository;
use crate::responder::Responder;

/// Assistant routing settings used by the consumer.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Command token that routes a message to the assistant.
    pub trigger_prefix: String,
    /// Identity the assistant's replies are persisted and broadcast under.
    pub bot: Identity,
}

impl ConsumerSettings {
    pub fn from_config(config: &AssistantConfig) -> Result<Self, IdentityError> {
        Ok(Self {
            trigger_prefix: config.trigger_prefix.clone(),
            bot: Identity::parse(&config.bot_name)?,
        })
    }

    /// If `text` starts with the trigger prefix (ignoring case) followed by
    /// whitespace or end of text, return the trimmed remainder.
    pub fn assistant_query<'a>(&self, text: &'a str) -> Option<&'a str> {
        let prefix = self.trigger_prefix.as_str();
        if prefix.is_empty() {
            return None;
        }
        let (head, rest) = text.split_at_checked(prefix.len())?;
        if !head.eq_ignore_ascii_case(prefix) {
            return None;
        }
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            Some(rest.trim())
        } else {
            None
        }
    }
}

/// Counters returned when the consumer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    /// Envelopes dispatched over the consumer's lifetime, drained ones included.
    pub dispatched: u64,
    /// Envelopes dispatched after the shutdown signal.
    pub drained: u64,
}

/// Reads envelopes from the queue and routes them to persistence, broadcast
/// and the responder.
pub struct EventConsumer<R, P, H>
where
    R: MessageRepository,
    P: Responder,
    H: ConnectionHandle,
{
    queue: EventQueue,
    repository: Arc<R>,
    responder: Arc<P>,
    registry: Arc<ConnectionRegistry<H>>,
    settings: ConsumerSettings,
}

impl<R, P, H> EventConsumer<R, P, H>
where
    R: MessageRepository,
    P: Responder,
    H: ConnectionHandle,
{
    pub fn new(
        queue: EventQueue,
        repository: Arc<R>,
        responder: Arc<P>,
        registry: Arc<ConnectionRegistry<H>>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            queue,
            repository,
            responder,
            registry,
            settings,
        }
    }

    /// Run until `shutdown` fires or every publisher is gone.
    ///
    /// On shutdown, ingress is closed and everything already buffered is
    /// dispatched before returning.
    pub async fn run(mut self, shutdown: CancellationToken) -> ConsumerReport {
        let mut report = ConsumerReport::default();
        info!("event consumer started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = self.queue.next() => match next {
                    Some(envelope) => {
                        self.dispatch_guarded(envelope).await;
                        report.dispatched += 1;
                    }
                    None => {
                        info!(dispatched = report.dispatched, "all publishers gone, event consumer stopped");
                        return report;
                    }
                },
            }
        }

        self.queue.close();
        while let Some(envelope) = self.queue.next().await {
            self.dispatch_guarded(envelope).await;
            report.dispatched += 1;
            report.drained += 1;
        }

        info!(
            dispatched = report.dispatched,
            drained = report.drained,
            "event consumer stopped"
        );
        report
    }

    async fn dispatch_guarded(&mut self, envelope: EventEnvelope) {
        let tag = envelope.tag();
        match AssertUnwindSafe(self.dispatch(envelope)).catch_unwind().await {
            Ok(Some(follow_up)) => self.queue.push_follow_up(follow_up),
            Ok(None) => {}
            Err(panic) => {
                error!(tag, panic = panic_message(&*panic), "dispatch panicked, continuing");
            }
        }
    }

    /// Handle one envelope, returning the envelope it derives, if any.
    async fn dispatch(&self, envelope: EventEnvelope) -> Option<EventEnvelope> {
        match envelope {
            EventEnvelope::UserMessage { sender, text } => {
                self.on_user_message(sender, text).await
            }
            EventEnvelope::AssistantRequest { sender, text } => {
                Some(self.on_assistant_request(&sender, text))
            }
            EventEnvelope::AssistantResponse {
                text,
                detected_intent,
                ..
            } => {
                self.on_assistant_response(text, detected_intent).await;
                None
            }
        }
    }

    async fn on_user_message(&self, sender: Identity, text: String) -> Option<EventEnvelope> {
        if let Err(e) = self
            .repository
            .save(MessageKind::UserMessage, &sender, &text)
            .await
        {
            warn!(identity = %sender, error = %e, "failed to persist user message");
        }

        let request = self.settings.assistant_query(&text).map(|query| {
            AssistantRequestEvent {
                sender: sender.clone(),
                text: query.to_string(),
            }
            .into()
        });

        let frame = ServerFrame::UserMessage {
            sender: sender.to_string(),
            text,
            timestamp: Utc::now(),
        };
        if let Some(payload) = encode(&frame) {
            let outcome = self.registry.broadcast_except(payload, &sender).await;
            debug!(
                identity = %sender,
                delivered = outcome.delivered,
                evicted = outcome.evicted,
                "user message broadcast"
            );
        }

        request
    }

    fn on_assistant_request(&self, sender: &Identity, text: String) -> EventEnvelope {
        let reply = self.responder.respond(&text);
        debug!(identity = %sender, intent = %reply.detected_intent, "assistant request answered");
        AssistantResponseEvent {
            text: reply.text,
            original_text: text,
            detected_intent: reply.detected_intent,
        }
        .into()
    }

    async fn on_assistant_response(&self, text: String, detected_intent: String) {
        let bot = &self.settings.bot;
        if let Err(e) = self
            .repository
            .save(MessageKind::AssistantMessage, bot, &text)
            .await
        {
            warn!(identity = %bot, error = %e, "failed to persist assistant message");
        }

        let frame = ServerFrame::AssistantMessage {
            sender: bot.to_string(),
            text,
            detected_intent,
            timestamp: Utc::now(),
        };
        if let Some(payload) = encode(&frame) {
            let outcome = self.registry.broadcast_all(payload).await;
            debug!(
                delivered = outcome.delivered,
                evicted = outcome.evicted,
                "assistant message broadcast"
            );
        }
    }
}

fn encode(frame: &ServerFrame) -> Option<Arc<str>> {
    match frame.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            error!(error = %e, "failed to serialize server frame");
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

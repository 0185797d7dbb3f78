//! WebSocket chat endpoint.
//!
//! `/ws?username=<name>` upgrades to a WebSocket. A missing or blank name is
//! answered with close code 1008 (policy violation). Otherwise the session:
//!
//! - records the participant and sends `connected`;
//! - registers a [`WsConnection`] so the event consumer can broadcast to it,
//!   then sends `history` (a message racing the join may arrive twice, never
//!   zero times);
//! - reads client frames, rate-limits chat messages and publishes them;
//! - unregisters its own handle on disconnect (a newer session for the same
//!   name is left alone).
//!
//! Outbound frames, whether direct replies or broadcasts, go through one
//! bounded per-connection buffer drained by a writer task, so a client sees
//! them in the order they were produced. A client that lets the buffer fill
//! up is treated as failed and dropped. On close the writer flushes whatever
//! is still buffered before sending the Close frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{Sink, SinkExt, StreamExt};
use huddle_core::registry::{ConnectionHandle, DeliveryError};
use huddle_core::repository::message::MessageRepository;
use huddle_types::event::UserMessageEvent;
use huddle_types::identity::Identity;
use huddle_types::message::{ClientFrame, ServerFrame};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Frames buffered per connection before the client counts as stalled.
pub const OUTBOUND_BUFFER: usize = 256;

/// How long a closing session may spend flushing its buffer to the client.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

const USERNAME_REQUIRED: &str = "Username required. Connect with /ws?username=<name>";

/// Query parameters of the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub username: Option<String>,
}

/// Send side of one WebSocket session, as seen by the connection registry.
#[derive(Debug)]
pub struct WsConnection {
    tx: mpsc::Sender<Arc<str>>,
    closed: CancellationToken,
}

impl WsConnection {
    /// Create a handle and the receiver its writer task drains.
    pub fn new() -> (Self, mpsc::Receiver<Arc<str>>) {
        Self::with_capacity(OUTBOUND_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            tx,
            closed: CancellationToken::new(),
        };
        (conn, rx)
    }

    /// Mark the session finished; the reader and writer both stop.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session has been closed from either side.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl ConnectionHandle for WsConnection {
    async fn send(&self, payload: Arc<str>) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        match self.tx.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.close();
                Err(DeliveryError::Failed("outbound buffer full".to_string()))
            }
            Err(TrySendError::Closed(_)) => {
                self.close();
                Err(DeliveryError::Closed)
            }
        }
    }
}

/// Upgrade an HTTP request to a chat WebSocket.
///
/// Mounted at `/ws` in the router.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let identity = params.username.as_deref().map(Identity::parse);
    let sessions = state.sessions.clone();
    ws.on_upgrade(move |socket| {
        sessions.track_future(async move {
            match identity {
                Some(Ok(identity)) => run_session(socket, state, identity).await,
                _ => reject(socket).await,
            }
        })
    })
}

async fn reject(mut socket: WebSocket) {
    tracing::debug!("rejecting WebSocket without username");
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: USERNAME_REQUIRED.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn run_session(socket: WebSocket, state: AppState, identity: Identity) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (conn, outbound) = WsConnection::new();
    let handle = Arc::new(conn);
    let writer = tokio::spawn(write_outbound(ws_sender, outbound, handle.closed.clone()));

    join(&state, &identity, &handle).await;
    let connections = state.registry.count().await;
    tracing::info!(
        %identity,
        connections,
        "client connected"
    );

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = handle.closed() => break,
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_client_text(&state, &identity, &handle, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    tracing::debug!(%identity, "WebSocket receive error: {err}");
                    break;
                }
                // Binary and protocol-level ping/pong frames carry no chat data
                Some(Ok(_)) => {}
            },
        }
    }

    state.registry.unregister_handle(&identity, &handle).await;
    handle.close();
    if let Err(e) = writer.await {
        tracing::warn!(%identity, error = %e, "WebSocket writer task failed");
    }
    let connections = state.registry.count().await;
    tracing::info!(
        %identity,
        connections,
        "client disconnected"
    );
}

/// Forward queued frames to the socket until the session closes, then flush
/// what is left in the buffer and send Close.
async fn write_outbound<S>(
    mut ws_sender: S,
    mut outbound: mpsc::Receiver<Arc<str>>,
    closed: CancellationToken,
) where
    S: Sink<Message> + Unpin,
{
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            payload = outbound.recv() => {
                let Some(payload) = payload else { break };
                if ws_sender.send(Message::Text(payload.as_ref().into())).await.is_err() {
                    // Client disconnected
                    closed.cancel();
                    return;
                }
            }
        }
    }

    outbound.close();
    let flush = async {
        while let Some(payload) = outbound.recv().await {
            if ws_sender.send(Message::Text(payload.as_ref().into())).await.is_err() {
                return;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    };
    if tokio::time::timeout(FLUSH_TIMEOUT, flush).await.is_err() {
        tracing::debug!("client did not accept buffered frames in time");
    }
}

/// Greet a new session and make it a broadcast recipient.
///
/// Registration happens before the history query, so anything persisted after
/// the snapshot is also broadcast to this session.
pub(crate) async fn join(state: &AppState, identity: &Identity, handle: &Arc<WsConnection>) {
    send_connected(state, identity, handle).await;
    state
        .registry
        .register(identity.clone(), Arc::clone(handle))
        .await;
    send_history(state, identity, handle).await;
}

/// Record the participant and send `connected`.
async fn send_connected(state: &AppState, identity: &Identity, handle: &WsConnection) {
    let user_id = match state.repository.ensure_participant(identity).await {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(%identity, error = %e, "failed to record participant");
            String::new()
        }
    };
    send_frame(
        handle,
        &ServerFrame::Connected {
            identity: identity.clone(),
            user_id,
        },
    )
    .await;
}

/// Send the most recent `history`, oldest first.
async fn send_history(state: &AppState, identity: &Identity, handle: &WsConnection) {
    let messages = state
        .repository
        .load_history(Some(state.config.server.history_limit))
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(%identity, error = %e, "failed to load history");
            Vec::new()
        });
    send_frame(
        handle,
        &ServerFrame::History {
            count: messages.len(),
            messages,
        },
    )
    .await;
}

/// Handle one text frame from a client.
pub(crate) async fn handle_client_text(
    state: &AppState,
    identity: &Identity,
    handle: &WsConnection,
    raw: &str,
) {
    let text = match ClientFrame::parse(raw) {
        Ok(ClientFrame::Ping) => {
            send_frame(handle, &ServerFrame::Pong).await;
            return;
        }
        Ok(ClientFrame::Message { text }) => text,
        Err(e) => {
            tracing::warn!(%identity, error = %e, "protocol violation from client");
            send_frame(
                handle,
                &ServerFrame::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    if text.trim().is_empty() {
        return;
    }

    let now = Instant::now();
    if !state.rate_limiter.admit(identity, now) {
        let retry_after = state
            .rate_limiter
            .retry_after(identity, now)
            .unwrap_or(Duration::from_secs(1));
        let secs = (retry_after.as_secs_f64().ceil() as u64).max(1);
        tracing::debug!(%identity, retry_after_secs = secs, "message rate limited");
        send_frame(
            handle,
            &ServerFrame::RateLimited {
                message: format!("You're sending messages too fast. Try again in {secs}s."),
                retry_after_secs: secs,
            },
        )
        .await;
        return;
    }

    let event = UserMessageEvent {
        sender: identity.clone(),
        text,
    };
    if let Err(e) = state.publisher.publish(event).await {
        tracing::warn!(%identity, error = %e, "dropping message");
        send_frame(
            handle,
            &ServerFrame::Error {
                message: "server is shutting down".to_string(),
            },
        )
        .await;
    }
}

async fn send_frame(handle: &WsConnection, frame: &ServerFrame) {
    match frame.to_json() {
        Ok(json) => {
            if let Err(e) = handle.send(Arc::from(json)).await {
                tracing::debug!(error = %e, "failed to queue frame for client");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize server frame"),
    }
}

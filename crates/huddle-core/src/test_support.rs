//! In-memory fakes for the ports, shared by unit tests across modules.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use huddle_types::error::RepositoryError;
use huddle_types::identity::Identity;
use huddle_types::message::{MessageKind, StoredMessage};
use tokio::sync::mpsc;

use crate::registry::{ConnectionHandle, DeliveryError};
use crate::repository::message::MessageRepository;

/// Connection handle backed by an unbounded channel, with a failure switch.
pub struct TestHandle {
    tx: mpsc::UnboundedSender<Arc<str>>,
    fail: AtomicBool,
    sends: AtomicUsize,
}

impl TestHandle {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<str>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(Self {
            tx,
            fail: AtomicBool::new(false),
            sends: AtomicUsize::new(0),
        });
        (handle, rx)
    }

    pub fn failing() -> Arc<Self> {
        let (handle, _rx) = Self::new();
        handle.fail.store(true, Ordering::SeqCst);
        handle
    }

    pub fn send_attempts(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

impl ConnectionHandle for TestHandle {
    async fn send(&self, payload: Arc<str>) -> Result<(), DeliveryError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Failed("simulated failure".to_string()));
        }
        self.tx.send(payload).map_err(|_| DeliveryError::Closed)
    }
}

/// Drain everything currently buffered in a test receiver, parsed as JSON.
pub fn drain_frames(rx: &mut mpsc::UnboundedReceiver<Arc<str>>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        frames.push(serde_json::from_str(&payload).unwrap());
    }
    frames
}

/// Repository that records every save in memory and can be switched to fail.
#[derive(Default)]
pub struct RecordingRepository {
    saved: Mutex<Vec<(MessageKind, String, String)>>,
    fail: AtomicBool,
}

impl RecordingRepository {
    pub fn failing() -> Self {
        let repo = Self::default();
        repo.fail.store(true, Ordering::SeqCst);
        repo
    }

    pub fn saved(&self) -> Vec<(MessageKind, String, String)> {
        self.saved.lock().unwrap().clone()
    }
}

impl MessageRepository for RecordingRepository {
    async fn save(
        &self,
        kind: MessageKind,
        sender: &Identity,
        text: &str,
    ) -> Result<(), RepositoryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        self.saved
            .lock()
            .unwrap()
            .push((kind, sender.to_string(), text.to_string()));
        Ok(())
    }

    async fn load_history(&self, limit: Option<u32>) -> Result<Vec<StoredMessage>, RepositoryError> {
        let saved = self.saved.lock().unwrap();
        let take = limit.map(|l| l as usize).unwrap_or(saved.len());
        let skip = saved.len().saturating_sub(take);
        Ok(saved
            .iter()
            .skip(skip)
            .map(|(kind, sender, text)| StoredMessage {
                sender: sender.clone(),
                text: text.clone(),
                kind: *kind,
                created_at: chrono::Utc::now(),
            })
            .collect())
    }

    async fn ensure_participant(&self, identity: &Identity) -> Result<String, RepositoryError> {
        Ok(format!("user-{identity}"))
    }

    async fn count_messages(&self) -> Result<u64, RepositoryError> {
        Ok(self.saved.lock().unwrap().len() as u64)
    }
}

pub fn id(name: &str) -> Identity {
    Identity::parse(name).unwrap()
}

//! Live connection registry with snapshot broadcast and failure eviction.
//!
//! The registry maps each [`Identity`] to exactly one send-capable
//! [`ConnectionHandle`]. A reconnect replaces the previous handle (last writer
//! wins). Broadcasts iterate a point-in-time snapshot taken under the read lock
//! and send after the lock is released, so slow recipients never block
//! `register`/`unregister`. Any handle whose send fails is evicted once the
//! pass completes; the remaining recipients are still delivered to.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use huddle_types::identity::Identity;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A recipient's send failed. The recipient is evicted, never retried.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The connection's outbound side is gone.
    #[error("connection closed")]
    Closed,

    #[error("send failed: {0}")]
    Failed(String),
}

/// Outbound side of one live connection.
///
/// Implementations own whatever transport resource backs the connection. The
/// payload is a pre-serialized text frame shared across all recipients of a
/// broadcast.
pub trait ConnectionHandle: Send + Sync + 'static {
    fn send(&self, payload: Arc<str>) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Result of one broadcast pass, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub evicted: usize,
}

/// Identity -> live handle map shared by the transport and the event consumer.
pub struct ConnectionRegistry<H: ConnectionHandle> {
    connections: RwLock<HashMap<Identity, Arc<H>>>,
}

impl<H: ConnectionHandle> ConnectionRegistry<H> {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Install `handle` for `identity`, dropping any previous handle unnotified.
    pub async fn register(&self, identity: Identity, handle: Arc<H>) {
        let replaced = self
            .connections
            .write()
            .await
            .insert(identity.clone(), handle)
            .is_some();
        debug!(%identity, replaced, "registered connection");
    }

    /// Remove the mapping for `identity`. Returns `true` if one existed.
    pub async fn unregister(&self, identity: &Identity) -> bool {
        let removed = self.connections.write().await.remove(identity).is_some();
        if removed {
            debug!(%identity, "unregistered connection");
        }
        removed
    }

    /// Remove the mapping only if it still points at `handle`.
    ///
    /// A session that ends after its identity reconnected must not tear down
    /// the replacement connection.
    pub async fn unregister_handle(&self, identity: &Identity, handle: &Arc<H>) -> bool {
        let mut connections = self.connections.write().await;
        let current = connections
            .get(identity)
            .is_some_and(|live| Arc::ptr_eq(live, handle));
        if current {
            connections.remove(identity);
            debug!(%identity, "unregistered connection");
        }
        current
    }

    /// Send `payload` to every registered connection.
    pub async fn broadcast_all(&self, payload: Arc<str>) -> BroadcastOutcome {
        self.broadcast(payload, None).await
    }

    /// Send `payload` to every registered connection except `excluded`.
    pub async fn broadcast_except(&self, payload: Arc<str>, excluded: &Identity) -> BroadcastOutcome {
        self.broadcast(payload, Some(excluded)).await
    }

    /// Number of registered connections.
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn contains(&self, identity: &Identity) -> bool {
        self.connections.read().await.contains_key(identity)
    }

    async fn broadcast(&self, payload: Arc<str>, excluded: Option<&Identity>) -> BroadcastOutcome {
        let targets: Vec<(Identity, Arc<H>)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(identity, _)| Some(*identity) != excluded)
                .map(|(identity, handle)| (identity.clone(), Arc::clone(handle)))
                .collect()
        };

        let results =
            join_all(targets.iter().map(|(_, handle)| handle.send(Arc::clone(&payload)))).await;

        let attempted = targets.len();
        let mut failed = Vec::new();
        for ((identity, handle), result) in targets.into_iter().zip(results) {
            if let Err(err) = result {
                warn!(%identity, error = %err, "delivery failed, evicting connection");
                failed.push((identity, handle));
            }
        }

        BroadcastOutcome {
            delivered: attempted - failed.len(),
            evicted: self.evict(failed).await,
        }
    }

    /// Evict handles whose send failed, skipping identities that reconnected
    /// with a new handle during the broadcast pass.
    async fn evict(&self, failed: Vec<(Identity, Arc<H>)>) -> usize {
        if failed.is_empty() {
            return 0;
        }
        let mut connections = self.connections.write().await;
        let mut evicted = 0;
        for (identity, handle) in failed {
            let stale = connections
                .get(&identity)
                .is_some_and(|live| Arc::ptr_eq(live, &handle));
            if stale {
                connections.remove(&identity);
                evicted += 1;
            }
        }
        evicted
    }
}

impl<H: ConnectionHandle> Default for ConnectionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ConnectionHandle> std::fmt::Debug for ConnectionRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.connections.try_read().map(|c| c.len()).ok();
        f.debug_struct("ConnectionRegistry")
            .field("connections", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestHandle, id};

    fn payload(text: &str) -> Arc<str> {
        Arc::from(text)
    }

    #[tokio::test]
    async fn register_and_count() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = TestHandle::new();
        let (b, _rx_b) = TestHandle::new();

        registry.register(id("alice"), a).await;
        registry.register(id("bob"), b).await;

        assert_eq!(registry.count().await, 2);
        assert!(registry.contains(&id("alice")).await);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (a, _rx) = TestHandle::new();
        registry.register(id("alice"), a).await;

        assert!(registry.unregister(&id("alice")).await);
        assert!(!registry.unregister(&id("alice")).await);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_all_reaches_everyone() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = TestHandle::new();
        let (b, mut rx_b) = TestHandle::new();
        registry.register(id("alice"), a).await;
        registry.register(id("bob"), b).await;

        let outcome = registry.broadcast_all(payload("hello")).await;

        assert_eq!(outcome, BroadcastOutcome { delivered: 2, evicted: 0 });
        assert_eq!(&*rx_a.try_recv().unwrap(), "hello");
        assert_eq!(&*rx_b.try_recv().unwrap(), "hello");
    }

    #[tokio::test]
    async fn broadcast_except_skips_excluded() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = TestHandle::new();
        let (b, mut rx_b) = TestHandle::new();
        let (c, mut rx_c) = TestHandle::new();
        registry.register(id("alice"), a).await;
        registry.register(id("bob"), b).await;
        registry.register(id("carol"), c).await;

        let outcome = registry.broadcast_except(payload("hi"), &id("alice")).await;

        assert_eq!(outcome.delivered, 2);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
    }

    #[tokio::test]
    async fn one_defective_handle_is_evicted_others_delivered() {
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        for name in ["a", "b", "c", "d"] {
            let (handle, rx) = TestHandle::new();
            registry.register(id(name), handle).await;
            receivers.push(rx);
        }
        registry.register(id("broken"), TestHandle::failing()).await;
        assert_eq!(registry.count().await, 5);

        let outcome = registry.broadcast_all(payload("msg")).await;

        assert_eq!(outcome, BroadcastOutcome { delivered: 4, evicted: 1 });
        for rx in &mut receivers {
            assert_eq!(&*rx.try_recv().unwrap(), "msg");
        }
        assert_eq!(registry.count().await, 4);
        assert!(!registry.contains(&id("broken")).await);
    }

    #[tokio::test]
    async fn reregister_replaces_old_handle() {
        let registry = ConnectionRegistry::new();
        let (old, mut rx_old) = TestHandle::new();
        let (new, mut rx_new) = TestHandle::new();

        registry.register(id("alice"), Arc::clone(&old)).await;
        registry.register(id("alice"), new).await;
        assert_eq!(registry.count().await, 1);

        registry.broadcast_all(payload("once")).await;

        assert!(rx_old.try_recv().is_err());
        assert_eq!(old.send_attempts(), 0);
        assert_eq!(&*rx_new.try_recv().unwrap(), "once");
        assert!(rx_new.try_recv().is_err(), "no duplicate delivery");
    }

    #[tokio::test]
    async fn unregister_handle_ignores_replaced_session() {
        let registry = ConnectionRegistry::new();
        let (old, _rx_old) = TestHandle::new();
        let (new, _rx_new) = TestHandle::new();

        registry.register(id("alice"), Arc::clone(&old)).await;
        registry.register(id("alice"), Arc::clone(&new)).await;

        // The stale session disconnecting must not remove the new one
        assert!(!registry.unregister_handle(&id("alice"), &old).await);
        assert!(registry.contains(&id("alice")).await);

        assert!(registry.unregister_handle(&id("alice"), &new).await);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn eviction_spares_handle_reregistered_mid_broadcast() {
        let registry = ConnectionRegistry::new();
        let failing = TestHandle::failing();
        registry.register(id("alice"), Arc::clone(&failing)).await;

        // Simulate the failed pass having snapshotted the old handle, then
        // alice reconnecting before eviction runs.
        let (fresh, _rx) = TestHandle::new();
        registry.register(id("alice"), fresh).await;
        let evicted = registry.evict(vec![(id("alice"), failing)]).await;

        assert_eq!(evicted, 0);
        assert!(registry.contains(&id("alice")).await);
    }

    #[tokio::test]
    async fn broadcast_to_empty_registry() {
        let registry: ConnectionRegistry<TestHandle> = ConnectionRegistry::new();
        let outcome = registry.broadcast_all(payload("nobody")).await;
        assert_eq!(outcome, BroadcastOutcome::default());
    }

    #[test]
    fn debug_impl() {
        let registry: ConnectionRegistry<TestHandle> = ConnectionRegistry::new();
        let debug = format!("{registry:?}");
        assert!(debug.contains("ConnectionRegistry"));
    }
}

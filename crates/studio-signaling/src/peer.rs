//! Peer identity and the registry of live connections.
//!
//! A single map keyed by peer id, guarded by one `RwLock`, with
//! register/unregister/lookup as the whole surface. There's only one index
//! because a peer id is already the connection's only identity — there's no
//! separate user/session split to track.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use studio_common::error::SignalingError;

/// A peer's self-chosen identifier. Arbitrary and client-supplied, not a
/// generated id — uniqueness is enforced at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(Arc<str>);

impl PeerId {
    pub fn new(raw: String) -> Self {
        Self(Arc::from(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0.to_string()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

/// How urgently an outbound frame needs to land.
///
/// The ideal policy is a bounded per-recipient queue that drops the oldest
/// queued frame under pressure, except for membership frames, which must
/// never be silently dropped. `tokio::mpsc` has no way to evict its oldest
/// queued item, so the two priorities are realized differently instead of
/// both being approximated as a ring buffer: `Critical` frames block with a
/// deadline and force-close the connection if the deadline passes with the
/// queue still full; `BestEffort` frames are dropped immediately (rather
/// than evicting something older) when the queue is full. See `DESIGN.md`
/// for the full write-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Critical,
    BestEffort,
}

/// The write side of one connection's outbound queue, plus the token used
/// to force it closed.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Arc<str>>,
    cancel: CancellationToken,
}

/// How long a `Critical` send may block on a full queue before the
/// connection is treated as unresponsive and torn down.
const CRITICAL_SEND_TIMEOUT: Duration = Duration::from_secs(5);

impl ConnectionHandle {
    pub fn new(tx: mpsc::Sender<Arc<str>>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Queue a frame for delivery. `Critical` frames wait out backpressure
    /// up to [`CRITICAL_SEND_TIMEOUT`] and force-close the connection if
    /// that expires; `BestEffort` frames are dropped on a full queue.
    pub async fn send(&self, frame: Arc<str>, priority: Priority) {
        match priority {
            Priority::Critical => {
                match tokio::time::timeout(CRITICAL_SEND_TIMEOUT, self.tx.send(frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => {}
                    Err(_) => {
                        tracing::warn!("critical frame send timed out, closing connection");
                        self.cancel.cancel();
                    }
                }
            }
            Priority::BestEffort => {
                if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(frame) {
                    tracing::debug!("outbound queue full, dropping best-effort frame");
                }
            }
        }
    }
}

/// Registry of every connected peer, keyed by the self-chosen [`PeerId`].
#[derive(Clone, Default)]
pub struct PeerRegistry {
    connections: Arc<RwLock<HashMap<PeerId, ConnectionHandle>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly identified peer. Fails if the id is already taken
    /// by a live connection.
    pub async fn register(
        &self,
        peer_id: PeerId,
        handle: ConnectionHandle,
    ) -> Result<(), SignalingError> {
        let mut connections = self.connections.write().await;
        if connections.contains_key(&peer_id) {
            return Err(SignalingError::PeerIdTaken(peer_id.into_string()));
        }
        connections.insert(peer_id, handle);
        Ok(())
    }

    pub async fn unregister(&self, peer_id: &PeerId) {
        self.connections.write().await.remove(peer_id);
    }

    pub async fn get(&self, peer_id: &PeerId) -> Option<ConnectionHandle> {
        self.connections.read().await.get(peer_id).cloned()
    }

    pub async fn is_registered(&self, peer_id: &PeerId) -> bool {
        self.connections.read().await.contains_key(peer_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(4);
        (ConnectionHandle::new(tx, CancellationToken::new()), rx)
    }

    #[tokio::test]
    async fn register_rejects_duplicate_peer_id() {
        let registry = PeerRegistry::new();
        let (h1, _rx1) = handle();
        let (h2, _rx2) = handle();
        registry.register(PeerId::new("alice".into()), h1).await.unwrap();
        let err = registry
            .register(PeerId::new("alice".into()), h2)
            .await
            .unwrap_err();
        assert_eq!(err, SignalingError::PeerIdTaken("alice".into()));
    }

    #[tokio::test]
    async fn unregister_frees_the_peer_id() {
        let registry = PeerRegistry::new();
        let (h1, _rx1) = handle();
        let peer_id = PeerId::new("alice".into());
        registry.register(peer_id.clone(), h1).await.unwrap();
        registry.unregister(&peer_id).await;
        let (h2, _rx2) = handle();
        assert!(registry.register(peer_id, h2).await.is_ok());
    }

    #[tokio::test]
    async fn best_effort_send_drops_rather_than_blocks_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(tx, CancellationToken::new());
        handle.send(Arc::from("first"), Priority::BestEffort).await;
        handle.send(Arc::from("second"), Priority::BestEffort).await;
        assert_eq!(&*rx.recv().await.unwrap(), "first");
        assert!(rx.try_recv().is_err());
    }
}

//! Registry of live peer sessions.
//!
//! Owned exclusively by the orchestrator; sessions reference the
//! orchestrator through its event channel, never by back-pointer, so
//! there is no cyclic ownership.

use std::collections::HashMap;

use tokio::sync::mpsc;

use ember_messages::{PeerAddress, PeerMessage};

/// The write side of one peer session.
#[derive(Clone, Debug)]
pub struct PeerHandle {
    pub addr: PeerAddress,
    pub sender: mpsc::Sender<PeerMessage>,
}

/// Outcome of a broadcast fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    pub sent: usize,
    pub failed: usize,
}

/// All live peer sessions, keyed by the peer's listening endpoint.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<String, PeerHandle>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, addr: &PeerAddress) -> bool {
        self.peers.contains_key(&addr.key())
    }

    /// Register a session. A newer session to the same endpoint replaces
    /// the old one (dropping its sender closes the stale write half).
    pub fn insert(&mut self, handle: PeerHandle) {
        let key = handle.addr.key();
        if self.peers.insert(key, handle).is_some() {
            tracing::debug!("replaced existing session for peer");
        }
    }

    pub fn remove(&mut self, addr: &PeerAddress) -> Option<PeerHandle> {
        self.peers.remove(&addr.key())
    }

    pub fn get(&self, addr: &PeerAddress) -> Option<&PeerHandle> {
        self.peers.get(&addr.key())
    }

    pub fn addresses(&self) -> Vec<PeerAddress> {
        self.peers.values().map(|h| h.addr.clone()).collect()
    }

    /// Send one message to one peer. Returns `false` if the peer is not
    /// registered or its session has gone away.
    pub async fn send_to(&self, addr: &PeerAddress, message: PeerMessage) -> bool {
        match self.peers.get(&addr.key()) {
            Some(handle) => handle.sender.send(message).await.is_ok(),
            None => false,
        }
    }

    /// Flood a message to every peer except (optionally) one.
    pub async fn broadcast(
        &self,
        message: &PeerMessage,
        except: Option<&PeerAddress>,
    ) -> BroadcastResult {
        let skip = except.map(|a| a.key());
        let mut result = BroadcastResult::default();

        for (key, handle) in &self.peers {
            if skip.as_deref() == Some(key.as_str()) {
                continue;
            }
            if handle.sender.send(message.clone()).await.is_ok() {
                result.sent += 1;
            } else {
                result.failed += 1;
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(host: &str, port: u16) -> (PeerHandle, mpsc::Receiver<PeerMessage>) {
        let (tx, rx) = mpsc::channel(16);
        (
            PeerHandle {
                addr: PeerAddress::new(host, port),
                sender: tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn insert_remove_and_addresses() {
        let mut registry = PeerRegistry::new();
        let (h1, _rx1) = handle("1.0.0.1", 1);
        let (h2, _rx2) = handle("1.0.0.2", 2);
        registry.insert(h1);
        registry.insert(h2);
        assert_eq!(registry.len(), 2);

        registry.remove(&PeerAddress::new("1.0.0.1", 1));
        assert_eq!(registry.addresses(), vec![PeerAddress::new("1.0.0.2", 2)]);
    }

    #[tokio::test]
    async fn reinsert_replaces_old_session() {
        let mut registry = PeerRegistry::new();
        let (old, mut old_rx) = handle("1.0.0.1", 1);
        registry.insert(old);
        let (new, mut new_rx) = handle("1.0.0.1", 1);
        registry.insert(new);
        assert_eq!(registry.len(), 1);

        registry
            .send_to(&PeerAddress::new("1.0.0.1", 1), PeerMessage::QueryAllBlocks)
            .await;
        assert!(new_rx.try_recv().is_ok());
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_skips_excluded_peer() {
        let mut registry = PeerRegistry::new();
        let (h1, mut rx1) = handle("1.0.0.1", 1);
        let (h2, mut rx2) = handle("1.0.0.2", 2);
        let (h3, mut rx3) = handle("1.0.0.3", 3);
        registry.insert(h1);
        registry.insert(h2);
        registry.insert(h3);

        let sender = PeerAddress::new("1.0.0.2", 2);
        let result = registry
            .broadcast(&PeerMessage::QueryLatestBlock, Some(&sender))
            .await;
        assert_eq!(result, BroadcastResult { sent: 2, failed: 0 });
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
        assert!(rx3.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_counts_dead_sessions() {
        let mut registry = PeerRegistry::new();
        let (h1, rx1) = handle("1.0.0.1", 1);
        registry.insert(h1);
        drop(rx1);

        let result = registry.broadcast(&PeerMessage::QueryLatestBlock, None).await;
        assert_eq!(result, BroadcastResult { sent: 0, failed: 1 });
    }

    #[tokio::test]
    async fn send_to_unknown_peer_is_false() {
        let registry = PeerRegistry::new();
        assert!(
            !registry
                .send_to(&PeerAddress::new("9.9.9.9", 9), PeerMessage::QueryAllBlocks)
                .await
        );
    }
}

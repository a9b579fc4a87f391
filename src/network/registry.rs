use std::net::SocketAddr;
use std::sync::Arc;

use log::info;
use tokio::sync::RwLock;

use crate::network::PeerConnection;
use crate::utils::{P2PError, Result};

/// Thread-safe registry of live peer connections, keyed by address.
///
/// Vec-backed so iteration follows insertion order, which the relay policy
/// relies on. All mutation goes through the lock; socket I/O never happens
/// while it is held.
pub struct PeerRegistry {
    max_peers: usize,
    peers: RwLock<Vec<Arc<PeerConnection>>>,
}

impl PeerRegistry {
    pub fn new(max_peers: usize) -> Self {
        Self {
            max_peers,
            peers: RwLock::new(Vec::new()),
        }
    }

    pub async fn insert(&self, conn: Arc<PeerConnection>) -> Result<()> {
        let mut peers = self.peers.write().await;

        if peers.iter().any(|p| p.addr() == conn.addr()) {
            return Err(P2PError::DuplicatePeer(conn.addr()));
        }
        if peers.len() >= self.max_peers {
            return Err(P2PError::TooManyPeers(self.max_peers));
        }

        info!("Registered peer: {} ({} total)", conn.addr(), peers.len() + 1);
        peers.push(conn);
        Ok(())
    }

    /// Returns true if the address was registered. Safe to call twice for
    /// the same teardown; the second call is a no-op.
    pub async fn remove(&self, addr: SocketAddr) -> bool {
        let mut peers = self.peers.write().await;
        let before = peers.len();
        peers.retain(|p| p.addr() != addr);
        let removed = peers.len() < before;
        if removed {
            info!("Removed peer: {} ({} total)", addr, peers.len());
        }
        removed
    }

    pub async fn get(&self, addr: SocketAddr) -> Option<Arc<PeerConnection>> {
        self.peers
            .read()
            .await
            .iter()
            .find(|p| p.addr() == addr)
            .cloned()
    }

    /// Every registered connection, in insertion order.
    pub async fn all(&self) -> Vec<Arc<PeerConnection>> {
        self.peers.read().await.to_vec()
    }

    /// All connections except `excluded`, in insertion order. This is the
    /// fan-out set for relaying a query onward.
    pub async fn others(&self, excluded: SocketAddr) -> Vec<Arc<PeerConnection>> {
        self.peers
            .read()
            .await
            .iter()
            .filter(|p| p.addr() != excluded)
            .cloned()
            .collect()
    }

    pub async fn addrs(&self) -> Vec<SocketAddr> {
        self.peers.read().await.iter().map(|p| p.addr()).collect()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(port: u16) -> Arc<PeerConnection> {
        let (writer, _reader) = tokio::io::duplex(64);
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        Arc::new(PeerConnection::new(addr, writer))
    }

    #[tokio::test]
    async fn insert_lookup_remove() {
        let registry = PeerRegistry::new(8);
        let c = conn(9001);
        registry.insert(c.clone()).await.unwrap();

        assert!(registry.get(c.addr()).await.is_some());
        assert!(registry.remove(c.addr()).await);
        assert!(registry.get(c.addr()).await.is_none());
        assert!(!registry.remove(c.addr()).await);
    }

    #[tokio::test]
    async fn duplicate_address_is_rejected() {
        let registry = PeerRegistry::new(8);
        registry.insert(conn(9002)).await.unwrap();
        let err = registry.insert(conn(9002)).await.unwrap_err();
        assert!(matches!(err, P2PError::DuplicatePeer(_)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn peer_cap_is_enforced() {
        let registry = PeerRegistry::new(2);
        registry.insert(conn(9003)).await.unwrap();
        registry.insert(conn(9004)).await.unwrap();
        let err = registry.insert(conn(9005)).await.unwrap_err();
        assert!(matches!(err, P2PError::TooManyPeers(2)));
    }

    #[tokio::test]
    async fn others_excludes_and_preserves_insertion_order() {
        let registry = PeerRegistry::new(8);
        for port in [9010, 9011, 9012] {
            registry.insert(conn(port)).await.unwrap();
        }

        let excluded: SocketAddr = "127.0.0.1:9011".parse().unwrap();
        let others = registry.others(excluded).await;
        let ports: Vec<u16> = others.iter().map(|p| p.addr().port()).collect();
        assert_eq!(ports, vec![9010, 9012]);
    }

    #[tokio::test]
    async fn concurrent_registrations_never_lose_or_duplicate() {
        let registry = Arc::new(PeerRegistry::new(64));
        let mut handles = Vec::new();

        for port in 9100..9132u16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.insert(conn(port)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len().await, 32);
    }
}

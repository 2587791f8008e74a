//! Peer registry: deduplicated dialable addresses with random sampling

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::sync::RwLock;
use tracing::debug;

/// Shared set of known peer addresses.
///
/// Addresses are dialable `host:port` strings as advertised by the peers
/// themselves. The local node's own advertised address is never admitted,
/// so gossip can fan out over the whole registry without self-delivery.
#[derive(Clone)]
pub struct PeerRegistry {
    local_addr: String,
    peers: Arc<RwLock<HashSet<String>>>,
}

impl PeerRegistry {
    /// Create a registry that filters out `local_addr`.
    pub fn new(local_addr: impl Into<String>) -> Self {
        Self {
            local_addr: local_addr.into(),
            peers: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// The address this node advertises to peers.
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// Idempotent insert. Empty addresses and the local address are ignored.
    pub async fn add(&self, addr: impl Into<String>) {
        let addr = addr.into();
        if addr.is_empty() || addr == self.local_addr {
            return;
        }
        let mut peers = self.peers.write().await;
        if peers.insert(addr.clone()) {
            debug!(%addr, "peer added");
        }
    }

    /// Idempotent delete.
    pub async fn remove(&self, addr: &str) {
        let mut peers = self.peers.write().await;
        if peers.remove(addr) {
            debug!(addr, "peer removed");
        }
    }

    /// Snapshot of all known peers. The snapshot does not stay valid under
    /// concurrent mutation.
    pub async fn list(&self) -> Vec<String> {
        self.peers.read().await.iter().cloned().collect()
    }

    /// Number of known peers.
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Whether no peers are known.
    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    /// Whether `addr` is currently known.
    pub async fn contains(&self, addr: &str) -> bool {
        self.peers.read().await.contains(addr)
    }

    /// Draw `round(sqrt(N))` distinct addresses, without replacement.
    /// Empty when no peers are known.
    pub async fn sample(&self) -> Vec<String> {
        let snapshot = self.list().await;
        let mut rng = rand::thread_rng();
        snapshot
            .choose_multiple(&mut rng, sample_size(snapshot.len()))
            .cloned()
            .collect()
    }
}

/// Probe sample size for `n` known peers: `round(sqrt(n))`, at least 1
/// whenever any peer is known.
pub fn sample_size(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        ((n as f64).sqrt().round() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_add_and_remove_are_idempotent() {
        let registry = PeerRegistry::new("127.0.0.1:8001");

        registry.add("10.0.0.1:8001").await;
        registry.add("10.0.0.1:8001").await;
        assert_eq!(registry.len().await, 1);

        registry.remove("10.0.0.1:8001").await;
        registry.remove("10.0.0.1:8001").await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_local_address_is_never_admitted() {
        let registry = PeerRegistry::new("127.0.0.1:8001");
        registry.add("127.0.0.1:8001").await;
        registry.add("").await;
        assert!(registry.is_empty().await);
    }

    #[test]
    fn test_sample_size_rule() {
        assert_eq!(sample_size(0), 0);
        assert_eq!(sample_size(1), 1);
        assert_eq!(sample_size(2), 1);
        assert_eq!(sample_size(9), 3);
        assert_eq!(sample_size(16), 4);
    }

    #[tokio::test]
    async fn test_sample_has_no_duplicates() {
        let registry = PeerRegistry::new("127.0.0.1:8001");
        for i in 0..16 {
            registry.add(format!("10.0.0.{i}:8001")).await;
        }

        for _ in 0..20 {
            let sample = registry.sample().await;
            assert_eq!(sample.len(), 4);
            let distinct: HashSet<_> = sample.iter().collect();
            assert_eq!(distinct.len(), sample.len());
        }
    }

    #[tokio::test]
    async fn test_sample_of_empty_registry_is_empty() {
        let registry = PeerRegistry::new("127.0.0.1:8001");
        assert!(registry.sample().await.is_empty());
    }

    #[tokio::test]
    async fn test_single_peer_is_always_sampled() {
        let registry = PeerRegistry::new("127.0.0.1:8001");
        registry.add("10.0.0.1:8001").await;
        assert_eq!(registry.sample().await, vec!["10.0.0.1:8001".to_string()]);
    }
}

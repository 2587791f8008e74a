//! Gossip subsystem: bootstrap synchronization, block broadcast and
//! liveness probing over the peer HTTP endpoints

use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::block::Block;
use crate::chain::ChainStore;
use crate::error::{NetworkError, Result};
use crate::peers::PeerRegistry;

/// Header carrying the sender's advertised dialable address.
///
/// Authoritative over the socket origin, which may expose an unroutable
/// ephemeral port.
pub const NODE_ADDR_HEADER: &str = "Node-Addr";

/// Per-request timeout for gossip calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounds of the randomized delay between liveness probe rounds, in seconds
pub const PROBE_DELAY_SECS: (u64, u64) = (20, 40);

/// Body of `GET /chain` responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainPayload {
    pub data: Vec<Block>,
}

/// Body of `GET /nodes` responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesPayload {
    pub data: Vec<String>,
}

/// Body of `POST /receive-block` requests and `POST /add` responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockPayload {
    pub data: Block,
}

/// Body of `GET /ping` responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingPayload {
    pub status: String,
}

/// Best-effort gossip over the peer registry.
///
/// Every outbound request advertises the local dialable address through
/// [`NODE_ADDR_HEADER`] so the contacted peer can dial back.
#[derive(Clone)]
pub struct GossipService {
    chain: ChainStore,
    peers: PeerRegistry,
    client: reqwest::Client,
    local_addr: String,
}

impl GossipService {
    pub fn new(chain: ChainStore, peers: PeerRegistry, local_addr: impl Into<String>) -> Self {
        Self {
            chain,
            peers,
            client: reqwest::Client::new(),
            local_addr: local_addr.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, addr: &str, path: &str) -> Result<T> {
        let url = format!("http://{addr}{path}");
        let resp = self
            .client
            .get(&url)
            .header(NODE_ADDR_HEADER, &self.local_addr)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|source| NetworkError::ConnectionFailed {
                addr: addr.to_string(),
                source,
            })?;
        if !resp.status().is_success() {
            return Err(NetworkError::UnexpectedStatus {
                addr: addr.to_string(),
                status: resp.status(),
            }
            .into());
        }
        resp.json::<T>()
            .await
            .map_err(|source| NetworkError::DecodeFailed {
                addr: addr.to_string(),
                source,
            }
            .into())
    }

    /// Synchronize with a seed node: fetch its peer list and chain, then
    /// apply both.
    ///
    /// Both fetches must succeed before any local state is touched, so a
    /// failed join never leaves peers applied without the chain or vice
    /// versa. The candidate chain is validated before the peer list is
    /// applied for the same reason.
    pub async fn bootstrap_join(&self, seed: &str) -> Result<()> {
        let nodes: NodesPayload = self.get_json(seed, "/nodes").await?;
        let chain: ChainPayload = self.get_json(seed, "/chain").await?;

        let candidate = chain.data;
        if !candidate.is_empty() {
            ChainStore::validate_chain(&candidate)?;
        }

        self.peers.add(seed).await;
        for addr in nodes.data {
            self.peers.add(addr).await;
        }
        if !candidate.is_empty() {
            self.chain.accept_external_chain(candidate).await?;
        }

        info!(seed, peers = self.peers.len().await, "bootstrap join complete");
        Ok(())
    }

    /// Push a block to every known peer.
    ///
    /// Deliveries run concurrently; a peer that cannot be reached or answers
    /// with a non-success status is evicted, and the remaining peers still
    /// receive the block.
    pub async fn broadcast_block(&self, block: &Block) {
        let snapshot = self.peers.list().await;
        if snapshot.is_empty() {
            return;
        }
        debug!(index = block.index, peers = snapshot.len(), "broadcasting block");

        let deliveries = snapshot.iter().map(|peer| self.deliver(peer, block));
        for (peer, result) in snapshot.iter().zip(join_all(deliveries).await) {
            if let Err(err) = result {
                warn!(%peer, %err, "block delivery failed, evicting peer");
                self.peers.remove(peer).await;
            }
        }
    }

    async fn deliver(&self, addr: &str, block: &Block) -> Result<()> {
        let url = format!("http://{addr}/receive-block");
        let resp = self
            .client
            .post(&url)
            .header(NODE_ADDR_HEADER, &self.local_addr)
            .timeout(REQUEST_TIMEOUT)
            .json(&BlockPayload {
                data: block.clone(),
            })
            .send()
            .await
            .map_err(|source| NetworkError::ConnectionFailed {
                addr: addr.to_string(),
                source,
            })?;
        if !resp.status().is_success() {
            return Err(NetworkError::UnexpectedStatus {
                addr: addr.to_string(),
                status: resp.status(),
            }
            .into());
        }
        Ok(())
    }

    /// Probe a `round(sqrt(N))` random sample of peers and evict the ones
    /// that fail to answer.
    pub async fn probe_liveness(&self) {
        let sample = self.peers.sample().await;
        if sample.is_empty() {
            return;
        }
        debug!(?sample, "probing peers");

        let probes = sample.iter().map(|peer| self.probe(peer));
        for (peer, result) in sample.iter().zip(join_all(probes).await) {
            if let Err(err) = result {
                warn!(%peer, %err, "liveness probe failed, evicting peer");
                self.peers.remove(peer).await;
            }
        }
    }

    async fn probe(&self, addr: &str) -> Result<()> {
        let _: PingPayload = self.get_json(addr, "/ping").await?;
        Ok(())
    }

    /// Drive [`Self::probe_liveness`] until `shutdown` fires.
    ///
    /// The inter-round delay is drawn uniformly from [`PROBE_DELAY_SECS`]
    /// so peers across the network do not probe in lockstep.
    pub async fn run_prober(&self, shutdown: CancellationToken) {
        let (min, max) = PROBE_DELAY_SECS;
        loop {
            let delay = Duration::from_secs(rand::thread_rng().gen_range(min..=max));
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("liveness prober stopped");
                    return;
                }
                _ = tokio::time::sleep(delay) => self.probe_liveness().await,
            }
        }
    }
}

//! Node wiring: configuration, startup, background tasks and shutdown

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::chain::ChainStore;
use crate::error::Result;
use crate::gossip::GossipService;
use crate::peers::PeerRegistry;

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port the HTTP listener binds
    pub port: u16,

    /// Dialable address advertised to peers; defaults to `127.0.0.1:<port>`
    pub advertised_addr: Option<String>,

    /// Seed node to bootstrap against; a fresh chain is seeded when absent
    pub bootstrap: Option<String>,

    /// How long in-flight requests and background tasks may drain on stop
    pub shutdown_grace: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            advertised_addr: None,
            bootstrap: None,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// A running chainmesh node: chain store, peer registry, gossip service and
/// the HTTP surface tying them together.
pub struct Node {
    config: NodeConfig,
    chain: ChainStore,
    peers: PeerRegistry,
    gossip: GossipService,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        let advertised = config
            .advertised_addr
            .clone()
            .unwrap_or_else(|| format!("127.0.0.1:{}", config.port));

        let chain = ChainStore::new();
        let peers = PeerRegistry::new(advertised.clone());
        let gossip = GossipService::new(chain.clone(), peers.clone(), advertised);

        Self {
            config,
            chain,
            peers,
            gossip,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn chain(&self) -> &ChainStore {
        &self.chain
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn gossip(&self) -> &GossipService {
        &self.gossip
    }

    /// Bring the chain up, start the liveness prober and serve HTTP.
    ///
    /// With a bootstrap seed configured the node joins the network first and
    /// aborts startup if the join fails; otherwise it seeds a fresh genesis
    /// chain. Returns the bound listener address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        match &self.config.bootstrap {
            Some(seed) => {
                self.gossip.bootstrap_join(seed).await?;
                if self.chain.is_empty().await {
                    // Seed had no chain yet; start our own.
                    self.chain.init_genesis().await?;
                }
            },
            None => self.chain.init_genesis().await?,
        }

        let prober = {
            let gossip = self.gossip.clone();
            let token = self.shutdown.clone();
            tokio::spawn(async move { gossip.run_prober(token).await })
        };
        self.tasks.push(prober);

        let state = AppState {
            chain: self.chain.clone(),
            peers: self.peers.clone(),
            gossip: self.gossip.clone(),
        };
        let app = api::router(state);

        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "node listening");

        let token = self.shutdown.clone();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = result {
                error!(%err, "HTTP server exited with error");
            }
        });
        self.tasks.push(server);

        Ok(addr)
    }

    /// Signal shutdown and wait for tasks to drain, aborting any that
    /// overrun the grace period.
    pub async fn stop(&mut self) -> Result<()> {
        info!("shutting down node");
        self.shutdown.cancel();

        for handle in self.tasks.drain(..) {
            let abort = handle.abort_handle();
            if tokio::time::timeout(self.config.shutdown_grace, handle)
                .await
                .is_err()
            {
                warn!("task did not drain within grace period, aborting");
                abort.abort();
            }
        }
        Ok(())
    }
}

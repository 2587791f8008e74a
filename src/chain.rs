//! Concurrency-safe chain store: mining, appending and external ingestion

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task;
use tracing::{debug, info};

use crate::block::{self, Block, DIFFICULTY};
use crate::error::{ChainError, ChainmeshError, Result};

/// Shared, lock-guarded sequence of blocks.
///
/// All chain mutations are serialized by a single `RwLock`, so length and
/// tip hash are internally consistent at any observation point. Mining is
/// never performed while the lock is held: `append` reads the tip, releases
/// the lock for the search, then re-acquires it to install the result.
#[derive(Clone, Default)]
pub struct ChainStore {
    blocks: Arc<RwLock<Vec<Block>>>,
}

impl ChainStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mine and install a genesis block if the store is still empty.
    pub async fn init_genesis(&self) -> Result<()> {
        let genesis = task::spawn_blocking(block::genesis)
            .await
            .map_err(|e| ChainmeshError::Generic(format!("mining task failed: {e}")))??;

        let mut blocks = self.blocks.write().await;
        if blocks.is_empty() {
            info!(hash = %genesis.hash, "genesis block created");
            blocks.push(genesis);
        }
        Ok(())
    }

    /// Snapshot of the full chain.
    pub async fn blocks(&self) -> Vec<Block> {
        self.blocks.read().await.clone()
    }

    /// Current chain length.
    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    /// Whether no genesis block exists yet.
    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }

    /// Copy of the current tip, if any.
    pub async fn tip(&self) -> Option<Block> {
        self.blocks.read().await.last().cloned()
    }

    /// Mine a block carrying `data` and append it to the chain.
    ///
    /// Fails with `EmptyChain` before genesis and with `StaleTip` when
    /// another block landed while this one was being mined.
    pub async fn append(&self, data: impl Into<String>) -> Result<Block> {
        let data = data.into();
        let tip = self.tip().await.ok_or(ChainError::EmptyChain)?;
        let candidate = Block::next_candidate(&tip, data);

        let mined = task::spawn_blocking(move || -> Result<Block> {
            let (hash, nonce) = block::mine(&candidate)?;
            Ok(Block {
                hash,
                nonce,
                ..candidate
            })
        })
        .await
        .map_err(|e| ChainmeshError::Generic(format!("mining task failed: {e}")))??;

        let mut blocks = self.blocks.write().await;
        let tip_now = blocks.last().ok_or(ChainError::EmptyChain)?;
        if tip_now.hash != mined.prev_hash {
            return Err(ChainError::StaleTip.into());
        }
        debug!(index = mined.index, hash = %mined.hash, "block appended");
        blocks.push(mined.clone());
        Ok(mined)
    }

    /// Accept a single externally supplied block as the new tip.
    ///
    /// The block must pass complete validation, meet the difficulty target
    /// and link onto the current tip; otherwise it is rejected without
    /// mutating the chain.
    pub async fn accept_external_block(&self, block: Block) -> Result<()> {
        block::validate_complete(&block)?;
        if !block::meets_difficulty(&block.hash) {
            return Err(ChainError::DifficultyNotMet {
                hash: block.hash,
                difficulty: DIFFICULTY,
            }
            .into());
        }

        let mut blocks = self.blocks.write().await;
        let tip = blocks.last().ok_or(ChainError::EmptyChain)?;
        if block.index != tip.index + 1 {
            return Err(ChainError::IndexMismatch {
                index: block.index,
                tip_index: tip.index,
            }
            .into());
        }
        if block.prev_hash != tip.hash {
            return Err(ChainError::LinkageMismatch {
                prev_hash: block.prev_hash,
                tip_hash: tip.hash.clone(),
            }
            .into());
        }
        info!(index = block.index, hash = %block.hash, "external block accepted");
        blocks.push(block);
        Ok(())
    }

    /// Validate a standalone chain: genesis shape, per-block digest and
    /// difficulty, and adjacent index/hash linkage.
    pub fn validate_chain(candidate: &[Block]) -> Result<()> {
        let genesis = candidate.first().ok_or(ChainError::EmptyChain)?;
        if !genesis.is_genesis() {
            return Err(ChainError::MalformedGenesis.into());
        }

        for block in candidate {
            block::validate_complete(block)?;
            if !block::meets_difficulty(&block.hash) {
                return Err(ChainError::DifficultyNotMet {
                    hash: block.hash.clone(),
                    difficulty: DIFFICULTY,
                }
                .into());
            }
        }

        for pair in candidate.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            if cur.index != prev.index + 1 {
                return Err(ChainError::IndexMismatch {
                    index: cur.index,
                    tip_index: prev.index,
                }
                .into());
            }
            if cur.prev_hash != prev.hash {
                return Err(ChainError::LinkageMismatch {
                    prev_hash: cur.prev_hash.clone(),
                    tip_hash: prev.hash.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Replace the local chain with a fully validated, strictly longer
    /// candidate. Returns whether the replacement happened; the local chain
    /// is never shortened.
    pub async fn accept_external_chain(&self, candidate: Vec<Block>) -> Result<bool> {
        if candidate.is_empty() {
            return Ok(false);
        }
        Self::validate_chain(&candidate)?;

        let mut blocks = self.blocks.write().await;
        if candidate.len() > blocks.len() {
            info!(
                local = blocks.len(),
                candidate = candidate.len(),
                "replacing local chain with longer candidate"
            );
            *blocks = candidate;
            Ok(true)
        } else {
            debug!(
                local = blocks.len(),
                candidate = candidate.len(),
                "candidate chain not longer, keeping local chain"
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainmeshError;

    async fn seeded_store() -> ChainStore {
        let store = ChainStore::new();
        store.init_genesis().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_append_requires_genesis() {
        let store = ChainStore::new();
        assert!(matches!(
            store.append("x").await,
            Err(ChainmeshError::Chain(ChainError::EmptyChain))
        ));
    }

    #[tokio::test]
    async fn test_append_twice_links_blocks() {
        let store = seeded_store().await;
        store.append("x").await.unwrap();
        store.append("x").await.unwrap();

        let chain = store.blocks().await;
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[1].prev_hash, chain[0].hash);
        assert_eq!(chain[2].prev_hash, chain[1].hash);
        assert_eq!(chain[2].index, 2);
        assert!(block::meets_difficulty(&chain[1].hash));
        assert!(block::meets_difficulty(&chain[2].hash));
    }

    #[tokio::test]
    async fn test_accept_external_block_extends_tip() {
        let store = seeded_store().await;
        let tip = store.tip().await.unwrap();

        let mut next = Block::next_candidate(&tip, "remote block");
        let (hash, nonce) = block::mine(&next).unwrap();
        next.hash = hash;
        next.nonce = nonce;

        store.accept_external_block(next.clone()).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert_eq!(store.tip().await.unwrap(), next);
    }

    #[tokio::test]
    async fn test_accept_external_block_rejects_stale_prev_hash() {
        let store = seeded_store().await;
        let tip = store.tip().await.unwrap();

        let mut stale = Block::next_candidate(&tip, "stale block");
        stale.prev_hash = "0000feedbeef".to_string();
        let (hash, nonce) = block::mine(&stale).unwrap();
        stale.hash = hash;
        stale.nonce = nonce;

        let before = store.blocks().await;
        let result = store.accept_external_block(stale).await;
        assert!(matches!(
            result,
            Err(ChainmeshError::Chain(ChainError::LinkageMismatch { .. }))
        ));
        assert_eq!(store.blocks().await, before);
    }

    #[tokio::test]
    async fn test_accept_external_block_rejects_bad_hash() {
        let store = seeded_store().await;
        let tip = store.tip().await.unwrap();

        let mut forged = Block::next_candidate(&tip, "forged block");
        forged.hash = "0000".to_string() + &"f".repeat(60);

        let result = store.accept_external_block(forged).await;
        assert!(matches!(
            result,
            Err(ChainmeshError::Chain(ChainError::HashMismatch { .. }))
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_accept_external_chain_replaces_longer_only() {
        let longer = {
            let store = seeded_store().await;
            store.append("a").await.unwrap();
            store.append("b").await.unwrap();
            store.blocks().await
        };

        let store = seeded_store().await;
        let before = store.len().await;

        // Equal-length candidate is kept out.
        let same = store.blocks().await;
        assert!(!store.accept_external_chain(same).await.unwrap());
        assert_eq!(store.len().await, before);

        // Strictly longer candidate replaces wholesale.
        assert!(store.accept_external_chain(longer.clone()).await.unwrap());
        assert_eq!(store.blocks().await, longer);

        // A shorter candidate afterwards never shortens the chain.
        let short = vec![longer[0].clone()];
        assert!(!store.accept_external_chain(short).await.unwrap());
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_accept_external_chain_rejects_broken_link() {
        let store = seeded_store().await;
        let mut candidate = {
            let donor = seeded_store().await;
            donor.append("a").await.unwrap();
            donor.append("b").await.unwrap();
            donor.blocks().await
        };
        candidate[2].prev_hash = "0000deadbeef".to_string();

        assert!(store.accept_external_chain(candidate).await.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_accept_external_chain_rejects_foreign_genesis() {
        let store = ChainStore::new();
        let mut candidate = vec![block::genesis().unwrap()];
        candidate[0].data = "Some other chain".to_string();
        let (hash, nonce) = block::mine(&candidate[0]).unwrap();
        candidate[0].hash = hash;
        candidate[0].nonce = nonce;

        assert!(matches!(
            store.accept_external_chain(candidate).await,
            Err(ChainmeshError::Chain(ChainError::MalformedGenesis))
        ));
    }
}

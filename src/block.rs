//! Block type, canonical hashing and proof-of-work mining

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BlockError, ChainError, Result};

/// Number of leading zero hex digits required of a block hash
pub const DIFFICULTY: usize = 4;

/// Timestamp layout used in block headers
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fixed payload of the genesis block
pub const GENESIS_DATA: &str = "First block in the chain";

/// One ledger entry.
///
/// Wire representation is a flat JSON object with camelCase field names
/// (`index`, `time`, `data`, `prevHash`, `hash`, `nonce`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Position in the chain; 0 is reserved for genesis
    pub index: u64,
    /// Creation time, formatted with [`TIME_FORMAT`]
    pub time: String,
    /// Opaque payload supplied by the block's creator
    pub data: String,
    /// Hex digest of the preceding block; empty only for genesis
    pub prev_hash: String,
    /// Hex digest of this block's canonical fields
    pub hash: String,
    /// Proof-of-work counter, part of the hash preimage
    pub nonce: u64,
}

impl Block {
    /// Build an unmined candidate for the slot after `tip`.
    pub fn next_candidate(tip: &Block, data: impl Into<String>) -> Self {
        Self {
            index: tip.index + 1,
            time: Utc::now().format(TIME_FORMAT).to_string(),
            data: data.into(),
            prev_hash: tip.hash.clone(),
            hash: String::new(),
            nonce: 0,
        }
    }

    /// Unmined genesis template with the fixed payload.
    pub fn genesis_template() -> Self {
        Self {
            index: 0,
            time: Utc::now().format(TIME_FORMAT).to_string(),
            data: GENESIS_DATA.to_string(),
            prev_hash: String::new(),
            hash: String::new(),
            nonce: 0,
        }
    }

    /// Whether this block has the fixed genesis shape.
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.prev_hash.is_empty() && self.data == GENESIS_DATA
    }
}

/// Check the fields that can be judged without hashing: non-empty payload
/// and a timestamp that parses under [`TIME_FORMAT`].
pub fn validate_structure(block: &Block) -> Result<()> {
    if block.data.is_empty() {
        return Err(BlockError::EmptyData.into());
    }
    if NaiveDateTime::parse_from_str(&block.time, TIME_FORMAT).is_err() {
        return Err(BlockError::MalformedTimestamp {
            time: block.time.clone(),
            format: TIME_FORMAT,
        }
        .into());
    }
    Ok(())
}

/// SHA-256 over the decimal index, time, data, prevHash and decimal nonce,
/// concatenated in that fixed order. Validates structure first.
pub fn block_hash(block: &Block) -> Result<String> {
    validate_structure(block)?;
    Ok(digest_with_nonce(block, block.nonce))
}

fn digest_with_nonce(block: &Block, nonce: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(block.index.to_string().as_bytes());
    hasher.update(block.time.as_bytes());
    hasher.update(block.data.as_bytes());
    hasher.update(block.prev_hash.as_bytes());
    hasher.update(nonce.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Check if a hash meets the difficulty requirement.
pub fn meets_difficulty(hash: &str) -> bool {
    hash.starts_with(&"0".repeat(DIFFICULTY))
}

/// Structural validation plus comparison of the stored hash against a
/// recomputed digest. Does not check linkage to a predecessor.
pub fn validate_complete(block: &Block) -> Result<()> {
    let computed = block_hash(block)?;
    if computed != block.hash {
        return Err(ChainError::HashMismatch {
            stored: block.hash.clone(),
            computed,
        }
        .into());
    }
    Ok(())
}

/// Search nonces from zero until the digest meets the difficulty target,
/// returning the first `(hash, nonce)` pair found.
///
/// The candidate is validated up front; the search loop itself has no
/// failure mode short of exhausting the nonce space. CPU-bound with no time
/// limit, so async callers run it under `spawn_blocking`.
pub fn mine(block: &Block) -> Result<(String, u64)> {
    validate_structure(block)?;
    for nonce in 0..u64::MAX {
        let hash = digest_with_nonce(block, nonce);
        if meets_difficulty(&hash) {
            return Ok((hash, nonce));
        }
    }
    Err(ChainError::NonceExhausted.into())
}

/// Build and mine the fixed first block of a chain.
pub fn genesis() -> Result<Block> {
    let mut block = Block::genesis_template();
    let (hash, nonce) = mine(&block)?;
    block.hash = hash;
    block.nonce = nonce;
    Ok(block)
}

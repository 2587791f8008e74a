//! Error types for the chainmesh library

use thiserror::Error;

/// Result type alias for chainmesh operations
pub type Result<T> = std::result::Result<T, ChainmeshError>;

/// Main error type for chainmesh operations
#[derive(Error, Debug)]
pub enum ChainmeshError {
    /// Structural block errors
    #[error("Block error: {0}")]
    Block(#[from] BlockError),

    /// Chain-level errors
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors with message
    #[error("{0}")]
    Generic(String),
}

/// Structural validation errors for a single block
#[derive(Error, Debug)]
pub enum BlockError {
    /// Block payload must not be empty
    #[error("block data cannot be empty")]
    EmptyData,

    /// Timestamp does not parse under the canonical layout
    #[error("block time {time:?} does not match format {format:?}")]
    MalformedTimestamp { time: String, format: &'static str },
}

/// Errors raised by chain validation and mutation
#[derive(Error, Debug)]
pub enum ChainError {
    /// No genesis block exists yet
    #[error("chain has no genesis block")]
    EmptyChain,

    /// Stored hash differs from the recomputed digest
    #[error("stored hash {stored} does not match computed digest {computed}")]
    HashMismatch { stored: String, computed: String },

    /// Hash lacks the required leading-zero prefix
    #[error("hash {hash} does not meet difficulty target of {difficulty} leading zeros")]
    DifficultyNotMet { hash: String, difficulty: usize },

    /// Block does not link to the current tip
    #[error("block prevHash {prev_hash} does not match tip hash {tip_hash}")]
    LinkageMismatch { prev_hash: String, tip_hash: String },

    /// Block index does not follow the current tip
    #[error("block index {index} does not follow tip index {tip_index}")]
    IndexMismatch { index: u64, tip_index: u64 },

    /// Tip moved while the block was being mined
    #[error("chain tip changed while mining")]
    StaleTip,

    /// Candidate chain does not begin with a well-formed genesis block
    #[error("candidate chain has a malformed genesis block")]
    MalformedGenesis,

    /// Nonce space ran out before the target was met
    #[error("nonce space exhausted without meeting the difficulty target")]
    NonceExhausted,
}

/// Network-specific error types
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Failed to reach a peer
    #[error("failed to reach {addr}: {source}")]
    ConnectionFailed { addr: String, source: reqwest::Error },

    /// Peer answered with a non-success status
    #[error("unexpected status {status} from {addr}")]
    UnexpectedStatus {
        addr: String,
        status: reqwest::StatusCode,
    },

    /// Peer response body did not decode
    #[error("failed to decode response from {addr}: {source}")]
    DecodeFailed { addr: String, source: reqwest::Error },
}

impl ChainmeshError {
    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        ChainmeshError::Config(msg.into())
    }

    /// Create a generic error
    pub fn generic<T: Into<String>>(msg: T) -> Self {
        ChainmeshError::Generic(msg.into())
    }
}

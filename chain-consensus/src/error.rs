//! Consensus error types

use chain_core::{Address, BlockNumber, CoreError};
use chain_db::DbError;
use thiserror::Error;

/// Consensus error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// Block (or one of its ancestors) is not known
    #[error("Unknown block")]
    UnknownBlock,

    /// Header does not follow the extra-data layout
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Header timestamp is ahead of local time
    #[error("Block in the future: timestamp {timestamp}, now {now}")]
    FutureBlock { timestamp: u64, now: u64 },

    /// Header timestamp is too close to its parent
    #[error("Invalid timestamp: expected at least {expected}, got {actual}")]
    InvalidTimestamp { expected: u64, actual: u64 },

    /// Seal is missing from extra-data
    #[error("Extra-data 65 byte signature suffix missing")]
    MissingSignature,

    /// Seal is present but no address can be recovered from it
    #[error("Invalid signer: {0}")]
    InvalidSigner(String),

    /// Recovered signer is not in the authorized set
    #[error("Unauthorized signer {0}")]
    UnauthorizedSigner(Address),

    /// Signer authored a block within the recent window
    #[error("Signer {signer} recently signed block {last}")]
    RecentlySigned { signer: Address, last: BlockNumber },

    /// Difficulty does not match the signer's turn
    #[error("Invalid difficulty: expected {expected}, got {actual}")]
    InvalidDifficulty { expected: u64, actual: u64 },

    /// Vote is rejected by the membership rules
    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    /// Replayed header does not extend the snapshot
    #[error("Out of sequence header: expected #{expected}, got #{actual}")]
    OutOfSequence { expected: BlockNumber, actual: BlockNumber },

    /// Checkpoint header lists a signer set different from the snapshot
    #[error("Mismatching signer list on checkpoint block")]
    CheckpointSignersMismatch,

    /// Header lookup failed while walking back through history
    #[error("Missing header #{number} in chain")]
    ChainReadError { number: BlockNumber },

    /// Genesis header holds no usable signer configuration
    #[error("Genesis mismatch: {0}")]
    GenesisMismatch(String),

    /// No local key is available for the signer
    #[error("Signer unavailable: {0}")]
    SignerUnavailable(Address),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Checkpoint storage error
    #[error("Database error: {0}")]
    Database(String),

    /// Hashing or signing failure
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl From<serde_json::Error> for ConsensusError {
    fn from(err: serde_json::Error) -> Self {
        ConsensusError::Serialization(err.to_string())
    }
}

impl From<DbError> for ConsensusError {
    fn from(err: DbError) -> Self {
        ConsensusError::Database(err.to_string())
    }
}

impl From<CoreError> for ConsensusError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidSignature => ConsensusError::MissingSignature,
            other => ConsensusError::Crypto(other.to_string()),
        }
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

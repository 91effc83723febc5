//! Block data structures and operations

use crate::crypto::{keccak256, SIGNATURE_LENGTH};
use crate::{BlockNumber, CoreError, CoreResult, Hash, Timestamp};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct BlockHeader {
    /// Hash of the parent block
    pub parent_hash: Hash,
    /// Block number (height)
    pub number: BlockNumber,
    /// Root hash of the state trie
    pub state_root: Hash,
    /// Root hash of the transaction trie
    pub transactions_root: Hash,
    /// Root hash of the receipts trie
    pub receipts_root: Hash,
    /// Turn marker: in-turn and out-of-turn blocks carry different values
    pub difficulty: u64,
    /// Block timestamp in seconds
    pub timestamp: Timestamp,
    /// Vanity, consensus payload and seal
    pub extra_data: Vec<u8>,
    /// Unused by the authority engines, kept zero
    pub nonce: u64,
    /// Gas limit for all transactions in this block
    pub gas_limit: u64,
    /// Gas used by all transactions in this block
    pub gas_used: u64,
}

impl BlockHeader {
    /// Create an empty child header of `parent`
    pub fn child_of(parent: &BlockHeader) -> CoreResult<Self> {
        Ok(Self {
            parent_hash: parent.hash()?,
            number: parent.number + 1,
            state_root: parent.state_root,
            transactions_root: Hash::zero(),
            receipts_root: Hash::zero(),
            difficulty: 0,
            timestamp: parent.timestamp,
            extra_data: Vec::new(),
            nonce: 0,
            gas_limit: parent.gas_limit,
            gas_used: 0,
        })
    }

    /// Calculate the hash of this block header
    pub fn hash(&self) -> CoreResult<Hash> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))?;
        Ok(keccak256(&encoded))
    }

    /// Hash that the block producer signs: the header with the trailing
    /// seal bytes of `extra_data` removed.
    pub fn seal_hash(&self) -> CoreResult<Hash> {
        if self.extra_data.len() < SIGNATURE_LENGTH {
            return Err(CoreError::InvalidSignature);
        }
        let mut unsealed = self.clone();
        unsealed
            .extra_data
            .truncate(self.extra_data.len() - SIGNATURE_LENGTH);
        unsealed.hash()
    }

    /// The trailing seal bytes of `extra_data`, if present
    pub fn seal(&self) -> Option<&[u8]> {
        let len = self.extra_data.len();
        (len >= SIGNATURE_LENGTH).then(|| &self.extra_data[len - SIGNATURE_LENGTH..])
    }
}

/// Complete block with header and opaque transaction payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
    /// Encoded transactions, executed outside of consensus
    pub transactions: Vec<Bytes>,
}

impl Block {
    /// Create a new block
    pub fn new(header: BlockHeader, transactions: Vec<Bytes>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// Get the block hash (same as header hash)
    pub fn hash(&self) -> CoreResult<Hash> {
        self.header.hash()
    }

    /// Same body under a replacement header
    pub fn with_header(&self, header: BlockHeader) -> Self {
        Self {
            header,
            transactions: self.transactions.clone(),
        }
    }

    /// Block number
    pub fn number(&self) -> BlockNumber {
        self.header.number
    }
}

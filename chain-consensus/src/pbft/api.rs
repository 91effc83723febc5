//! Query and vote-management facade mounted under the `pbft` RPC namespace

use crate::pbft::extra::DIFF_IN_TURN;
use crate::pbft::sealer::Proposals;
use crate::pbft::{Snapshot, SnapshotStore};
use crate::traits::ChainReader;
use crate::{ConsensusError, ConsensusResult};
use chain_core::{Address, BlockHeader, BlockNumber, Hash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Blocks inspected by `block_status` when no window is given
pub const DEFAULT_STATUS_WINDOW: u64 = 64;

/// Sealing health over a recent window of blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStatus {
    /// Share of evaluated blocks sealed in turn, in percent
    pub inturn_percent: f64,
    /// Blocks sealed per current signer
    pub sealer_activity: BTreeMap<Address, u64>,
    /// Number of blocks evaluated
    pub num_blocks: u64,
}

/// RPC facade over one engine's snapshot store and proposal table
pub struct PbftApi {
    /// Header source for lookups and the status window
    chain: Arc<dyn ChainReader>,
    /// Snapshot store of the owning engine
    store: Arc<SnapshotStore>,
    /// Proposal table of the owning engine
    proposals: Arc<Proposals>,
}

impl PbftApi {
    pub fn new(chain: Arc<dyn ChainReader>, store: Arc<SnapshotStore>, proposals: Arc<Proposals>) -> Self {
        Self {
            chain,
            store,
            proposals,
        }
    }

    /// Header at `number`, or the head when absent
    fn header_at(&self, number: Option<BlockNumber>) -> ConsensusResult<BlockHeader> {
        match number {
            Some(number) => self.chain.get_header_by_number(number),
            None => self.chain.current_header(),
        }
        .ok_or(ConsensusError::UnknownBlock)
    }

    fn header_by_hash(&self, hash: &Hash) -> ConsensusResult<BlockHeader> {
        self.chain
            .get_header_by_hash(hash)
            .ok_or(ConsensusError::UnknownBlock)
    }

    fn snapshot_of(&self, header: &BlockHeader) -> ConsensusResult<Arc<Snapshot>> {
        self.store
            .get(self.chain.as_ref(), header.number, header.hash()?, &[])
    }

    /// Snapshot at block `number` (head when `None`)
    pub fn get_snapshot(&self, number: Option<BlockNumber>) -> ConsensusResult<Snapshot> {
        let header = self.header_at(number)?;
        Ok((*self.snapshot_of(&header)?).clone())
    }

    /// Snapshot at the block with `hash`
    pub fn get_snapshot_at_hash(&self, hash: Hash) -> ConsensusResult<Snapshot> {
        let header = self.header_by_hash(&hash)?;
        Ok((*self.snapshot_of(&header)?).clone())
    }

    /// Authorized signers at block `number` (head when `None`)
    pub fn get_validators(&self, number: Option<BlockNumber>) -> ConsensusResult<Vec<Address>> {
        let header = self.header_at(number)?;
        Ok(self.snapshot_of(&header)?.signers())
    }

    /// Authorized signers at the block with `hash`
    pub fn get_validators_at_hash(&self, hash: Hash) -> ConsensusResult<Vec<Address>> {
        let header = self.header_by_hash(&hash)?;
        Ok(self.snapshot_of(&header)?.signers())
    }

    /// Current local proposals
    pub fn votes(&self) -> BTreeMap<Address, bool> {
        self.proposals.list()
    }

    /// Propose authorizing or dropping `address` in blocks this node seals
    pub fn vote(&self, address: Address, authorize: bool) {
        self.proposals.insert(address, authorize);
    }

    /// Withdraw a local proposal
    pub fn drop_vote(&self, address: Address) {
        self.proposals.remove(&address);
    }

    /// In-turn ratio and per-signer counts over the `window` blocks before
    /// the head (default 64). Blocks are counted from 1, genesis is never
    /// evaluated.
    pub fn block_status(&self, window: Option<u64>) -> ConsensusResult<BlockStatus> {
        let window = window.unwrap_or(DEFAULT_STATUS_WINDOW);
        let head = self.header_at(None)?;
        let snap = self.snapshot_of(&head)?;

        let end = head.number;
        let (start, num_blocks) = if window >= end {
            (1, end.saturating_sub(1))
        } else {
            (end - window, window)
        };

        let mut sealer_activity: BTreeMap<Address, u64> =
            snap.signers.iter().map(|signer| (*signer, 0)).collect();
        let mut inturn = 0u64;

        for number in start..end {
            let header = self
                .chain
                .get_header_by_number(number)
                .ok_or(ConsensusError::ChainReadError { number })?;
            if header.difficulty == DIFF_IN_TURN {
                inturn += 1;
            }
            let signer = self.store.author(&header)?;
            *sealer_activity.entry(signer).or_default() += 1;
        }

        let inturn_percent = if num_blocks == 0 {
            0.0
        } else {
            inturn as f64 * 100.0 / num_blocks as f64
        };

        Ok(BlockStatus {
            inturn_percent,
            sealer_activity,
            num_blocks,
        })
    }
}

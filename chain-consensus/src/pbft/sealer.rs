//! Local block production: turn scheduling, vote selection and signing

use crate::pbft::extra::{HeaderVote, DIFF_IN_TURN, DIFF_NO_TURN};
use crate::pbft::Snapshot;
use crate::traits::SigningIdentity;
use crate::{ConsensusError, ConsensusResult};
use chain_core::{secret_to_address, sign_hash, Address, BlockNumber, Hash, Signature};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::Duration;

/// What the local signer should do about block `number`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealSchedule {
    /// Primary proposer: seal without extra delay
    InTurn,
    /// Eligible backup proposer, `rank` places it among the other backups
    OutOfTurn { rank: usize, delay: Duration },
    /// Signed block `last` too recently, must let others go first
    Wait { last: BlockNumber },
    /// Not in the signer set
    Unauthorized,
}

/// Difficulty a block by `signer` at `number` must carry
pub fn calc_difficulty(snap: &Snapshot, number: BlockNumber, signer: &Address) -> u64 {
    if snap.inturn(number, signer) {
        DIFF_IN_TURN
    } else {
        DIFF_NO_TURN
    }
}

/// Position of `signer` among the backup proposers for `number`: eligible
/// signers in rotation order, starting right after the in-turn one.
pub fn out_of_turn_rank(snap: &Snapshot, number: BlockNumber, signer: &Address) -> Option<usize> {
    let signers = snap.signers();
    let count = signers.len();
    if count == 0 {
        return None;
    }
    let start = (number % count as u64) as usize;

    (1..count)
        .map(|step| signers[(start + step) % count])
        .filter(|candidate| snap.recently_signed(number, candidate).is_none())
        .position(|candidate| candidate == *signer)
}

/// Decide whether and when `signer` may seal block `number` on top of `snap`
pub fn schedule(snap: &Snapshot, number: BlockNumber, signer: &Address, wiggle: Duration) -> SealSchedule {
    if !snap.is_signer(signer) {
        return SealSchedule::Unauthorized;
    }
    if let Some(last) = snap.recently_signed(number, signer) {
        return SealSchedule::Wait { last };
    }
    if snap.inturn(number, signer) {
        return SealSchedule::InTurn;
    }
    match out_of_turn_rank(snap, number, signer) {
        Some(rank) => SealSchedule::OutOfTurn {
            rank,
            delay: wiggle * (rank as u32 + 1),
        },
        None => SealSchedule::Unauthorized,
    }
}

/// Local, unconfirmed votes the operator wants this node to push through
#[derive(Debug, Default)]
pub struct Proposals {
    inner: RwLock<BTreeMap<Address, bool>>,
}

impl Proposals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current table
    pub fn list(&self) -> BTreeMap<Address, bool> {
        self.inner.read().clone()
    }

    /// Add or replace a proposal
    pub fn insert(&self, address: Address, authorize: bool) {
        self.inner.write().insert(address, authorize);
    }

    /// Drop a proposal
    pub fn remove(&self, address: &Address) {
        self.inner.write().remove(address);
    }

    /// Vote to embed in block `number`: among proposals that would still
    /// change membership, rotate by height.
    pub fn select(&self, snap: &Snapshot, number: BlockNumber) -> Option<HeaderVote> {
        let proposals = self.inner.read();
        let candidates: Vec<HeaderVote> = proposals
            .iter()
            .filter(|(address, authorize)| snap.valid_vote(address, **authorize))
            .map(|(address, authorize)| HeaderVote {
                target: *address,
                authorize: *authorize,
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[(number % candidates.len() as u64) as usize])
    }
}

/// Signing identity backed by one secp256k1 secret key
pub struct KeySigner {
    secret: [u8; 32],
    address: Address,
}

impl KeySigner {
    pub fn new(secret: [u8; 32]) -> ConsensusResult<Self> {
        let address = secret_to_address(&secret)?;
        Ok(Self { secret, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

impl std::fmt::Debug for KeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl SigningIdentity for KeySigner {
    fn sign(&self, address: Address, hash: Hash) -> ConsensusResult<Signature> {
        if address != self.address {
            return Err(ConsensusError::SignerUnavailable(address));
        }
        Ok(sign_hash(&self.secret, &hash)?)
    }
}

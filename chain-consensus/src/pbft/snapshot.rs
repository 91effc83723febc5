//! Signer set and vote state at a given block

use crate::pbft::extra::{self, HeaderVote};
use crate::{ConsensusError, ConsensusResult};
use chain_core::{Address, BlockHeader, BlockNumber, Hash};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// A single vote an authorized signer made to modify the list of signers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Authorized signer that cast this vote
    pub signer: Address,
    /// Block number the vote was cast in (expire old votes)
    pub block: BlockNumber,
    /// Account being voted on to change its authorization
    pub address: Address,
    /// Whether to authorize or deauthorize the voted account
    pub authorize: bool,
}

/// Running count of live votes for one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    /// Whether the vote is about authorizing or kicking someone
    pub authorize: bool,
    /// Number of votes until now wanting to pass the proposal
    pub votes: usize,
}

/// State of the authorization voting at a given point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Block number where the snapshot was created
    pub number: BlockNumber,
    /// Block hash where the snapshot was created
    pub hash: Hash,
    /// Set of authorized signers at this moment
    pub signers: BTreeSet<Address>,
    /// Last block each signer produced, for spam protection
    pub recents: BTreeMap<Address, BlockNumber>,
    /// List of votes cast in chronological order
    pub votes: Vec<Vote>,
    /// Current vote tally to avoid recalculating
    pub tally: BTreeMap<Address, Tally>,
}

impl Snapshot {
    /// Create a snapshot with a fresh signer set and no votes. Used for the
    /// genesis block and trusted checkpoints.
    pub fn new(number: BlockNumber, hash: Hash, signers: impl IntoIterator<Item = Address>) -> Self {
        Self {
            number,
            hash,
            signers: signers.into_iter().collect(),
            recents: BTreeMap::new(),
            votes: Vec::new(),
            tally: BTreeMap::new(),
        }
    }

    /// Authorized signers in canonical (ascending) order
    pub fn signers(&self) -> Vec<Address> {
        self.signers.iter().copied().collect()
    }

    pub fn is_signer(&self, address: &Address) -> bool {
        self.signers.contains(address)
    }

    /// Number of trailing blocks within which a signer may not sign again
    pub fn recent_limit(&self) -> u64 {
        (self.signers.len() / 2 + 1) as u64
    }

    /// The signer whose turn it is at `number`
    pub fn inturn_signer(&self, number: BlockNumber) -> Option<Address> {
        if self.signers.is_empty() {
            return None;
        }
        let offset = (number % self.signers.len() as u64) as usize;
        self.signers.iter().nth(offset).copied()
    }

    /// Whether `signer` is the primary proposer at `number`
    pub fn inturn(&self, number: BlockNumber, signer: &Address) -> bool {
        self.inturn_signer(number).as_ref() == Some(signer)
    }

    /// The block `signer` last produced, if that still bars it from
    /// producing block `number`
    pub fn recently_signed(&self, number: BlockNumber, signer: &Address) -> Option<BlockNumber> {
        let limit = self.recent_limit();
        self.recents
            .get(signer)
            .copied()
            .filter(|seen| seen + limit > number)
    }

    /// Whether a vote would change membership at all
    pub fn valid_vote(&self, address: &Address, authorize: bool) -> bool {
        self.signers.contains(address) != authorize
    }

    /// Add a new vote into the tally. Returns whether the vote was counted.
    pub fn cast(&mut self, signer: &Address, address: Address, authorize: bool) -> bool {
        if !self.signers.contains(signer) {
            return false;
        }
        if !self.valid_vote(&address, authorize) {
            return false;
        }
        match self.tally.get_mut(&address) {
            Some(tally) if tally.authorize != authorize => false,
            Some(tally) => {
                tally.votes += 1;
                true
            }
            None => {
                self.tally.insert(address, Tally { authorize, votes: 1 });
                true
            }
        }
    }

    /// Remove a previously cast vote from the tally
    fn uncast(&mut self, address: &Address, authorize: bool) -> bool {
        let Some(tally) = self.tally.get_mut(address) else {
            return false;
        };
        if tally.authorize != authorize {
            return false;
        }
        if tally.votes > 1 {
            tally.votes -= 1;
        } else {
            self.tally.remove(address);
        }
        true
    }

    /// Drop recent-signer entries that no longer fall inside the window
    fn trim_recents(&mut self, number: BlockNumber) {
        let limit = self.recent_limit();
        self.recents.retain(|_, seen| *seen + limit > number);
    }

    /// Create a new snapshot by replaying `headers` on top of this one.
    ///
    /// Authors come from `author_of`; the verifier layer recovers them from
    /// the seals. Votes and tallies are reset on every `epoch` boundary.
    pub fn apply<F>(&self, headers: &[BlockHeader], epoch: u64, mut author_of: F) -> ConsensusResult<Snapshot>
    where
        F: FnMut(&BlockHeader) -> ConsensusResult<Address>,
    {
        let mut snap = self.clone();

        for header in headers {
            let expected = snap.number + 1;
            if header.number != expected {
                return Err(ConsensusError::OutOfSequence {
                    expected,
                    actual: header.number,
                });
            }
            if header.parent_hash != snap.hash {
                return Err(ConsensusError::OutOfSequence {
                    expected,
                    actual: header.number,
                });
            }
            let number = header.number;
            let checkpoint = number % epoch == 0;

            if checkpoint {
                snap.votes.clear();
                snap.tally.clear();
            }

            snap.trim_recents(number);
            let signer = author_of(header)?;
            if !snap.signers.contains(&signer) {
                return Err(ConsensusError::UnauthorizedSigner(signer));
            }
            if let Some(last) = snap.recently_signed(number, &signer) {
                return Err(ConsensusError::RecentlySigned { signer, last });
            }
            snap.recents.insert(signer, number);

            if let Some(vote) = extra::decode_payload(&header.extra_data, checkpoint)?.vote() {
                snap.tally_vote(signer, number, vote)?;
            }

            snap.number = number;
            snap.hash = header.hash()?;
        }

        if let Some(last) = headers.last() {
            debug!(
                "Applied {} headers, snapshot now at #{} with {} signers",
                headers.len(),
                last.number,
                snap.signers.len()
            );
        }
        Ok(snap)
    }

    /// Count `vote` from `signer` and commit the membership change once it
    /// holds a strict majority.
    fn tally_vote(&mut self, signer: Address, number: BlockNumber, vote: HeaderVote) -> ConsensusResult<()> {
        let HeaderVote { target, authorize } = vote;

        // A signer keeps one live vote per target
        if let Some(pos) = self
            .votes
            .iter()
            .position(|v| v.signer == signer && v.address == target)
        {
            let old = self.votes.remove(pos);
            self.uncast(&old.address, old.authorize);
        }

        if self.cast(&signer, target, authorize) {
            self.votes.push(Vote {
                signer,
                block: number,
                address: target,
                authorize,
            });
        }

        // The stored tally decides the direction, not the vote in hand
        let Some(authorize) = self
            .tally
            .get(&target)
            .filter(|tally| tally.votes > self.signers.len() / 2)
            .map(|tally| tally.authorize)
        else {
            return Ok(());
        };

        if authorize {
            self.signers.insert(target);
        } else {
            if self.signers.len() == 1 {
                return Err(ConsensusError::InvalidVote(format!(
                    "removing {} would leave no signers",
                    target
                )));
            }
            self.signers.remove(&target);
            self.trim_recents(number);

            let (theirs, rest): (Vec<Vote>, Vec<Vote>) =
                self.votes.drain(..).partition(|v| v.signer == target);
            self.votes = rest;
            for v in theirs {
                self.uncast(&v.address, v.authorize);
            }
        }

        self.votes.retain(|v| v.address != target);
        self.tally.remove(&target);

        info!(
            "Signer {} {} at block #{}, {} signers now",
            target,
            if authorize { "authorized" } else { "removed" },
            number,
            self.signers.len()
        );
        Ok(())
    }
}

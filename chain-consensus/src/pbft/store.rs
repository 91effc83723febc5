//! Snapshot resolution: cache, persisted checkpoints and header replay

use crate::pbft::extra;
use crate::pbft::{PbftConfig, Snapshot};
use crate::traits::ChainReader;
use crate::{ConsensusError, ConsensusResult};
use chain_core::{recover_address, Address, BlockHeader, BlockNumber, Hash, Signature};
use chain_db::{ColumnFamily, JsonStore, SharedDatabase};
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

const SNAPSHOT_KEY_PREFIX: &[u8] = b"pbft-";

fn cache_capacity(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN)
}

/// Recovers block authors from seals, remembering recent results
pub struct SignerCache {
    /// Recovered author by header hash
    signatures: Mutex<LruCache<Hash, Address>>,
}

impl SignerCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            signatures: Mutex::new(LruCache::new(cache_capacity(capacity))),
        }
    }

    /// Address that signed `header`
    pub fn author(&self, header: &BlockHeader) -> ConsensusResult<Address> {
        let hash = header.hash()?;
        if let Some(signer) = self.signatures.lock().get(&hash) {
            return Ok(*signer);
        }

        let seal = header.seal().ok_or(ConsensusError::MissingSignature)?;
        let signature = Signature::from_bytes(seal)?;
        let signer = recover_address(&signature, &header.seal_hash()?)
            .map_err(|e| ConsensusError::InvalidSigner(e.to_string()))?;

        self.signatures.lock().put(hash, signer);
        Ok(signer)
    }
}

/// Resolves the snapshot at any block by replaying history
pub struct SnapshotStore {
    /// Epoch and checkpoint interval settings
    config: PbftConfig,
    /// Backing store for checkpointed snapshots
    db: SharedDatabase,
    /// Recently used snapshots by block hash
    recents: Mutex<LruCache<Hash, Arc<Snapshot>>>,
    /// Per-hash locks so concurrent requests for one block rebuild it once
    inflight: DashMap<Hash, Arc<Mutex<()>>>,
    /// Authors recovered from header seals
    signers: SignerCache,
}

impl SnapshotStore {
    pub fn new(config: PbftConfig, db: SharedDatabase) -> Self {
        Self {
            recents: Mutex::new(LruCache::new(cache_capacity(config.inmemory_snapshots))),
            inflight: DashMap::new(),
            signers: SignerCache::new(config.inmemory_signatures),
            config,
            db,
        }
    }

    pub fn config(&self) -> &PbftConfig {
        &self.config
    }

    /// Address that signed `header`
    pub fn author(&self, header: &BlockHeader) -> ConsensusResult<Address> {
        self.signers.author(header)
    }

    /// Snapshot at block `(number, hash)`.
    ///
    /// `parents` holds not-yet-imported ancestors, oldest first; they are
    /// consulted before the chain.
    pub fn get(
        &self,
        chain: &dyn ChainReader,
        number: BlockNumber,
        hash: Hash,
        parents: &[BlockHeader],
    ) -> ConsensusResult<Arc<Snapshot>> {
        if let Some(snap) = self.cached(&hash) {
            return Ok(snap);
        }

        // Collapse concurrent replays of the same block
        let slot = self
            .inflight
            .entry(hash)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = slot.lock();
            match self.cached(&hash) {
                Some(snap) => Ok(snap),
                None => self.replay(chain, number, hash, parents),
            }
        };
        self.inflight.remove(&hash);
        result
    }

    fn cached(&self, hash: &Hash) -> Option<Arc<Snapshot>> {
        self.recents.lock().get(hash).cloned()
    }

    fn replay(
        &self,
        chain: &dyn ChainReader,
        mut number: BlockNumber,
        mut hash: Hash,
        mut parents: &[BlockHeader],
    ) -> ConsensusResult<Arc<Snapshot>> {
        let mut headers: Vec<BlockHeader> = Vec::new();

        let base = loop {
            if let Some(snap) = self.cached(&hash) {
                break (*snap).clone();
            }
            if number % self.config.checkpoint_interval == 0 {
                if let Some(snap) = self.load(&hash)? {
                    trace!("Loaded voting snapshot from disk at #{} ({})", number, hash);
                    break snap;
                }
            }
            if number == 0
                || (self.config.is_checkpoint(number)
                    && chain.get_header_by_number(number - 1).is_none())
            {
                if let Some(snap) = self.trusted_checkpoint(chain, number, hash)? {
                    break snap;
                }
            }

            let header = match parents.split_last() {
                Some((last, rest)) => {
                    if last.number != number || last.hash()? != hash {
                        return Err(ConsensusError::UnknownBlock);
                    }
                    parents = rest;
                    last.clone()
                }
                None => chain.get_header(&hash, number).ok_or_else(|| {
                    warn!("Header #{} ({}) missing during snapshot replay", number, hash);
                    ConsensusError::ChainReadError { number }
                })?,
            };
            hash = header.parent_hash;
            headers.push(header);
            number -= 1;
        };

        headers.reverse();
        let snap = base.apply(&headers, self.config.epoch, |header| self.author(header))?;
        let snap = Arc::new(snap);
        self.recents.lock().put(snap.hash, snap.clone());

        if snap.number % self.config.checkpoint_interval == 0 && !headers.is_empty() {
            self.store(&snap)?;
            debug!("Stored voting snapshot to disk at #{} ({})", snap.number, snap.hash);
        }
        Ok(snap)
    }

    /// Snapshot built straight from a checkpoint header's signer list, used
    /// at genesis and where history before an epoch block is unavailable
    fn trusted_checkpoint(
        &self,
        chain: &dyn ChainReader,
        number: BlockNumber,
        hash: Hash,
    ) -> ConsensusResult<Option<Snapshot>> {
        let Some(checkpoint) = chain.get_header_by_number(number) else {
            if number == 0 {
                return Err(ConsensusError::ChainReadError { number });
            }
            return Ok(None);
        };
        if checkpoint.hash()? != hash {
            if number == 0 {
                return Err(ConsensusError::GenesisMismatch(format!(
                    "requested genesis {} but chain holds {}",
                    hash,
                    checkpoint.hash()?
                )));
            }
            return Ok(None);
        }

        let signers = extra::checkpoint_signers(&checkpoint).map_err(|e| {
            if number == 0 {
                ConsensusError::GenesisMismatch(e.to_string())
            } else {
                e
            }
        })?;

        let snap = Snapshot::new(number, hash, signers);
        self.store(&snap)?;
        info!(
            "Stored checkpoint snapshot to disk at #{} ({}) with {} signers",
            number,
            hash,
            snap.signers.len()
        );
        Ok(Some(snap))
    }

    fn key(hash: &Hash) -> Vec<u8> {
        [SNAPSHOT_KEY_PREFIX, hash.as_bytes().as_slice()].concat()
    }

    /// Read a persisted snapshot
    pub fn load(&self, hash: &Hash) -> ConsensusResult<Option<Snapshot>> {
        Ok(self.db.get_json(ColumnFamily::Snapshots, &Self::key(hash))?)
    }

    /// Persist a snapshot
    pub fn store(&self, snap: &Snapshot) -> ConsensusResult<()> {
        Ok(self
            .db
            .put_json(ColumnFamily::Snapshots, &Self::key(&snap.hash), snap)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestChain;
    use chain_db::MemoryDatabase;
    use std::thread;

    fn store_for(chain: &TestChain, db: SharedDatabase) -> SnapshotStore {
        SnapshotStore::new(chain.config.clone(), db)
    }

    #[test]
    fn test_genesis_snapshot() {
        let chain = TestChain::new(3, PbftConfig::new(1));
        let store = store_for(&chain, Arc::new(MemoryDatabase::new()));

        let genesis = chain.header(0);
        let snap = store.get(&chain, 0, genesis.hash().unwrap(), &[]).unwrap();
        assert_eq!(snap.signers(), chain.signer_addresses());
        assert_eq!(snap.number, 0);
    }

    #[test]
    fn test_replay_matches_builder_snapshot() {
        let mut chain = TestChain::new(3, PbftConfig::new(1));
        let newcomer = chain.outsider(0);
        chain.extend_with_vote(Some((newcomer, true)));
        chain.extend_with_vote(Some((newcomer, true)));
        chain.extend(5);

        let store = store_for(&chain, Arc::new(MemoryDatabase::new()));
        let head = chain.head();
        let snap = store.get(&chain, head.number, head.hash().unwrap(), &[]).unwrap();
        assert_eq!(*snap, chain.snapshot);
        assert!(snap.is_signer(&newcomer));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let config = PbftConfig::new(1).with_checkpoint_interval(4);
        let mut chain = TestChain::new(3, config);
        chain.extend(6);

        let db = Arc::new(MemoryDatabase::new());
        let store = store_for(&chain, db.clone());
        let four = chain.header(4);
        store.get(&chain, 4, four.hash().unwrap(), &[]).unwrap();
        let head = chain.head();
        store.get(&chain, head.number, head.hash().unwrap(), &[]).unwrap();

        // genesis and block 4 are persisted, the head is not
        assert_eq!(db.len(ColumnFamily::Snapshots), 2);
        let stored = store.load(&four.hash().unwrap()).unwrap().unwrap();
        assert_eq!(stored, chain.snapshot_at(4));

        // A fresh store resumes from the persisted checkpoint
        let fresh = store_for(&chain, db);
        let snap = fresh.get(&chain, head.number, head.hash().unwrap(), &[]).unwrap();
        assert_eq!(*snap, chain.snapshot);
    }

    #[test]
    fn test_missing_header_fails() {
        let mut chain = TestChain::new(3, PbftConfig::new(1));
        chain.extend(4);
        let head = chain.head();
        chain.forget(2);

        let store = store_for(&chain, Arc::new(MemoryDatabase::new()));
        let result = store.get(&chain, head.number, head.hash().unwrap(), &[]);
        assert_eq!(result.unwrap_err(), ConsensusError::ChainReadError { number: 2 });
    }

    #[test]
    fn test_invalid_genesis() {
        let chain = TestChain::with_genesis_extra(vec![0u8; 32 + 7 + 65]);
        let store = store_for(&chain, Arc::new(MemoryDatabase::new()));

        let genesis = chain.header(0);
        let result = store.get(&chain, 0, genesis.hash().unwrap(), &[]);
        assert!(matches!(result, Err(ConsensusError::GenesisMismatch(_))));
    }

    #[test]
    fn test_parents_are_used_before_chain() {
        let mut chain = TestChain::new(3, PbftConfig::new(1));
        chain.extend(3);
        let pending = chain.detach(2);

        let store = store_for(&chain, Arc::new(MemoryDatabase::new()));
        let tip = pending.last().unwrap();
        let snap = store.get(&chain, tip.number, tip.hash().unwrap(), &pending).unwrap();
        assert_eq!(snap.number, 3);

        let mut wrong = pending.clone();
        wrong[0].timestamp += 100;
        let store = store_for(&chain, Arc::new(MemoryDatabase::new()));
        let result = store.get(&chain, tip.number, tip.hash().unwrap(), &wrong);
        assert_eq!(result.unwrap_err(), ConsensusError::UnknownBlock);
    }

    #[test]
    fn test_concurrent_gets_converge() {
        let mut chain = TestChain::new(4, PbftConfig::new(1));
        chain.extend(40);
        let chain = Arc::new(chain);
        let store = Arc::new(store_for(&chain, Arc::new(MemoryDatabase::new())));
        let head = chain.head();
        let (number, hash) = (head.number, head.hash().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let chain = chain.clone();
                let store = store.clone();
                thread::spawn(move || store.get(chain.as_ref(), number, hash, &[]).unwrap())
            })
            .collect();

        let snaps: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for snap in &snaps {
            assert_eq!(**snap, chain.snapshot);
        }
    }

    #[test]
    fn test_author_recovery_is_cached() {
        let mut chain = TestChain::new(3, PbftConfig::new(1));
        chain.extend(1);
        let cache = SignerCache::new(8);
        let header = chain.head();

        let author = cache.author(&header).unwrap();
        assert_eq!(author, chain.author_of(1));
        assert_eq!(cache.author(&header).unwrap(), author);

        let mut unsealed = header.clone();
        unsealed.extra_data.truncate(10);
        assert_eq!(cache.author(&unsealed), Err(ConsensusError::MissingSignature));
    }
}

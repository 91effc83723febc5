//! Signed in-memory chains for engine tests

use crate::pbft::extra::{encode_extra, genesis_header, write_seal, HeaderPayload, HeaderVote};
use crate::pbft::sealer::{calc_difficulty, KeySigner};
use crate::pbft::{PbftConfig, Snapshot};
use crate::traits::ChainReader;
use chain_core::{sign_hash, Address, BlockHeader, BlockNumber, Hash};
use std::collections::{BTreeMap, HashMap};
use tracing_subscriber::EnvFilter;

/// Keys beyond the signer set, usable as vote targets or rogue authors
const OUTSIDERS: usize = 4;

/// Genesis time far enough in the past that built blocks are never "future"
pub(crate) const GENESIS_TIME: u64 = 1_600_000_000;

/// Route engine logs to the test harness, filtered by `RUST_LOG`
pub(crate) fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Canonical chain produced by a fixed set of secp256k1 keys. Every block is
/// authored by the in-turn signer when allowed, otherwise by the first
/// signer outside the recent window.
pub(crate) struct TestChain {
    pub config: PbftConfig,
    /// Snapshot at the current head
    pub snapshot: Snapshot,
    keys: Vec<[u8; 32]>,
    addresses: Vec<Address>,
    signers: usize,
    canonical: BTreeMap<BlockNumber, BlockHeader>,
    by_hash: HashMap<Hash, BlockHeader>,
    snapshots: Vec<Snapshot>,
    authors: HashMap<BlockNumber, Address>,
}

impl TestChain {
    pub fn new(signers: usize, config: PbftConfig) -> Self {
        init_logging();
        let keys: Vec<[u8; 32]> = (0..signers + OUTSIDERS).map(|i| [i as u8 + 1; 32]).collect();
        let addresses: Vec<Address> = keys
            .iter()
            .map(|key| chain_core::secret_to_address(key).unwrap())
            .collect();
        let genesis = genesis_header(&addresses[..signers], GENESIS_TIME);
        Self::from_genesis(config, keys, addresses, signers, genesis)
    }

    /// Three-signer chain whose genesis carries `extra` verbatim
    pub fn with_genesis_extra(extra: Vec<u8>) -> Self {
        let template = Self::new(3, PbftConfig::new(1));
        let mut genesis = template.header(0);
        genesis.extra_data = extra;
        Self::from_genesis(
            template.config,
            template.keys,
            template.addresses,
            template.signers,
            genesis,
        )
    }

    fn from_genesis(
        config: PbftConfig,
        keys: Vec<[u8; 32]>,
        addresses: Vec<Address>,
        signers: usize,
        genesis: BlockHeader,
    ) -> Self {
        let snapshot = Snapshot::new(0, genesis.hash().unwrap(), addresses[..signers].iter().copied());
        let mut chain = Self {
            config,
            snapshot: snapshot.clone(),
            keys,
            addresses,
            signers,
            canonical: BTreeMap::new(),
            by_hash: HashMap::new(),
            snapshots: vec![snapshot],
            authors: HashMap::new(),
        };
        chain.insert(genesis);
        chain
    }

    pub fn header(&self, number: BlockNumber) -> BlockHeader {
        self.canonical[&number].clone()
    }

    pub fn head(&self) -> BlockHeader {
        self.canonical.values().next_back().cloned().unwrap()
    }

    /// Initial signer set, sorted
    pub fn signer_addresses(&self) -> Vec<Address> {
        let mut signers = self.addresses[..self.signers].to_vec();
        signers.sort();
        signers
    }

    pub fn outsider(&self, index: usize) -> Address {
        self.addresses[self.signers + index]
    }

    pub fn snapshot_at(&self, number: BlockNumber) -> Snapshot {
        self.snapshots[number as usize].clone()
    }

    pub fn author_of(&self, number: BlockNumber) -> Address {
        self.authors[&number]
    }

    pub fn key_of(&self, address: &Address) -> [u8; 32] {
        let index = self.addresses.iter().position(|a| a == address).unwrap();
        self.keys[index]
    }

    pub fn key_signer(&self, address: &Address) -> KeySigner {
        KeySigner::new(self.key_of(address)).unwrap()
    }

    /// Unsealed child of the head carrying `vote`, with the period already
    /// applied to the timestamp. Checkpoint heights get the signer list.
    pub fn child(&self, vote: Option<HeaderVote>) -> BlockHeader {
        let parent = self.head();
        let mut header = BlockHeader::child_of(&parent).unwrap();
        header.timestamp = parent.timestamp + self.config.period;
        let payload = if self.config.is_checkpoint(header.number) {
            HeaderPayload::Checkpoint(self.snapshot.signers())
        } else {
            vote.map(HeaderPayload::Vote).unwrap_or(HeaderPayload::Empty)
        };
        header.extra_data = encode_extra(b"test", &payload);
        header
    }

    /// Seal `header` with the key of `signer`
    pub fn sign(&self, header: &mut BlockHeader, signer: &Address) {
        let signature = sign_hash(&self.key_of(signer), &header.seal_hash().unwrap()).unwrap();
        write_seal(header, &signature).unwrap();
    }

    /// Author the next block would get
    pub fn next_author(&self) -> Address {
        let number = self.head().number + 1;
        let snap = &self.snapshot;
        snap.inturn_signer(number)
            .filter(|signer| snap.recently_signed(number, signer).is_none())
            .or_else(|| {
                snap.signers()
                    .into_iter()
                    .find(|signer| snap.recently_signed(number, signer).is_none())
            })
            .unwrap()
    }

    /// Append a valid signed block, optionally voting on `(target, authorize)`
    pub fn extend_with_vote(&mut self, vote: Option<(Address, bool)>) -> BlockHeader {
        let author = self.next_author();
        self.extend_by(author, vote)
    }

    /// Append a block sealed by `author`, which must be allowed to sign it
    pub fn extend_by(&mut self, author: Address, vote: Option<(Address, bool)>) -> BlockHeader {
        let vote = vote.map(|(target, authorize)| HeaderVote { target, authorize });
        let mut header = self.child(vote);
        header.difficulty = calc_difficulty(&self.snapshot, header.number, &author);
        self.sign(&mut header, &author);

        self.snapshot = self
            .snapshot
            .apply(std::slice::from_ref(&header), self.config.epoch, |_| Ok(author))
            .unwrap();
        self.snapshots.push(self.snapshot.clone());
        self.authors.insert(header.number, author);
        self.insert(header.clone());
        header
    }

    /// Append `count` vote-less blocks
    pub fn extend(&mut self, count: usize) {
        for _ in 0..count {
            self.extend_with_vote(None);
        }
    }

    /// Make `header` visible through the chain reader
    pub fn insert(&mut self, header: BlockHeader) {
        self.by_hash.insert(header.hash().unwrap(), header.clone());
        self.canonical.insert(header.number, header);
    }

    /// Lose the block at `number` from storage
    pub fn forget(&mut self, number: BlockNumber) {
        if let Some(header) = self.canonical.remove(&number) {
            self.by_hash.remove(&header.hash().unwrap());
        }
    }

    /// Take the last `count` blocks off the chain, oldest first, rewinding the
    /// head snapshot to match
    pub fn detach(&mut self, count: usize) -> Vec<BlockHeader> {
        let mut detached = Vec::with_capacity(count);
        for _ in 0..count {
            let head = self.head();
            self.forget(head.number);
            detached.push(head);
        }
        detached.reverse();
        self.snapshots.truncate(self.snapshots.len() - count);
        self.snapshot = self.snapshots.last().cloned().unwrap();
        detached
    }
}

impl ChainReader for TestChain {
    fn current_header(&self) -> Option<BlockHeader> {
        self.canonical.values().next_back().cloned()
    }

    fn get_header_by_number(&self, number: BlockNumber) -> Option<BlockHeader> {
        self.canonical.get(&number).cloned()
    }

    fn get_header_by_hash(&self, hash: &Hash) -> Option<BlockHeader> {
        self.by_hash.get(hash).cloned()
    }
}

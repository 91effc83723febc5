//! Vote-based authority engine: header verification, block preparation and sealing

use crate::pbft::extra::{self, HeaderPayload, HeaderVote, DIFF_IN_TURN, DIFF_NO_TURN, EXTRA_VANITY};
use crate::pbft::sealer::{self, Proposals, SealSchedule};
use crate::pbft::{PbftApi, PbftConfig, Snapshot, SnapshotStore};
use crate::traits::{Api, ChainReader, Engine, SigningIdentity};
use crate::{ConsensusError, ConsensusResult};
use chain_core::{Address, Block, BlockHeader, BlockNumber, Hash};
use chain_db::SharedDatabase;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Current wall-clock time in seconds
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Locally installed sealing identity
#[derive(Clone)]
struct LocalSigner {
    /// Address the engine seals as
    address: Address,
    /// Produces signatures for `address`
    identity: Arc<dyn SigningIdentity>,
}

/// Vote-based proof-of-authority engine
pub struct Pbft {
    /// Validated engine settings
    config: PbftConfig,
    /// Snapshot cache and checkpoints, shared with the API
    store: Arc<SnapshotStore>,
    /// Local membership proposals, shared with the API
    proposals: Arc<Proposals>,
    /// Identity installed by `authorize`, if any
    signer: RwLock<Option<LocalSigner>>,
}

impl Pbft {
    /// Create an engine persisting checkpoints into `db`
    pub fn new(config: PbftConfig, db: SharedDatabase) -> ConsensusResult<Self> {
        config.validate()?;
        info!(
            "Starting PBFT engine: period {}s, epoch {}, checkpoint every {} blocks",
            config.period, config.epoch, config.checkpoint_interval
        );

        Ok(Self {
            store: Arc::new(SnapshotStore::new(config.clone(), db)),
            proposals: Arc::new(Proposals::new()),
            signer: RwLock::new(None),
            config,
        })
    }

    pub fn config(&self) -> &PbftConfig {
        &self.config
    }

    /// Local proposal table
    pub fn proposals(&self) -> &Arc<Proposals> {
        &self.proposals
    }

    /// Snapshot at block `(number, hash)`
    pub fn snapshot(
        &self,
        chain: &dyn ChainReader,
        number: BlockNumber,
        hash: Hash,
        parents: &[BlockHeader],
    ) -> ConsensusResult<Arc<Snapshot>> {
        self.store.get(chain, number, hash, parents)
    }

    /// Address of the locally installed signer, if any
    pub fn local_signer(&self) -> Option<Address> {
        self.signer.read().as_ref().map(|local| local.address)
    }

    /// Check `header`, taking not-yet-imported ancestors from `parents`
    /// (oldest first) before consulting the chain.
    pub fn verify_with_parents(
        &self,
        chain: &dyn ChainReader,
        header: &BlockHeader,
        parents: &[BlockHeader],
    ) -> ConsensusResult<()> {
        let number = header.number;

        let now = unix_now();
        if header.timestamp > now.saturating_add(self.config.allowed_future_secs) {
            return Err(ConsensusError::FutureBlock {
                timestamp: header.timestamp,
                now,
            });
        }

        let checkpoint = self.config.is_checkpoint(number);
        let payload = extra::decode_payload(&header.extra_data, checkpoint)?;

        // Genesis only needs a well-formed signer list
        if number == 0 {
            return Ok(());
        }

        if header.difficulty != DIFF_IN_TURN && header.difficulty != DIFF_NO_TURN {
            return Err(ConsensusError::InvalidDifficulty {
                expected: DIFF_NO_TURN,
                actual: header.difficulty,
            });
        }

        self.verify_cascading(chain, header, parents, &payload)
    }

    /// Checks that depend on the ancestry of `header`
    fn verify_cascading(
        &self,
        chain: &dyn ChainReader,
        header: &BlockHeader,
        parents: &[BlockHeader],
        payload: &HeaderPayload,
    ) -> ConsensusResult<()> {
        let number = header.number;

        let parent = match parents.last() {
            Some(parent) => parent.clone(),
            None => chain
                .get_header(&header.parent_hash, number - 1)
                .ok_or(ConsensusError::UnknownBlock)?,
        };
        if parent.number != number - 1 || parent.hash()? != header.parent_hash {
            return Err(ConsensusError::UnknownBlock);
        }

        // A parent stamped near u64::MAX leaves no valid child time
        let expected = parent.timestamp.checked_add(self.config.period).ok_or(
            ConsensusError::InvalidTimestamp {
                expected: u64::MAX,
                actual: header.timestamp,
            },
        )?;
        if header.timestamp < expected {
            return Err(ConsensusError::InvalidTimestamp {
                expected,
                actual: header.timestamp,
            });
        }

        let snap = self.store.get(chain, number - 1, header.parent_hash, parents)?;

        if let HeaderPayload::Checkpoint(signers) = payload {
            if *signers != snap.signers() {
                return Err(ConsensusError::CheckpointSignersMismatch);
            }
        }

        self.verify_seal(&snap, header, payload.vote())
    }

    /// Checks that depend on who sealed `header`
    fn verify_seal(&self, snap: &Snapshot, header: &BlockHeader, vote: Option<HeaderVote>) -> ConsensusResult<()> {
        let number = header.number;
        let signer = self.store.author(header)?;

        if !snap.is_signer(&signer) {
            return Err(ConsensusError::UnauthorizedSigner(signer));
        }
        if let Some(last) = snap.recently_signed(number, &signer) {
            return Err(ConsensusError::RecentlySigned { signer, last });
        }

        let expected = sealer::calc_difficulty(snap, number, &signer);
        if header.difficulty != expected {
            return Err(ConsensusError::InvalidDifficulty {
                expected,
                actual: header.difficulty,
            });
        }

        if let Some(vote) = vote {
            if !vote.authorize && snap.signers.len() == 1 && snap.is_signer(&vote.target) {
                return Err(ConsensusError::InvalidVote(format!(
                    "dropping {} would leave no signers",
                    vote.target
                )));
            }
        }
        Ok(())
    }

    /// Verify `headers` on a blocking task, streaming one result per header
    /// in order. Stops early once `stop` is cancelled or the receiver is gone.
    pub fn verify_headers_async(
        self: &Arc<Self>,
        chain: Arc<dyn ChainReader>,
        headers: Vec<BlockHeader>,
        stop: CancellationToken,
    ) -> mpsc::Receiver<ConsensusResult<()>> {
        let (tx, rx) = mpsc::channel(headers.len().max(1));
        let engine = Arc::clone(self);

        tokio::task::spawn_blocking(move || {
            for (i, header) in headers.iter().enumerate() {
                if stop.is_cancelled() {
                    debug!("Header verification cancelled after {} of {}", i, headers.len());
                    break;
                }
                let result = engine.verify_with_parents(chain.as_ref(), header, &headers[..i]);
                if tx.blocking_send(result).is_err() {
                    break;
                }
            }
        });
        rx
    }

    fn prepare_header(&self, chain: &dyn ChainReader, header: &mut BlockHeader) -> ConsensusResult<()> {
        let number = header.number;
        if number == 0 {
            return Err(ConsensusError::UnknownBlock);
        }
        let parent = chain
            .get_header(&header.parent_hash, number - 1)
            .ok_or(ConsensusError::UnknownBlock)?;
        let snap = self.store.get(chain, number - 1, header.parent_hash, &[])?;

        let payload = if self.config.is_checkpoint(number) {
            HeaderPayload::Checkpoint(snap.signers())
        } else {
            match self.proposals.select(&snap, number) {
                Some(vote) => {
                    debug!(
                        "Embedding vote to {} {} in block #{}",
                        if vote.authorize { "authorize" } else { "drop" },
                        vote.target,
                        number
                    );
                    HeaderPayload::Vote(vote)
                }
                None => HeaderPayload::Empty,
            }
        };
        let vanity_len = header.extra_data.len().min(EXTRA_VANITY);
        header.extra_data = extra::encode_extra(&header.extra_data[..vanity_len], &payload);
        header.nonce = 0;

        header.difficulty = match self.local_signer() {
            Some(signer) => sealer::calc_difficulty(&snap, number, &signer),
            None => DIFF_NO_TURN,
        };
        header.timestamp = parent
            .timestamp
            .saturating_add(self.config.period)
            .max(unix_now());
        Ok(())
    }

    /// Sign `block` once its slot arrives. Returns `None` when this node may
    /// not seal it right now or the attempt was overtaken.
    pub async fn seal_block(
        &self,
        chain: Arc<dyn ChainReader>,
        block: Block,
        stop: CancellationToken,
    ) -> ConsensusResult<Option<Block>> {
        let mut header = block.header.clone();
        let number = header.number;
        if number == 0 {
            return Err(ConsensusError::UnknownBlock);
        }

        // Empty blocks are pointless on a zero period chain
        if self.config.period == 0 && block.transactions.is_empty() {
            info!("Sealing paused, waiting for transactions");
            return Ok(None);
        }

        let local = self
            .signer
            .read()
            .clone()
            .ok_or(ConsensusError::SignerUnavailable(Address::zero()))?;

        let snap = self.store.get(chain.as_ref(), number - 1, header.parent_hash, &[])?;
        let wiggle = match sealer::schedule(&snap, number, &local.address, self.config.wiggle_time()) {
            SealSchedule::Unauthorized => {
                return Err(ConsensusError::UnauthorizedSigner(local.address));
            }
            SealSchedule::Wait { last } => {
                info!("Signed recently at #{}, must wait for others", last);
                return Ok(None);
            }
            SealSchedule::InTurn => Duration::ZERO,
            SealSchedule::OutOfTurn { rank, delay } => {
                trace!("Out-of-turn signing requested, rank {} wiggle {:?}", rank, delay);
                delay
            }
        };

        let signature = local.identity.sign(local.address, header.seal_hash()?)?;
        extra::write_seal(&mut header, &signature)?;

        let delay = Duration::from_secs(header.timestamp.saturating_sub(unix_now())) + wiggle;
        debug!("Waiting {:?} to seal block #{}", delay, number);

        tokio::select! {
            _ = stop.cancelled() => {
                debug!("Sealing of block #{} cancelled", number);
                return Ok(None);
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if stop.is_cancelled() {
            return Ok(None);
        }
        if let Some(head) = chain.current_header() {
            if head.number >= number {
                warn!("Discarding sealed block #{}, chain head already at #{}", number, head.number);
                return Ok(None);
            }
        }

        info!("Sealed block #{} ({} transactions)", number, block.transactions.len());
        Ok(Some(block.with_header(header)))
    }
}

impl Engine for Pbft {
    fn author(&self, header: &BlockHeader) -> ConsensusResult<Address> {
        self.store.author(header)
    }

    fn verify_header(&self, chain: &dyn ChainReader, header: &BlockHeader) -> ConsensusResult<()> {
        self.verify_with_parents(chain, header, &[])
    }

    fn verify_headers(&self, chain: &dyn ChainReader, headers: &[BlockHeader]) -> Vec<ConsensusResult<()>> {
        headers
            .iter()
            .enumerate()
            .map(|(i, header)| self.verify_with_parents(chain, header, &headers[..i]))
            .collect()
    }

    fn prepare(&self, chain: &dyn ChainReader, header: &mut BlockHeader) -> ConsensusResult<()> {
        self.prepare_header(chain, header)
    }

    fn seal<'a>(
        &'a self,
        chain: Arc<dyn ChainReader>,
        block: Block,
        stop: CancellationToken,
    ) -> BoxFuture<'a, ConsensusResult<Option<Block>>> {
        Box::pin(self.seal_block(chain, block, stop))
    }

    fn authorize(&self, signer: Address, identity: Arc<dyn SigningIdentity>) {
        info!("Authorized local signer {}", signer);
        *self.signer.write() = Some(LocalSigner {
            address: signer,
            identity,
        });
    }

    fn apis(&self, chain: Arc<dyn ChainReader>) -> Vec<Api> {
        vec![Api::Pbft(PbftApi::new(
            chain,
            self.store.clone(),
            self.proposals.clone(),
        ))]
    }
}

//! Consensus engine traits and the collaborators it consumes

use crate::pbft::PbftApi;
use crate::ConsensusResult;
use chain_core::{Address, Block, BlockHeader, BlockNumber, Hash, Signature};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Read-only view of the local chain, provided by the host node
pub trait ChainReader: Send + Sync {
    /// Header of the current canonical head
    fn current_header(&self) -> Option<BlockHeader>;

    /// Canonical header at `number`
    fn get_header_by_number(&self, number: BlockNumber) -> Option<BlockHeader>;

    /// Header with the given hash, canonical or not
    fn get_header_by_hash(&self, hash: &Hash) -> Option<BlockHeader>;

    /// Header with the given hash, if it also sits at `number`
    fn get_header(&self, hash: &Hash, number: BlockNumber) -> Option<BlockHeader> {
        self.get_header_by_hash(hash)
            .filter(|header| header.number == number)
    }
}

/// Signing capability for locally held sealer keys
pub trait SigningIdentity: Send + Sync {
    /// Sign `hash` on behalf of `address`
    fn sign(&self, address: Address, hash: Hash) -> ConsensusResult<Signature>;
}

/// RPC facades an engine exposes to the host
pub enum Api {
    /// Snapshot queries and vote management under the `pbft` namespace
    Pbft(PbftApi),
}

impl Api {
    /// RPC namespace the facade is mounted under
    pub fn namespace(&self) -> &'static str {
        match self {
            Api::Pbft(_) => "pbft",
        }
    }
}

/// Consensus engine capability interface
pub trait Engine: Send + Sync {
    /// Address that produced `header`, recovered from its seal
    fn author(&self, header: &BlockHeader) -> ConsensusResult<Address>;

    /// Check a header against the consensus rules
    fn verify_header(&self, chain: &dyn ChainReader, header: &BlockHeader) -> ConsensusResult<()>;

    /// Check a contiguous batch, earlier headers acting as parents of later ones
    fn verify_headers(
        &self,
        chain: &dyn ChainReader,
        headers: &[BlockHeader],
    ) -> Vec<ConsensusResult<()>>;

    /// Fill in the consensus fields of a header about to be sealed
    fn prepare(&self, chain: &dyn ChainReader, header: &mut BlockHeader) -> ConsensusResult<()>;

    /// Sign the block once its slot arrives; `None` when the attempt was abandoned
    fn seal<'a>(
        &'a self,
        chain: Arc<dyn ChainReader>,
        block: Block,
        stop: CancellationToken,
    ) -> BoxFuture<'a, ConsensusResult<Option<Block>>>;

    /// Install the local sealing identity
    fn authorize(&self, signer: Address, identity: Arc<dyn SigningIdentity>);

    /// RPC facades over this engine
    fn apis(&self, chain: Arc<dyn ChainReader>) -> Vec<Api>;
}

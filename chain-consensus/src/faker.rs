//! Engine that accepts everything, for tests and tooling

use crate::traits::{Api, ChainReader, Engine, SigningIdentity};
use crate::ConsensusResult;
use chain_core::{Address, Block, BlockHeader};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Accepts every header and seals blocks unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct Faker;

impl Engine for Faker {
    fn author(&self, _header: &BlockHeader) -> ConsensusResult<Address> {
        Ok(Address::zero())
    }

    fn verify_header(&self, _chain: &dyn ChainReader, _header: &BlockHeader) -> ConsensusResult<()> {
        Ok(())
    }

    fn verify_headers(&self, _chain: &dyn ChainReader, headers: &[BlockHeader]) -> Vec<ConsensusResult<()>> {
        vec![Ok(()); headers.len()]
    }

    fn prepare(&self, _chain: &dyn ChainReader, _header: &mut BlockHeader) -> ConsensusResult<()> {
        Ok(())
    }

    fn seal<'a>(
        &'a self,
        _chain: Arc<dyn ChainReader>,
        block: Block,
        stop: CancellationToken,
    ) -> BoxFuture<'a, ConsensusResult<Option<Block>>> {
        Box::pin(async move {
            if stop.is_cancelled() {
                return Ok(None);
            }
            Ok(Some(block))
        })
    }

    fn authorize(&self, _signer: Address, _identity: Arc<dyn SigningIdentity>) {}

    fn apis(&self, _chain: Arc<dyn ChainReader>) -> Vec<Api> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestChain;
    use crate::pbft::PbftConfig;

    #[tokio::test]
    async fn test_faker_accepts_anything() {
        let mut chain = TestChain::new(2, PbftConfig::new(1));
        chain.extend(2);
        let mut header = chain.head();
        header.extra_data.clear();

        let faker = Faker;
        assert!(faker.verify_header(&chain, &header).is_ok());
        assert_eq!(faker.verify_headers(&chain, &[header.clone(), header.clone()]).len(), 2);
        assert!(faker.apis(Arc::new(TestChain::new(1, PbftConfig::new(1)))).is_empty());

        let block = Block::new(header, Vec::new());
        let sealed = faker
            .seal(Arc::new(chain), block.clone(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sealed, Some(block));
    }
}

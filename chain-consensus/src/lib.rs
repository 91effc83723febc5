//! Blockchain consensus engine
//!
//! This crate provides the consensus engines a node can run: a vote-based
//! proof-of-authority engine ([`pbft`]) and a permissive [`faker`] for tests.
//! The engine is chosen once from [`EngineConfig`] and driven through the
//! [`Engine`] trait.

pub mod error;
pub mod faker;
pub mod pbft;
pub mod traits;

#[cfg(test)]
mod test_utils;

pub use error::{ConsensusError, ConsensusResult};
pub use faker::Faker;
pub use pbft::{EngineConfig, Pbft, PbftApi, PbftConfig};
pub use traits::{Api, ChainReader, Engine, SigningIdentity};

use chain_db::SharedDatabase;
use std::sync::Arc;
use tracing::info;

/// Build the engine selected by `config`
pub fn new_engine(config: &EngineConfig, db: SharedDatabase) -> ConsensusResult<Arc<dyn Engine>> {
    match config {
        EngineConfig::Pbft(config) => Ok(Arc::new(Pbft::new(config.clone(), db)?)),
        EngineConfig::Faker => {
            info!("Using fake consensus engine");
            Ok(Arc::new(Faker))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_db::MemoryDatabase;

    #[test]
    fn test_engine_selection() {
        let db: SharedDatabase = Arc::new(MemoryDatabase::new());

        let faker = new_engine(&EngineConfig::Faker, db.clone()).unwrap();
        assert!(faker.apis(Arc::new(test_utils::TestChain::new(1, PbftConfig::new(1)))).is_empty());

        let chain = Arc::new(test_utils::TestChain::new(2, PbftConfig::new(1)));
        let pbft = new_engine(&EngineConfig::Pbft(PbftConfig::new(1)), db.clone()).unwrap();
        let apis = pbft.apis(chain);
        assert_eq!(apis.len(), 1);
        assert_eq!(apis[0].namespace(), "pbft");

        let invalid = EngineConfig::Pbft(PbftConfig::new(1).with_epoch(0));
        assert!(matches!(new_engine(&invalid, db), Err(ConsensusError::Config(_))));
    }
}

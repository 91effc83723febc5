//! Consensus database layer
//!
//! This crate provides the narrow persistent storage the consensus engine
//! needs: periodically checkpointed snapshots keyed by block hash.

pub mod column_families;
pub mod error;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod traits;

pub use column_families::ColumnFamily;
pub use error::{DbError, DbResult};
pub use memory::MemoryDatabase;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksDatabase;
pub use traits::{JsonStore, KeyValueDB, SharedDatabase};

//! Vote-based proof-of-authority consensus
//!
//! A fixed rotation of authorized signers seals blocks in turn. Signers are
//! added or removed by majority votes carried in block headers, and the
//! resulting membership is tracked in [`Snapshot`]s.

pub mod api;
pub mod config;
pub mod engine;
pub mod extra;
pub mod sealer;
pub mod snapshot;
pub mod store;

pub use api::{BlockStatus, PbftApi};
pub use config::{EngineConfig, PbftConfig};
pub use engine::Pbft;
pub use sealer::{KeySigner, Proposals, SealSchedule};
pub use snapshot::{Snapshot, Tally, Vote};
pub use store::SnapshotStore;

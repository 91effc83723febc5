//! PBFT engine configuration

use crate::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default number of blocks after which votes are reset and the signer list
/// is re-published in the header
pub const EPOCH_LENGTH: u64 = 30_000;

/// Default number of blocks between persisted snapshots
pub const CHECKPOINT_INTERVAL: u64 = 1024;

/// Default number of recent snapshots kept in memory
pub const INMEMORY_SNAPSHOTS: usize = 128;

/// Default number of recovered block signers kept in memory
pub const INMEMORY_SIGNATURES: usize = 4096;

/// PBFT consensus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PbftConfig {
    /// Minimum seconds between consecutive blocks
    pub period: u64,
    /// Blocks between vote resets / signer checkpoints
    pub epoch: u64,
    /// Blocks between snapshots written to disk
    pub checkpoint_interval: u64,
    /// Snapshot cache capacity
    pub inmemory_snapshots: usize,
    /// Recovered signer cache capacity
    pub inmemory_signatures: usize,
    /// Delay unit applied per rank to out-of-turn sealers, in milliseconds
    pub wiggle_time_ms: u64,
    /// How far ahead of local time a header timestamp may be, in seconds
    pub allowed_future_secs: u64,
}

impl Default for PbftConfig {
    fn default() -> Self {
        Self {
            period: 15,
            epoch: EPOCH_LENGTH,
            checkpoint_interval: CHECKPOINT_INTERVAL,
            inmemory_snapshots: INMEMORY_SNAPSHOTS,
            inmemory_signatures: INMEMORY_SIGNATURES,
            wiggle_time_ms: 500,
            allowed_future_secs: 15,
        }
    }
}

impl PbftConfig {
    /// Create a new configuration with the given block period
    pub fn new(period: u64) -> Self {
        Self {
            period,
            ..Self::default()
        }
    }

    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConsensusResult<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConsensusError::Config(format!("Failed to read config file: {}", e)))?;

        let config: PbftConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConsensusResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .map_err(|e| ConsensusError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.epoch == 0 {
            return Err(ConsensusError::Config(
                "Epoch length must be greater than 0".to_string(),
            ));
        }

        if self.checkpoint_interval == 0 {
            return Err(ConsensusError::Config(
                "Checkpoint interval must be greater than 0".to_string(),
            ));
        }

        if self.inmemory_snapshots == 0 || self.inmemory_signatures == 0 {
            return Err(ConsensusError::Config(
                "Cache capacities must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Out-of-turn delay unit as Duration
    pub fn wiggle_time(&self) -> Duration {
        Duration::from_millis(self.wiggle_time_ms)
    }

    /// Whether `number` is an epoch checkpoint block
    pub fn is_checkpoint(&self, number: u64) -> bool {
        number % self.epoch == 0
    }

    /// Set epoch length
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    /// Set checkpoint interval
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Set out-of-turn delay unit
    pub fn with_wiggle_time(mut self, wiggle: Duration) -> Self {
        self.wiggle_time_ms = wiggle.as_millis() as u64;
        self
    }
}

/// Engine selected once at node start-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum EngineConfig {
    /// Vote-based authority rotation
    Pbft(PbftConfig),
    /// Accept-everything engine for tests and tooling
    Faker,
}

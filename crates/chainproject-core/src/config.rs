//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

/// Settings for the dispatcher and its partition workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Identifier used in logs.
    #[serde(default = "default_id")]
    pub id: String,
    /// Bounded queue size of each partition worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Save a partition checkpoint every N applied events.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
    /// Drop events at or before a partition's checkpoint.
    #[serde(default = "bool_true")]
    pub skip_replayed: bool,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_id() -> String { "chainproject".into() }
fn default_queue_capacity() -> usize { 1_024 }
fn default_checkpoint_interval() -> u64 { 100 }
fn bool_true() -> bool { true }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            queue_capacity: default_queue_capacity(),
            checkpoint_interval: default_checkpoint_interval(),
            skip_replayed: true,
            retry: RetryConfig::default(),
        }
    }
}

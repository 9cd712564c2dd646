//! Partition checkpoints: the last applied position of each partition.
//!
//! On restart the dispatcher loads each partition's checkpoint and drops
//! redelivered events at or before it. Checkpoints are saved every
//! `checkpoint_interval` events, so a crash can still replay the tail since
//! the last save; handlers are idempotent, which makes that replay harmless.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::ProjectionError;
use crate::event::{PartitionKey, Position};

/// A persisted partition position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Engine identifier (`EngineConfig::id`).
    pub engine_id: String,
    pub chain_id: u64,
    /// Lowercased contract address.
    pub contract: String,
    pub block_number: u64,
    pub log_index: u32,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

impl Checkpoint {
    pub fn position(&self) -> Position {
        Position {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }
}

/// Storage for checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load_checkpoint(
        &self,
        engine_id: &str,
        partition: &PartitionKey,
    ) -> Result<Option<Checkpoint>, ProjectionError>;

    /// Save (upsert) a checkpoint.
    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), ProjectionError>;

    async fn delete_checkpoint(&self, engine_id: &str, partition: &PartitionKey) -> Result<(), ProjectionError>;
}

/// Checkpoint reads/writes for one partition.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    engine_id: String,
    partition: PartitionKey,
    /// Save every N events.
    save_interval: u64,
    counter: u64,
    /// Last position passed to `maybe_save` that is not yet persisted.
    pending: Option<Position>,
}

impl CheckpointManager {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        engine_id: impl Into<String>,
        partition: PartitionKey,
        save_interval: u64,
    ) -> Self {
        Self {
            store,
            engine_id: engine_id.into(),
            partition,
            save_interval: save_interval.max(1),
            counter: 0,
            pending: None,
        }
    }

    pub async fn load(&self) -> Result<Option<Checkpoint>, ProjectionError> {
        self.store.load_checkpoint(&self.engine_id, &self.partition).await
    }

    /// Record an applied position; persists every `save_interval` calls.
    pub async fn maybe_save(&mut self, position: Position) -> Result<(), ProjectionError> {
        self.counter += 1;
        self.pending = Some(position);
        if self.counter >= self.save_interval {
            self.force_save(position).await?;
        }
        Ok(())
    }

    /// Persist the last recorded position, if any (used on flush and shutdown).
    pub async fn flush(&mut self) -> Result<(), ProjectionError> {
        match self.pending {
            Some(position) => self.force_save(position).await,
            None => Ok(()),
        }
    }

    pub async fn force_save(&mut self, position: Position) -> Result<(), ProjectionError> {
        let cp = Checkpoint {
            engine_id: self.engine_id.clone(),
            chain_id: self.partition.chain_id,
            contract: self.partition.contract.clone(),
            block_number: position.block_number,
            log_index: position.log_index,
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store.save_checkpoint(cp).await?;
        self.counter = 0;
        self.pending = None;
        Ok(())
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(engine_id: &str, chain_id: u64, contract: &str) -> String {
        format!("{engine_id}:{chain_id}:{contract}")
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Checkpoint>>, ProjectionError> {
        self.data
            .lock()
            .map_err(|_| ProjectionError::StoreUnavailable("checkpoint store lock poisoned".into()))
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load_checkpoint(
        &self,
        engine_id: &str,
        partition: &PartitionKey,
    ) -> Result<Option<Checkpoint>, ProjectionError> {
        let key = Self::key(engine_id, partition.chain_id, &partition.contract);
        Ok(self.lock()?.get(&key).cloned())
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), ProjectionError> {
        let key = Self::key(&checkpoint.engine_id, checkpoint.chain_id, &checkpoint.contract);
        self.lock()?.insert(key, checkpoint);
        Ok(())
    }

    async fn delete_checkpoint(&self, engine_id: &str, partition: &PartitionKey) -> Result<(), ProjectionError> {
        let key = Self::key(engine_id, partition.chain_id, &partition.contract);
        self.lock()?.remove(&key);
        Ok(())
    }
}

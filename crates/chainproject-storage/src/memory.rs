//! In-memory storage backend.
//!
//! Keeps every live table and checkpoint in RAM. Useful for tests, replays
//! of bounded feeds and short-lived projections that don't need persistence.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use chainproject_core::checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
use chainproject_core::{
    EntityKey, EntityStore, KeyPredicate, PartitionKey, ProjectionError, Row, TableDef, Write, WriteOp,
};

type Table = BTreeMap<EntityKey, Row>;

/// In-memory entity + checkpoint store.
///
/// All data is lost when the process exits. Each commit takes the write
/// lock once, so the writes of one event become visible together.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<&'static str, Table>>,
    checkpoints: MemoryCheckpointStore,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in a table.
    pub async fn len(&self, table: &TableDef) -> usize {
        self.tables.read().await.get(table.name).map_or(0, BTreeMap::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.tables.read().await.values().all(BTreeMap::is_empty)
    }
}

fn violation(w: &Write) -> ProjectionError {
    ProjectionError::UniqueConstraintViolation {
        table: w.table.name.to_string(),
        key: w.key.to_string(),
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn find_one(
        &self,
        table: &'static TableDef,
        predicate: &KeyPredicate,
    ) -> Result<Option<Row>, ProjectionError> {
        let tables = self.tables.read().await;
        let Some(rows) = tables.get(table.name) else {
            return Ok(None);
        };
        let found = match predicate.exact_key(table) {
            Some(key) => rows.get(&key).filter(|row| predicate.matches(row)),
            None => rows.values().find(|row| predicate.matches(row)),
        };
        Ok(found.cloned())
    }

    async fn create(&self, table: &'static TableDef, row: Row) -> Result<(), ProjectionError> {
        let key = table.key_of(&row)?;
        self.commit(vec![Write {
            op: WriteOp::Create,
            table,
            key,
            row,
        }])
        .await
    }

    async fn save(&self, table: &'static TableDef, row: Row) -> Result<(), ProjectionError> {
        let key = table.key_of(&row)?;
        self.tables
            .write()
            .await
            .entry(table.name)
            .or_default()
            .insert(key, row);
        Ok(())
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), ProjectionError> {
        let mut tables = self.tables.write().await;

        // Validate every create before touching anything.
        let mut seen = std::collections::HashSet::new();
        for w in writes.iter().filter(|w| w.op == WriteOp::Create) {
            let exists = tables
                .get(w.table.name)
                .is_some_and(|rows| rows.contains_key(&w.key));
            if exists || !seen.insert((w.table.name, &w.key)) {
                return Err(violation(w));
            }
        }

        let n = writes.len();
        for w in writes {
            tables.entry(w.table.name).or_default().insert(w.key, w.row);
        }
        tracing::trace!(writes = n, "memory commit");
        Ok(())
    }

    async fn rows(&self, table: &'static TableDef) -> Result<Vec<Row>, ProjectionError> {
        Ok(self
            .tables
            .read()
            .await
            .get(table.name)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStore {
    async fn load_checkpoint(
        &self,
        engine_id: &str,
        partition: &PartitionKey,
    ) -> Result<Option<Checkpoint>, ProjectionError> {
        self.checkpoints.load_checkpoint(engine_id, partition).await
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), ProjectionError> {
        self.checkpoints.save_checkpoint(checkpoint).await
    }

    async fn delete_checkpoint(&self, engine_id: &str, partition: &PartitionKey) -> Result<(), ProjectionError> {
        self.checkpoints.delete_checkpoint(engine_id, partition).await
    }
}

//! SQLite storage backend for ChainProject.
//!
//! Persists live-table rows and partition checkpoints to a single SQLite
//! file. Rows are stored as JSON under their canonical unique key, so one
//! schema serves every table. Uses `sqlx` with WAL mode.
//!
//! # Usage
//! ```rust,no_run
//! use chainproject_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./projection.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row as _;
use tracing::debug;

use chainproject_core::checkpoint::{Checkpoint, CheckpointStore};
use chainproject_core::{EntityKey, EntityStore, KeyPredicate, PartitionKey, ProjectionError, Row, TableDef, Write, WriteOp};

/// SQLite-backed entity + checkpoint store.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn unavailable(e: sqlx::Error) -> ProjectionError {
    ProjectionError::StoreUnavailable(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./projection.db"`) or a full
    /// SQLite URL (`"sqlite:./projection.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, ProjectionError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(unavailable)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Every `:memory:` connection is its own database, so the pool is
    /// pinned to a single connection that is never recycled.
    pub async fn in_memory() -> Result<Self, ProjectionError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(unavailable)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ProjectionError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entities (
                table_name TEXT NOT NULL,
                entity_key TEXT NOT NULL,
                row_json   TEXT NOT NULL,
                PRIMARY KEY (table_name, entity_key)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                engine_id    TEXT    NOT NULL,
                chain_id     INTEGER NOT NULL,
                contract     TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                log_index    INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL,
                PRIMARY KEY (engine_id, chain_id, contract)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        debug!("SQLite schema initialized");
        Ok(())
    }

    /// Number of rows stored for `table`.
    pub async fn count(&self, table: &TableDef) -> Result<u64, ProjectionError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM entities WHERE table_name = ?")
            .bind(table.name)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;
        let n: i64 = row.try_get("n").map_err(unavailable)?;
        Ok(n as u64)
    }

    fn parse(row: &SqliteRow) -> Result<Row, ProjectionError> {
        let json: String = row.try_get("row_json").map_err(unavailable)?;
        Ok(serde_json::from_str(&json)?)
    }
}

const INSERT: &str = "INSERT INTO entities (table_name, entity_key, row_json) VALUES (?, ?, ?)";

const UPSERT: &str = "INSERT INTO entities (table_name, entity_key, row_json) VALUES (?, ?, ?)
     ON CONFLICT(table_name, entity_key) DO UPDATE SET row_json = excluded.row_json";

fn map_write_err(e: sqlx::Error, table: &TableDef, key: &EntityKey) -> ProjectionError {
    if is_unique_violation(&e) {
        ProjectionError::UniqueConstraintViolation {
            table: table.name.to_string(),
            key: key.to_string(),
        }
    } else {
        unavailable(e)
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn find_one(
        &self,
        table: &'static TableDef,
        predicate: &KeyPredicate,
    ) -> Result<Option<Row>, ProjectionError> {
        if let Some(key) = predicate.exact_key(table) {
            let found = sqlx::query("SELECT row_json FROM entities WHERE table_name = ? AND entity_key = ?")
                .bind(table.name)
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;
            return match found {
                Some(r) => Ok(Some(Self::parse(&r)?).filter(|row| predicate.matches(row))),
                None => Ok(None),
            };
        }

        for row in self.rows(table).await? {
            if predicate.matches(&row) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    async fn create(&self, table: &'static TableDef, row: Row) -> Result<(), ProjectionError> {
        let key = table.key_of(&row)?;
        sqlx::query(INSERT)
            .bind(table.name)
            .bind(key.as_str())
            .bind(serde_json::to_string(&row)?)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_err(e, table, &key))?;
        Ok(())
    }

    async fn save(&self, table: &'static TableDef, row: Row) -> Result<(), ProjectionError> {
        let key = table.key_of(&row)?;
        sqlx::query(UPSERT)
            .bind(table.name)
            .bind(key.as_str())
            .bind(serde_json::to_string(&row)?)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), ProjectionError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for w in &writes {
            let sql = match w.op {
                WriteOp::Create => INSERT,
                WriteOp::Save => UPSERT,
            };
            sqlx::query(sql)
                .bind(w.table.name)
                .bind(w.key.as_str())
                .bind(serde_json::to_string(&w.row)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_err(e, w.table, &w.key))?;
        }
        tx.commit().await.map_err(unavailable)?;
        debug!(writes = writes.len(), "SQLite commit");
        Ok(())
    }

    async fn rows(&self, table: &'static TableDef) -> Result<Vec<Row>, ProjectionError> {
        let rows = sqlx::query("SELECT row_json FROM entities WHERE table_name = ? ORDER BY entity_key")
            .bind(table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        rows.iter().map(Self::parse).collect()
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn load_checkpoint(
        &self,
        engine_id: &str,
        partition: &PartitionKey,
    ) -> Result<Option<Checkpoint>, ProjectionError> {
        let row = sqlx::query(
            "SELECT block_number, log_index, updated_at
             FROM checkpoints WHERE engine_id = ? AND chain_id = ? AND contract = ?",
        )
        .bind(engine_id)
        .bind(partition.chain_id as i64)
        .bind(partition.contract.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        let Some(r) = row else { return Ok(None) };
        let block_number: i64 = r.try_get("block_number").map_err(unavailable)?;
        let log_index: i64 = r.try_get("log_index").map_err(unavailable)?;
        let updated_at: i64 = r.try_get("updated_at").map_err(unavailable)?;
        Ok(Some(Checkpoint {
            engine_id: engine_id.to_string(),
            chain_id: partition.chain_id,
            contract: partition.contract.clone(),
            block_number: block_number as u64,
            log_index: log_index as u32,
            updated_at,
        }))
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), ProjectionError> {
        sqlx::query(
            "INSERT INTO checkpoints (engine_id, chain_id, contract, block_number, log_index, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(engine_id, chain_id, contract) DO UPDATE SET
                block_number = excluded.block_number,
                log_index    = excluded.log_index,
                updated_at   = excluded.updated_at",
        )
        .bind(checkpoint.engine_id.as_str())
        .bind(checkpoint.chain_id as i64)
        .bind(checkpoint.contract.as_str())
        .bind(checkpoint.block_number as i64)
        .bind(checkpoint.log_index as i64)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        debug!(
            engine = %checkpoint.engine_id,
            chain = checkpoint.chain_id,
            contract = %checkpoint.contract,
            block = checkpoint.block_number,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn delete_checkpoint(&self, engine_id: &str, partition: &PartitionKey) -> Result<(), ProjectionError> {
        sqlx::query("DELETE FROM checkpoints WHERE engine_id = ? AND chain_id = ? AND contract = ?")
            .bind(engine_id)
            .bind(partition.chain_id as i64)
            .bind(partition.contract.as_str())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

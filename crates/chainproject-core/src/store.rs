//! The entity store contract.

use async_trait::async_trait;

use crate::entity::{EntityKey, KeyPredicate, TableDef};
use crate::error::ProjectionError;

/// A stored row: a JSON object with camelCase field names.
pub type Row = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert; fails with `UniqueConstraintViolation` if the key exists.
    Create,
    /// Upsert the row's final state.
    Save,
}

/// One staged mutation of an apply invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub op: WriteOp,
    pub table: &'static TableDef,
    pub key: EntityKey,
    pub row: Row,
}

/// Keyed store backing the live tables.
///
/// Implementations must be safe under concurrent calls for different keys
/// and serialize (or constraint-reject) concurrent calls for the same key.
/// Transient I/O failures surface as `StoreUnavailable`.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// At most one row matching `predicate`. A predicate covering the whole
    /// unique key is a point lookup; a narrower one returns the first
    /// matching row in key order.
    async fn find_one(
        &self,
        table: &'static TableDef,
        predicate: &KeyPredicate,
    ) -> Result<Option<Row>, ProjectionError>;

    /// Insert a new row.
    async fn create(&self, table: &'static TableDef, row: Row) -> Result<(), ProjectionError>;

    /// Upsert a row. Saving the same state twice is not observable.
    async fn save(&self, table: &'static TableDef, row: Row) -> Result<(), ProjectionError>;

    /// Apply the writes of one event. Durable implementations make this
    /// all-or-nothing; the default applies them in order.
    async fn commit(&self, writes: Vec<Write>) -> Result<(), ProjectionError> {
        for w in writes {
            match w.op {
                WriteOp::Create => self.create(w.table, w.row).await?,
                WriteOp::Save => self.save(w.table, w.row).await?,
            }
        }
        Ok(())
    }

    /// Every row of a table, in key order.
    async fn rows(&self, table: &'static TableDef) -> Result<Vec<Row>, ProjectionError>;
}

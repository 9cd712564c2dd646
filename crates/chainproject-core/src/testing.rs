//! Test fixtures shared by the core unit tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::context::ApplyContext;
use crate::entity::{Entity, EntityKey, KeyPredicate, TableDef};
use crate::error::ProjectionError;
use crate::event::{Event, Origin};
use crate::layout::{AbiType, DecodeFailure, PayloadDecoder, SchemaResolver};
use crate::linker::{Configuration, Participant, PoolScope};
use crate::reader::StaticContractReader;
use crate::status::Status;
use crate::store::{EntityStore, Row, Write, WriteOp};
use crate::value::Value;

pub const POOL: TableDef = TableDef {
    name: "Pool",
    unique_by: &["chainId", "poolId"],
    owner: None,
};

pub const RECIPIENT: TableDef = TableDef {
    name: "Recipient",
    unique_by: &["chainId", "poolId", "recipientId"],
    owner: Some(&POOL),
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub chain_id: u64,
    pub pool_id: u64,
    pub threshold: u64,
    pub active: bool,
}

impl Entity for Pool {
    const TABLE: &'static TableDef = &POOL;
}

impl Configuration for Pool {
    fn scope(&self) -> PoolScope {
        PoolScope::new(self.chain_id, self.pool_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub chain_id: u64,
    pub pool_id: u64,
    pub recipient_id: String,
    pub votes: u64,
    pub status: Status,
}

impl Entity for Recipient {
    const TABLE: &'static TableDef = &RECIPIENT;
}

impl Participant for Recipient {
    const DISCRIMINATOR: &'static str = "recipientId";

    fn blank(scope: &PoolScope, id: &str) -> Self {
        Self {
            chain_id: scope.chain_id,
            pool_id: scope.pool_id.parse().unwrap_or_default(),
            recipient_id: id.to_string(),
            ..Default::default()
        }
    }
}

pub fn pool(pool_id: u64, threshold: u64) -> Pool {
    Pool {
        chain_id: 1,
        pool_id,
        threshold,
        active: false,
    }
}

pub fn recipient(pool_id: u64, id: &str) -> Recipient {
    Recipient {
        chain_id: 1,
        pool_id,
        recipient_id: id.into(),
        ..Default::default()
    }
}

// ─── Store ────────────────────────────────────────────────────────────────────

/// Minimal atomic store with failure injection.
#[derive(Default)]
pub struct TestStore {
    rows: Mutex<BTreeMap<(String, EntityKey), Row>>,
    fail_commits: AtomicU32,
    pub commits: AtomicU32,
}

impl TestStore {
    /// Make the next `n` commits fail with `StoreUnavailable`.
    pub fn fail_next(&self, n: u32) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntityStore for TestStore {
    async fn find_one(&self, table: &'static TableDef, predicate: &KeyPredicate) -> Result<Option<Row>, ProjectionError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|((t, _), _)| t == table.name)
            .map(|(_, row)| row)
            .find(|row| predicate.matches(row))
            .cloned())
    }

    async fn create(&self, table: &'static TableDef, row: Row) -> Result<(), ProjectionError> {
        let key = table.key_of(&row)?;
        self.commit(vec![Write { op: WriteOp::Create, table, key, row }]).await
    }

    async fn save(&self, table: &'static TableDef, row: Row) -> Result<(), ProjectionError> {
        let key = table.key_of(&row)?;
        self.commit(vec![Write { op: WriteOp::Save, table, key, row }]).await
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), ProjectionError> {
        if self
            .fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProjectionError::StoreUnavailable("injected".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        for w in &writes {
            if w.op == WriteOp::Create && rows.contains_key(&(w.table.name.to_string(), w.key.clone())) {
                return Err(ProjectionError::UniqueConstraintViolation {
                    table: w.table.name.into(),
                    key: w.key.to_string(),
                });
            }
        }
        for w in writes {
            rows.insert((w.table.name.to_string(), w.key), w.row);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rows(&self, table: &'static TableDef) -> Result<Vec<Row>, ProjectionError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|((t, _), _)| t == table.name)
            .map(|(_, r)| r.clone())
            .collect())
    }
}

// ─── Decoder ──────────────────────────────────────────────────────────────────

/// Decodes nothing; core tests never resolve payloads through it.
pub struct NoDecoder;

impl PayloadDecoder for NoDecoder {
    fn decode(&self, _payload: &[u8], types: &[AbiType]) -> Result<Vec<Value>, DecodeFailure> {
        Err(DecodeFailure(format!("no decoder for {}", AbiType::Tuple(types.to_vec()))))
    }
}

// ─── Harness ──────────────────────────────────────────────────────────────────

pub const CONTRACT: &str = "0xpool";

pub struct Harness {
    pub store: Arc<TestStore>,
    pub reader: Arc<StaticContractReader>,
    pub resolver: SchemaResolver,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(TestStore::default()),
            reader: Arc::new(StaticContractReader::new()),
            resolver: SchemaResolver::new(Arc::new(NoDecoder)),
        }
    }

    pub fn event(&self, name: &str) -> Event {
        Event::new(Origin::new(1, CONTRACT, 1, 0), name)
    }

    pub fn context<'a>(&'a self, event: &'a Event) -> ApplyContext<'a> {
        ApplyContext::new(event, self.store.as_ref(), self.reader.as_ref(), &self.resolver)
    }
}

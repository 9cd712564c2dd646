//! Per-event apply context: staged writes with read-your-writes.
//!
//! Every route of one event shares a single [`ApplyContext`]. Writes are
//! staged in memory and committed to the store together when all routes
//! succeed, so a failing event leaves no partial cross-table state.

use std::collections::HashMap;

use crate::entity::{Entity, EntityKey, KeyPredicate, TableDef};
use crate::error::ProjectionError;
use crate::event::Event;
use crate::layout::SchemaResolver;
use crate::linker::Linker;
use crate::reader::ContractReader;
use crate::store::{EntityStore, Row, Write, WriteOp};
use crate::value::Value;

pub struct ApplyContext<'a> {
    event: &'a Event,
    store: &'a dyn EntityStore,
    reader: &'a dyn ContractReader,
    resolver: &'a SchemaResolver,
    staged: Vec<Write>,
    index: HashMap<(&'static str, EntityKey), usize>,
}

impl<'a> ApplyContext<'a> {
    pub fn new(
        event: &'a Event,
        store: &'a dyn EntityStore,
        reader: &'a dyn ContractReader,
        resolver: &'a SchemaResolver,
    ) -> Self {
        Self {
            event,
            store,
            reader,
            resolver,
            staged: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn event(&self) -> &'a Event {
        self.event
    }

    pub fn resolver(&self) -> &'a SchemaResolver {
        self.resolver
    }

    pub fn linker(&mut self) -> Linker<'_, 'a> {
        Linker::new(self)
    }

    /// Read a field of the emitting contract's current state.
    pub async fn read_contract_field(&self, field: &str) -> Result<Value, ProjectionError> {
        let origin = &self.event.origin;
        self.reader
            .read_field(origin.chain_id, &origin.contract_address, field)
            .await
    }

    // ─── Row access ───────────────────────────────────────────────────────

    /// Find one row as the store would see it after this event's staged
    /// writes: a staged write replaces the stored row with the same key, and
    /// a narrower predicate returns the match with the lowest key.
    pub async fn find_row(
        &self,
        table: &'static TableDef,
        predicate: &KeyPredicate,
    ) -> Result<Option<Row>, ProjectionError> {
        if let Some(key) = predicate.exact_key(table) {
            return match self.index.get(&(table.name, key)) {
                Some(&i) => {
                    let row = &self.staged[i].row;
                    Ok(predicate.matches(row).then(|| row.clone()))
                }
                None => self.store.find_one(table, predicate).await,
            };
        }

        let staged = self
            .staged
            .iter()
            .filter(|w| w.table.name == table.name && predicate.matches(&w.row))
            .min_by(|a, b| a.key.cmp(&b.key));
        // Predicates only name key fields, so a staged row with a stored
        // row's key matches whenever the stored one does.
        let stored = match self.store.find_one(table, predicate).await? {
            Some(row) => {
                let key = table.key_of(&row)?;
                (!self.index.contains_key(&(table.name, key.clone()))).then_some((key, row))
            }
            None => None,
        };
        Ok(match (staged, stored) {
            (Some(w), Some((key, row))) => Some(if w.key < key { w.row.clone() } else { row }),
            (Some(w), None) => Some(w.row.clone()),
            (None, Some((_, row))) => Some(row),
            (None, None) => None,
        })
    }

    pub async fn find<E: Entity>(&self, predicate: &KeyPredicate) -> Result<Option<E>, ProjectionError> {
        self.find_row(E::TABLE, predicate)
            .await?
            .map(E::from_row)
            .transpose()
    }

    /// Stage creation of a new row.
    ///
    /// Fails with `UniqueConstraintViolation` if this event already staged
    /// the key; the store enforces the constraint against committed rows.
    pub async fn create<E: Entity>(&mut self, entity: &E) -> Result<(), ProjectionError> {
        self.stage(E::TABLE, entity.to_row()?, WriteOp::Create).await
    }

    /// Stage the final state of a row.
    pub async fn save<E: Entity>(&mut self, entity: &E) -> Result<(), ProjectionError> {
        self.stage(E::TABLE, entity.to_row()?, WriteOp::Save).await
    }

    async fn stage(&mut self, table: &'static TableDef, row: Row, op: WriteOp) -> Result<(), ProjectionError> {
        let key = table.key_of(&row)?;
        self.require_owner(table, &row).await?;

        let slot = (table.name, key.clone());
        match (self.index.get(&slot).copied(), op) {
            (Some(_), WriteOp::Create) => Err(ProjectionError::UniqueConstraintViolation {
                table: table.name.to_string(),
                key: key.to_string(),
            }),
            (Some(i), WriteOp::Save) => {
                // A save after a staged create keeps the create semantics.
                self.staged[i].row = row;
                Ok(())
            }
            (None, op) => {
                tracing::trace!(table = table.name, %key, ?op, "staged");
                self.index.insert(slot, self.staged.len());
                self.staged.push(Write { op, table, key, row });
                Ok(())
            }
        }
    }

    async fn require_owner(&self, table: &'static TableDef, row: &Row) -> Result<(), ProjectionError> {
        let Some((owner, key)) = table.owner_key(row)? else {
            return Ok(());
        };
        let predicate = KeyPredicate::for_row(owner, row)?;
        match self.find_row(owner, &predicate).await? {
            Some(_) => Ok(()),
            None => Err(ProjectionError::MissingReferencedEntity {
                table: owner.name.to_string(),
                key: key.to_string(),
            }),
        }
    }

    pub fn staged(&self) -> &[Write] {
        &self.staged
    }

    /// Commit every staged write. Returns the number of writes.
    pub async fn commit(self) -> Result<usize, ProjectionError> {
        let n = self.staged.len();
        if n > 0 {
            self.store.commit(self.staged).await?;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pool, recipient, Harness, Pool, Recipient};

    #[tokio::test]
    async fn reads_observe_staged_writes() {
        let h = Harness::new();
        let ev = h.event("t.Pool.Initialized");
        let mut ctx = h.context(&ev);

        let p = pool(7, 10);
        ctx.create(&p).await.unwrap();
        let found: Pool = ctx.find(&KeyPredicate::new().with("chainId", 1).with("poolId", 7)).await.unwrap().unwrap();
        assert_eq!(found.threshold, 10);

        // Partial predicate also sees the staged row.
        let found: Option<Pool> = ctx.find(&KeyPredicate::new().with("poolId", 7)).await.unwrap();
        assert!(found.is_some());

        assert_eq!(ctx.commit().await.unwrap(), 1);
        assert_eq!(h.store.rows(Pool::TABLE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn partial_predicate_returns_lowest_key_across_staged_and_stored() {
        let h = Harness::new();
        let ev = h.event("t.Pool.Registered");
        let mut ctx = h.context(&ev);
        ctx.create(&pool(7, 1)).await.unwrap();
        ctx.save(&recipient(7, "0xr1")).await.unwrap();
        ctx.commit().await.unwrap();

        let in_pool = KeyPredicate::new().with("chainId", 1).with("poolId", 7);
        let mut ctx = h.context(&ev);
        ctx.save(&recipient(7, "0xr2")).await.unwrap();
        let found: Recipient = ctx.find(&in_pool).await.unwrap().unwrap();
        assert_eq!(found.recipient_id, "0xr1");

        // A staged write of the stored key shadows the stored row.
        let mut updated = recipient(7, "0xr1");
        updated.votes = 5;
        ctx.save(&updated).await.unwrap();
        let found: Recipient = ctx.find(&in_pool).await.unwrap().unwrap();
        assert_eq!(found.votes, 5);

        ctx.save(&recipient(7, "0xr0")).await.unwrap();
        let found: Recipient = ctx.find(&in_pool).await.unwrap().unwrap();
        assert_eq!(found.recipient_id, "0xr0");
    }

    #[tokio::test]
    async fn double_create_in_one_event_is_rejected() {
        let h = Harness::new();
        let ev = h.event("t.Pool.Initialized");
        let mut ctx = h.context(&ev);
        ctx.create(&pool(7, 10)).await.unwrap();
        let err = ctx.create(&pool(7, 11)).await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn save_after_create_stays_a_create() {
        let h = Harness::new();
        let ev = h.event("t.Pool.Initialized");
        let mut ctx = h.context(&ev);
        ctx.create(&pool(7, 10)).await.unwrap();
        ctx.save(&pool(7, 12)).await.unwrap();
        assert_eq!(ctx.staged().len(), 1);
        assert_eq!(ctx.staged()[0].op, WriteOp::Create);
        assert_eq!(ctx.staged()[0].row["threshold"], 12);
    }

    #[tokio::test]
    async fn participant_requires_owner() {
        let h = Harness::new();
        let ev = h.event("t.Pool.Registered");
        let mut ctx = h.context(&ev);
        let err = ctx.save(&recipient(7, "0xr1")).await.unwrap_err();
        assert!(matches!(err, ProjectionError::MissingReferencedEntity { ref table, .. } if table == "Pool"));

        ctx.create(&pool(7, 1)).await.unwrap();
        ctx.save(&recipient(7, "0xr1")).await.unwrap();
        let r: Option<Recipient> = ctx
            .find(&KeyPredicate::new().with("chainId", 1).with("poolId", 7).with("recipientId", "0xr1"))
            .await
            .unwrap();
        assert!(r.is_some());
    }

    #[tokio::test]
    async fn dropped_context_writes_nothing() {
        let h = Harness::new();
        let ev = h.event("t.Pool.Initialized");
        {
            let mut ctx = h.context(&ev);
            ctx.create(&pool(7, 10)).await.unwrap();
        }
        assert!(h.store.rows(Pool::TABLE).await.unwrap().is_empty());
    }
}

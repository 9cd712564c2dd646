//! Route registry: event name → ordered table routes.
//!
//! A route binds one event name to one table with a [`WritePolicy`] and an
//! event handler. Every route of a table first runs the table's
//! [`CommonProperties`] step, which fills the row's key fields; the route
//! then loads the existing row by that key, applies the policy and runs the
//! event-specific handler.
//!
//! ```text
//! draft row ─▶ common properties ─▶ key ─▶ find ─▶ policy ─▶ handler ─▶ stage
//! ```
//!
//! The registry is assembled once at startup with [`HandlerRegistry::builder`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::ApplyContext;
use crate::entity::{Entity, KeyPredicate, TableDef};
use crate::error::ProjectionError;
use crate::event::Event;

/// Fills the key fields shared by every handler of a table.
#[async_trait]
pub trait CommonProperties<T: Entity>: Send + Sync {
    async fn populate(&self, row: &mut T, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError>;
}

/// Applies one event's mutation to a row.
///
/// Handlers must be pure functions of (row, event, current contract state):
/// applying the same event twice leaves the same row.
#[async_trait]
pub trait EventHandler<T: Entity>: Send + Sync {
    async fn handle(&self, row: &mut T, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError>;
}

/// How a route treats the presence or absence of its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Create the row; if it already exists, apply the handler as an update.
    CreateOnce,
    /// Update the row, creating it first when absent.
    GetOrCreate,
    /// The row must exist, else `MissingReferencedEntity`.
    UpdateOnly,
    /// Update the row if it exists; otherwise do nothing.
    UpdateIfExists,
}

// ─── Closure adapters ─────────────────────────────────────────────────────────

struct FnCommon<F>(F);

#[async_trait]
impl<T, F> CommonProperties<T> for FnCommon<F>
where
    T: Entity,
    F: Fn(&mut T, &Event) -> Result<(), ProjectionError> + Send + Sync,
{
    async fn populate(&self, row: &mut T, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        (self.0)(row, ctx.event())
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<T, F> EventHandler<T> for FnHandler<F>
where
    T: Entity,
    F: Fn(&mut T, &Event) -> Result<(), ProjectionError> + Send + Sync,
{
    async fn handle(&self, row: &mut T, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        (self.0)(row, ctx.event())
    }
}

// ─── Routes ───────────────────────────────────────────────────────────────────

/// A type-erased route, as stored in the registry.
#[async_trait]
pub(crate) trait Route: Send + Sync {
    fn table(&self) -> &'static TableDef;

    /// Run the route. Returns `false` if the policy skipped the write.
    async fn run(&self, ctx: &mut ApplyContext<'_>) -> Result<bool, ProjectionError>;
}

struct TypedRoute<T: Entity> {
    event: String,
    policy: WritePolicy,
    common: Arc<dyn CommonProperties<T>>,
    handler: Arc<dyn EventHandler<T>>,
}

#[async_trait]
impl<T: Entity> Route for TypedRoute<T> {
    fn table(&self) -> &'static TableDef {
        T::TABLE
    }

    async fn run(&self, ctx: &mut ApplyContext<'_>) -> Result<bool, ProjectionError> {
        let table = T::TABLE;
        let mut draft = T::default();
        self.common.populate(&mut draft, ctx).await?;

        let predicate = KeyPredicate::for_row(table, &draft.to_row()?)?;
        let existing: Option<T> = ctx.find(&predicate).await?;

        match (self.policy, existing) {
            (WritePolicy::CreateOnce | WritePolicy::GetOrCreate, None) => {
                self.handler.handle(&mut draft, ctx).await?;
                ctx.create(&draft).await?;
            }
            (WritePolicy::CreateOnce, Some(mut row)) => {
                tracing::warn!(
                    table = table.name,
                    key = %predicate,
                    event = %self.event,
                    "row already exists, applying create as update"
                );
                self.handler.handle(&mut row, ctx).await?;
                ctx.save(&row).await?;
            }
            (WritePolicy::UpdateOnly, None) => {
                return Err(ProjectionError::MissingReferencedEntity {
                    table: table.name.to_string(),
                    key: predicate.to_string(),
                });
            }
            (WritePolicy::UpdateIfExists, None) => {
                tracing::debug!(table = table.name, key = %predicate, "no row to update");
                return Ok(false);
            }
            (_, Some(mut row)) => {
                self.handler.handle(&mut row, ctx).await?;
                ctx.save(&row).await?;
            }
        }
        Ok(true)
    }
}

/// The routes of one table, sharing its common-properties step.
pub struct TableRoutes<T: Entity> {
    common: Arc<dyn CommonProperties<T>>,
    routes: Vec<(String, Arc<dyn Route>)>,
    _table: PhantomData<fn() -> T>,
}

impl<T: Entity> TableRoutes<T> {
    pub fn new(common: impl CommonProperties<T> + 'static) -> Self {
        Self {
            common: Arc::new(common),
            routes: Vec::new(),
            _table: PhantomData,
        }
    }

    /// Common-properties step from a closure over the event.
    pub fn keyed_by<F>(f: F) -> Self
    where
        F: Fn(&mut T, &Event) -> Result<(), ProjectionError> + Send + Sync + 'static,
    {
        Self::new(FnCommon(f))
    }

    /// Route `event` to this table.
    pub fn on(mut self, event: impl Into<String>, policy: WritePolicy, handler: impl EventHandler<T> + 'static) -> Self {
        let event = event.into();
        let route = TypedRoute {
            event: event.clone(),
            policy,
            common: self.common.clone(),
            handler: Arc::new(handler),
        };
        self.routes.push((event, Arc::new(route)));
        self
    }

    /// Route `event` to a handler that only needs the row and the event.
    pub fn on_fn<F>(self, event: impl Into<String>, policy: WritePolicy, f: F) -> Self
    where
        F: Fn(&mut T, &Event) -> Result<(), ProjectionError> + Send + Sync + 'static,
    {
        self.on(event, policy, FnHandler(f))
    }
}

// ─── Registry ─────────────────────────────────────────────────────────────────

/// Immutable event → routes map.
pub struct HandlerRegistry {
    routes: HashMap<String, Vec<Arc<dyn Route>>>,
    tables: Vec<&'static TableDef>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Routes for `event`, in registration order.
    pub(crate) fn routes(&self, event: &str) -> &[Arc<dyn Route>] {
        self.routes.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_routed(&self, event: &str) -> bool {
        !self.routes(event).is_empty()
    }

    /// Tables written by `event`, in route order.
    pub fn tables_for(&self, event: &str) -> Vec<&'static TableDef> {
        self.routes(event).iter().map(|r| r.table()).collect()
    }

    /// Every table with at least one route, in declaration order.
    pub fn tables(&self) -> &[&'static TableDef] {
        &self.tables
    }

    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    routes: HashMap<String, Vec<Arc<dyn Route>>>,
    tables: Vec<&'static TableDef>,
}

impl RegistryBuilder {
    /// Add every route of a table. Routes for the same event run in the
    /// order their tables were added.
    pub fn table<T: Entity>(mut self, table: TableRoutes<T>) -> Self {
        if !self.tables.iter().any(|t| t.name == T::TABLE.name) {
            self.tables.push(T::TABLE);
        }
        for (event, route) in table.routes {
            self.routes.entry(event).or_default().push(route);
        }
        self
    }

    /// Declare a table written only through the linker.
    pub fn declare(mut self, table: &'static TableDef) -> Self {
        if !self.tables.iter().any(|t| t.name == table.name) {
            self.tables.push(table);
        }
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            routes: self.routes,
            tables: self.tables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityStore;
    use crate::testing::{Harness, Pool, Recipient, POOL, RECIPIENT};
    use crate::value::FieldAccess;

    fn pool_routes() -> TableRoutes<Pool> {
        TableRoutes::keyed_by(|row: &mut Pool, ev: &Event| {
            row.chain_id = ev.origin.chain_id;
            row.pool_id = ev.u64("poolId")?;
            Ok(())
        })
        .on_fn("t.Pool.Initialized", WritePolicy::CreateOnce, |row, ev| {
            row.threshold = ev.u64("threshold")?;
            Ok(())
        })
        .on_fn("t.Pool.PoolActive", WritePolicy::UpdateOnly, |row, ev| {
            row.active = ev.boolean("active")?;
            Ok(())
        })
    }

    #[test]
    fn builder_collects_routes_and_tables() {
        let registry = HandlerRegistry::builder()
            .table(pool_routes())
            .declare(&RECIPIENT)
            .build();
        assert!(registry.is_routed("t.Pool.Initialized"));
        assert!(!registry.is_routed("t.Pool.Unknown"));
        assert_eq!(registry.tables_for("t.Pool.PoolActive"), vec![&POOL]);
        assert_eq!(
            registry.tables().iter().map(|t| t.name).collect::<Vec<_>>(),
            ["Pool", "Recipient"]
        );
    }

    #[tokio::test]
    async fn create_once_falls_back_to_update() {
        let h = Harness::new();
        let registry = HandlerRegistry::builder().table(pool_routes()).build();

        for threshold in [5u64, 9] {
            let ev = h.event("t.Pool.Initialized").with("poolId", 7u64).with("threshold", threshold);
            let mut ctx = h.context(&ev);
            for route in registry.routes(&ev.name) {
                assert!(route.run(&mut ctx).await.unwrap());
            }
            ctx.commit().await.unwrap();
        }

        let rows = h.store.rows(Pool::TABLE).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["threshold"], 9);
    }

    #[tokio::test]
    async fn update_only_requires_the_row() {
        let h = Harness::new();
        let registry = HandlerRegistry::builder().table(pool_routes()).build();
        let ev = h.event("t.Pool.PoolActive").with("poolId", 7u64).with("active", true);
        let mut ctx = h.context(&ev);
        let err = registry.routes(&ev.name)[0].run(&mut ctx).await.unwrap_err();
        assert!(matches!(err, ProjectionError::MissingReferencedEntity { .. }));
    }

    #[tokio::test]
    async fn update_if_exists_skips_silently() {
        let h = Harness::new();
        let routes = TableRoutes::keyed_by(|row: &mut Recipient, ev: &Event| {
            row.chain_id = ev.origin.chain_id;
            row.pool_id = ev.u64("poolId")?;
            row.recipient_id = ev.address("recipientId")?;
            Ok(())
        })
        .on_fn("t.Pool.Allocated", WritePolicy::UpdateIfExists, |row, _| {
            row.votes += 1;
            Ok(())
        });
        let registry = HandlerRegistry::builder().table(routes).build();

        let ev = h
            .event("t.Pool.Allocated")
            .with("poolId", 7u64)
            .with("recipientId", crate::value::Value::Address("0xR1".into()));
        let mut ctx = h.context(&ev);
        assert!(!registry.routes(&ev.name)[0].run(&mut ctx).await.unwrap());
        assert!(ctx.staged().is_empty());
    }
}

//! `ProjectionEngine`: applies one event to the live tables.

use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::context::ApplyContext;
use crate::error::ProjectionError;
use crate::event::Event;
use crate::layout::SchemaResolver;
use crate::reader::ContractReader;
use crate::registry::{HandlerRegistry, Route};
use crate::store::EntityStore;

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Routes ran and `writes` rows were committed.
    Applied { routes: usize, writes: usize },
    /// No route is registered for the event name.
    Unrouted,
}

/// Applies events through the registered routes in one logical transaction
/// per event.
///
/// The engine never retries transient failures; that is the dispatcher's job.
/// It does recover from a unique-key race: if committing fails with
/// `UniqueConstraintViolation`, the event is applied once more against the
/// now-committed row, which turns the create into an update.
pub struct ProjectionEngine {
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn EntityStore>,
    reader: Arc<dyn ContractReader>,
    resolver: SchemaResolver,
}

impl ProjectionEngine {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn EntityStore>,
        reader: Arc<dyn ContractReader>,
        resolver: SchemaResolver,
    ) -> Self {
        Self {
            registry,
            store,
            reader,
            resolver,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Apply one delivered event.
    pub async fn apply(&self, event: &Event) -> Result<ApplyOutcome, ProjectionError> {
        event.parsed_name()?;
        let routes = self.registry.routes(&event.name);
        if routes.is_empty() {
            trace!(event = %event.name, "no routes");
            return Ok(ApplyOutcome::Unrouted);
        }

        match self.run(event, routes).await {
            Err(e) if e.is_recoverable() => {
                warn!(event = %event.name, position = %event.position(), error = %e, "re-applying as update");
                self.run(event, routes).await
            }
            other => other,
        }
    }

    async fn run(&self, event: &Event, routes: &[Arc<dyn Route>]) -> Result<ApplyOutcome, ProjectionError> {
        let mut ctx = ApplyContext::new(event, self.store.as_ref(), self.reader.as_ref(), &self.resolver);
        let mut ran = 0;
        for route in routes {
            if route.run(&mut ctx).await? {
                ran += 1;
            }
        }
        let writes = ctx.commit().await?;
        debug!(
            event = %event.name,
            position = %event.position(),
            routes = ran,
            writes,
            "applied"
        );
        Ok(ApplyOutcome::Applied { routes: ran, writes })
    }
}

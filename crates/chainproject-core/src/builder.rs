//! Fluent builder wiring a registry, store, decoder and side-channel into an
//! engine or a dispatcher.
//!
//! # Example
//!
//! ```rust,ignore
//! let dispatcher = EngineBuilder::new()
//!     .id("allo-live")
//!     .registry(chainproject_allo::registry())
//!     .store(store.clone())
//!     .checkpoints(store)
//!     .decoder(Arc::new(AbiDecoder::new()))
//!     .checkpoint_interval(50)
//!     .build_dispatcher()?;
//! ```

use std::sync::Arc;

use crate::checkpoint::CheckpointStore;
use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::engine::ProjectionEngine;
use crate::error::ProjectionError;
use crate::layout::{PayloadDecoder, SchemaResolver};
use crate::reader::{ContractReader, StaticContractReader};
use crate::registry::HandlerRegistry;
use crate::retry::RetryConfig;
use crate::store::EntityStore;

#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    registry: Option<HandlerRegistry>,
    store: Option<Arc<dyn EntityStore>>,
    reader: Option<Arc<dyn ContractReader>>,
    decoder: Option<Arc<dyn PayloadDecoder>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole config (e.g. one loaded from a file).
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the engine ID (used in logs and checkpoint keys).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.config.queue_capacity = n;
        self
    }

    /// Set checkpoint save interval (every N events per partition).
    pub fn checkpoint_interval(mut self, n: u64) -> Self {
        self.config.checkpoint_interval = n;
        self
    }

    pub fn skip_replayed(mut self, skip: bool) -> Self {
        self.config.skip_replayed = skip;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Side-channel for current contract state. Defaults to an empty
    /// [`StaticContractReader`].
    pub fn reader(mut self, reader: Arc<dyn ContractReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn PayloadDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Enable per-partition checkpoints.
    pub fn checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn build_config(&self) -> EngineConfig {
        self.config.clone()
    }

    pub fn build_engine(self) -> Result<ProjectionEngine, ProjectionError> {
        self.split().map(|(engine, _, _)| engine)
    }

    pub fn build_dispatcher(self) -> Result<Dispatcher, ProjectionError> {
        let (engine, checkpoints, config) = self.split()?;
        Ok(Dispatcher::new(Arc::new(engine), checkpoints, config))
    }

    #[allow(clippy::type_complexity)]
    fn split(self) -> Result<(ProjectionEngine, Option<Arc<dyn CheckpointStore>>, EngineConfig), ProjectionError> {
        let registry = self
            .registry
            .ok_or_else(|| ProjectionError::Config("no handler registry".into()))?;
        let store = self
            .store
            .ok_or_else(|| ProjectionError::Config("no entity store".into()))?;
        let decoder = self
            .decoder
            .ok_or_else(|| ProjectionError::Config("no payload decoder".into()))?;
        let reader = self
            .reader
            .unwrap_or_else(|| Arc::new(StaticContractReader::new()));

        let engine = ProjectionEngine::new(Arc::new(registry), store, reader, SchemaResolver::new(decoder));
        Ok((engine, self.checkpoints, self.config))
    }
}

//! chainproject-core: foundation for the replay-safe live-table projection engine.
//!
//! # Architecture
//!
//! ```text
//! event feed → Dispatcher (one ordered queue per partition key)
//!                  └── ProjectionEngine::apply
//!                         ├── HandlerRegistry   (event name → table routes)
//!                         ├── SchemaResolver    (selector → payload layout)
//!                         ├── ApplyContext      (staged writes, read-your-writes)
//!                         │      └── Linker     (configuration ↔ participant rows)
//!                         └── EntityStore       (memory / SQLite)
//! ```

pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod entity;
pub mod error;
pub mod event;
pub mod layout;
pub mod linker;
pub mod reader;
pub mod registry;
pub mod retry;
pub mod serde_util;
pub mod status;
pub mod store;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::EngineBuilder;
pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore, MemoryCheckpointStore};
pub use config::EngineConfig;
pub use context::ApplyContext;
pub use dispatcher::{DeadLetter, Dispatcher, DispatcherStats, Resume};
pub use engine::{ApplyOutcome, ProjectionEngine};
pub use entity::{Entity, EntityKey, KeyPredicate, TableDef};
pub use error::ProjectionError;
pub use event::{Event, EventName, Origin, PartitionKey, Position};
pub use layout::{
    AbiType, DecodeFailure, FieldSpec, FieldType, Layout, PayloadDecoder, SchemaResolver,
    Selector, TypedFields,
};
pub use linker::{Configuration, Link, Linker, Participant, PoolScope};
pub use reader::{ContractReader, ContractState, StaticContractReader};
pub use registry::{
    CommonProperties, EventHandler, HandlerRegistry, RegistryBuilder, TableRoutes, WritePolicy,
};
pub use retry::{RetryConfig, RetryPolicy};
pub use status::Status;
pub use store::{EntityStore, Row, Write, WriteOp};
pub use value::{FieldAccess, Metadata, Value};

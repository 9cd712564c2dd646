//! Fixtures shared by the Allo integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chainproject_abi::encode_layout;
use chainproject_core::{Entity, EntityStore, Event, Layout, Metadata, Origin, ProjectionEngine, StaticContractReader, Value};
use chainproject_storage::InMemoryStore;

pub const CHAIN: u64 = 10;
pub const ALLO: &str = "0x1133ea7af70876e64665ecd07c0a0476d09465a1";
pub const RFP_STRATEGY: &str = "0x00000000000000000000000000000000000000aa";
pub const RFP_POOL_ID: u64 = 7;
pub const LTIP_STRATEGY: &str = "0x00000000000000000000000000000000000000bb";
pub const LTIP_POOL_ID: u64 = 8;
pub const MERKLE_STRATEGY: &str = "0x00000000000000000000000000000000000000cc";
pub const MERKLE_POOL_ID: u64 = 9;

pub fn addr(n: u8) -> String {
    format!("0x{}", hex::encode([n; 20]))
}

pub fn address(n: u8) -> Value {
    Value::Address(addr(n))
}

pub fn zero() -> Value {
    address(0)
}

pub fn metadata(protocol: u64, pointer: &str) -> Value {
    Value::Metadata(Metadata::new(protocol, pointer))
}

pub fn payload(layout: &Layout, values: &[Value]) -> Value {
    Value::Bytes(encode_layout(layout, values).unwrap())
}

pub struct World {
    pub store: Arc<InMemoryStore>,
    pub reader: Arc<StaticContractReader>,
    pub engine: ProjectionEngine,
    block: std::sync::atomic::AtomicU64,
}

impl World {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let reader = Arc::new(StaticContractReader::new());
        reader.set(CHAIN, RFP_STRATEGY, "getPoolId", RFP_POOL_ID);
        reader.set(CHAIN, LTIP_STRATEGY, "getPoolId", LTIP_POOL_ID);
        reader.set(CHAIN, MERKLE_STRATEGY, "getPoolId", MERKLE_POOL_ID);
        let engine = chainproject_allo::engine_builder()
            .store(store.clone())
            .reader(reader.clone())
            .build_engine()
            .unwrap();
        Self {
            store,
            reader,
            engine,
            block: std::sync::atomic::AtomicU64::new(100),
        }
    }

    /// A new event from `contract`, one block after the previous one.
    pub fn event(&self, contract: &str, name: &str) -> Event {
        let block = self.block.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Event::new(Origin::new(CHAIN, contract, block, 0), name)
    }

    pub async fn rows<E: Entity>(&self) -> Vec<E> {
        self.store
            .rows(E::TABLE)
            .await
            .unwrap()
            .into_iter()
            .map(|row| E::from_row(row).unwrap())
            .collect()
    }

    pub async fn only<E: Entity>(&self) -> E {
        let mut rows = self.rows::<E>().await;
        assert_eq!(rows.len(), 1, "expected exactly one {} row", E::TABLE.name);
        rows.remove(0)
    }
}

//! Side-channel reads of current on-chain contract state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::error::ProjectionError;
use crate::value::Value;

/// Reads a contract's current state (e.g. `getPoolId`, `votingThreshold`).
///
/// Failures are transient from the engine's point of view and surface as
/// `StoreUnavailable`, so the dispatcher retries the event.
#[async_trait]
pub trait ContractReader: Send + Sync {
    async fn read_field(
        &self,
        chain_id: u64,
        contract: &str,
        field: &str,
    ) -> Result<Value, ProjectionError>;
}

/// Snapshot of one contract's readable fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractState {
    pub chain_id: u64,
    pub address: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

/// A reader over a fixed (but mutable) set of contract values.
#[derive(Default)]
pub struct StaticContractReader {
    values: RwLock<HashMap<(u64, String), HashMap<String, Value>>>,
}

impl StaticContractReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(states: Vec<ContractState>) -> Self {
        let reader = Self::new();
        for state in states {
            for (field, value) in state.fields {
                reader.set(state.chain_id, &state.address, field, value);
            }
        }
        reader
    }

    /// Set (or overwrite) a field's current value.
    pub fn set(&self, chain_id: u64, contract: &str, field: impl Into<String>, value: impl Into<Value>) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values
            .entry((chain_id, contract.to_lowercase()))
            .or_default()
            .insert(field.into(), value.into());
    }
}

#[async_trait]
impl ContractReader for StaticContractReader {
    async fn read_field(
        &self,
        chain_id: u64,
        contract: &str,
        field: &str,
    ) -> Result<Value, ProjectionError> {
        let values = self
            .values
            .read()
            .map_err(|_| ProjectionError::StoreUnavailable("contract reader lock poisoned".into()))?;
        values
            .get(&(chain_id, contract.to_lowercase()))
            .and_then(|fields| fields.get(field))
            .cloned()
            .ok_or_else(|| {
                ProjectionError::StoreUnavailable(format!(
                    "no value for '{field}' on {chain_id}:{contract}"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_latest_value() {
        let reader = StaticContractReader::new();
        reader.set(1, "0xPOOL", "votingThreshold", 10u64);
        assert_eq!(reader.read_field(1, "0xpool", "votingThreshold").await.unwrap(), Value::Uint(10));

        reader.set(1, "0xpool", "votingThreshold", 20u64);
        assert_eq!(reader.read_field(1, "0xPool", "votingThreshold").await.unwrap(), Value::Uint(20));
    }

    #[tokio::test]
    async fn missing_values_are_transient() {
        let reader = StaticContractReader::from_snapshot(vec![ContractState {
            chain_id: 1,
            address: "0xpool".into(),
            fields: BTreeMap::from([("getPoolId".to_string(), Value::Uint(7))]),
        }]);
        assert_eq!(reader.read_field(1, "0xpool", "getPoolId").await.unwrap(), Value::Uint(7));
        let err = reader.read_field(2, "0xpool", "getPoolId").await.unwrap_err();
        assert!(err.is_retryable());
    }
}

//! The upstream event record and its ordering keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ProjectionError;
use crate::value::{FieldAccess, Value};

// ─── Origin ───────────────────────────────────────────────────────────────────

/// Where an event was emitted and its position in the emitting contract's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    pub chain_id: u64,
    /// Emitting contract address (`0x…`).
    pub contract_address: String,
    pub block_number: u64,
    pub log_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl Origin {
    pub fn new(chain_id: u64, contract_address: impl Into<String>, block_number: u64, log_index: u32) -> Self {
        Self {
            chain_id,
            contract_address: contract_address.into(),
            block_number,
            log_index,
            tx_hash: None,
        }
    }

    pub fn position(&self) -> Position {
        Position {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }
}

/// Ordering position of an event within its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub block_number: u64,
    pub log_index: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

// ─── PartitionKey ─────────────────────────────────────────────────────────────

/// Events sharing a partition key are applied strictly in arrival order.
///
/// A pool strategy contract hosts exactly one pool, so `(chain, contract)`
/// is the configuration key for every strategy event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKey {
    pub chain_id: u64,
    /// Lowercased contract address.
    pub contract: String,
}

impl PartitionKey {
    pub fn new(chain_id: u64, contract: &str) -> Self {
        Self {
            chain_id,
            contract: contract.to_lowercase(),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.contract)
    }
}

// ─── EventName ────────────────────────────────────────────────────────────────

/// A parsed `<namespace>.<ContractType>.<EventType>` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventName<'a> {
    pub namespace: &'a str,
    pub contract_type: &'a str,
    pub event_type: &'a str,
}

impl<'a> EventName<'a> {
    pub fn parse(name: &'a str) -> Result<Self, ProjectionError> {
        let mut parts = name.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(ns), Some(ct), Some(et), None)
                if !ns.is_empty() && !ct.is_empty() && !et.is_empty() =>
            {
                Ok(Self {
                    namespace: ns,
                    contract_type: ct,
                    event_type: et,
                })
            }
            _ => Err(ProjectionError::InvalidEvent {
                event: name.to_string(),
                reason: "name must be <namespace>.<ContractType>.<EventType>".into(),
            }),
        }
    }
}

// ─── Event ────────────────────────────────────────────────────────────────────

/// An immutable, already-decoded contract event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub origin: Origin,
    /// Dispatch key, e.g. `"allov2.RFPSimpleStrategy.Registered"`.
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

impl Event {
    pub fn new(origin: Origin, name: impl Into<String>) -> Self {
        Self {
            origin,
            name: name.into(),
            data: BTreeMap::new(),
        }
    }

    /// Add a top-level field.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(field.into(), value.into());
        self
    }

    pub fn position(&self) -> Position {
        self.origin.position()
    }

    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.origin.chain_id, &self.origin.contract_address)
    }

    pub fn parsed_name(&self) -> Result<EventName<'_>, ProjectionError> {
        EventName::parse(&self.name)
    }

    /// The opaque ABI payload carried in `field`.
    pub fn payload(&self, field: &str) -> Result<&[u8], ProjectionError> {
        self.bytes(field)
    }

    /// Lowercased emitting contract address.
    pub fn contract(&self) -> String {
        self.origin.contract_address.to_lowercase()
    }
}

impl FieldAccess for Event {
    fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_parsing() {
        let n = EventName::parse("allov2.RFPSimpleStrategy.Registered").unwrap();
        assert_eq!(n.namespace, "allov2");
        assert_eq!(n.contract_type, "RFPSimpleStrategy");
        assert_eq!(n.event_type, "Registered");

        assert!(EventName::parse("allov2.Registered").is_err());
        assert!(EventName::parse("a.b.c.d").is_err());
        assert!(EventName::parse("a..c").is_err());
    }

    #[test]
    fn partition_key_ignores_address_case() {
        let a = Event::new(Origin::new(10, "0xABC", 1, 0), "x.y.z");
        let b = Event::new(Origin::new(10, "0xabc", 2, 5), "x.y.z");
        assert_eq!(a.partition_key(), b.partition_key());
        assert_eq!(a.partition_key().to_string(), "10:0xabc");
    }

    #[test]
    fn positions_order_by_block_then_log() {
        let p1 = Position { block_number: 5, log_index: 9 };
        let p2 = Position { block_number: 6, log_index: 0 };
        let p3 = Position { block_number: 6, log_index: 1 };
        assert!(p1 < p2 && p2 < p3);
    }

    #[test]
    fn feed_json_shape() {
        let json = r#"{
            "origin": {"chainId": 1, "contractAddress": "0xPool", "blockNumber": 7, "logIndex": 2},
            "name": "allov2.Allo.RoleGranted",
            "data": {
                "role": {"type": "string", "value": "admin"},
                "account": {"type": "address", "value": "0xA1"}
            }
        }"#;
        let ev: Event = serde_json::from_str(json).unwrap();
        assert_eq!(ev.origin.chain_id, 1);
        assert_eq!(ev.position(), Position { block_number: 7, log_index: 2 });
        assert_eq!(ev.identifier("role").unwrap(), "admin");
        assert_eq!(ev.address("account").unwrap(), "0xa1");
    }
}

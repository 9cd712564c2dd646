//! Typed field values carried by events and produced by the schema resolver.

use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;
use crate::serde_util::{hex_bytes, i128_string, u128_string};

/// A typed value: either a top-level event field or a decoded payload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// Unsigned integer up to 128 bits.
    Uint(#[serde(with = "u128_string")] u128),
    /// Unsigned integer wider than 128 bits (decimal string).
    BigUint(String),
    Int(#[serde(with = "i128_string")] i128),
    BigInt(String),
    Bool(bool),
    /// EVM address, lowercase `0x`-prefixed hex.
    Address(String),
    #[serde(rename = "string")]
    Str(String),
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    /// A lifted `(protocol, pointer)` metadata tuple.
    Metadata(Metadata),
    Null,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Uint(_) => "uint",
            Value::BigUint(_) => "biguint",
            Value::Int(_) => "int",
            Value::BigInt(_) => "bigint",
            Value::Bool(_) => "bool",
            Value::Address(_) => "address",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Tuple(_) => "tuple",
            Value::Metadata(_) => "metadata",
            Value::Null => "null",
        }
    }

    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Address(s) => Some(s),
            _ => None,
        }
    }

    /// Render scalar values as a canonical identifier string.
    ///
    /// Addresses are lowercased and byte strings are `0x`-hex, so the same
    /// on-chain identity always yields the same key component.
    pub fn to_identifier(&self) -> Option<String> {
        match self {
            Value::Address(a) => Some(a.to_lowercase()),
            Value::Str(s) => Some(s.clone()),
            Value::Bytes(b) => Some(format!("0x{}", hex::encode(b))),
            Value::Uint(v) => Some(v.to_string()),
            Value::BigUint(s) | Value::BigInt(s) => Some(s.clone()),
            Value::Int(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v as u128)
    }
}

impl From<u128> for Value {
    fn from(v: u128) -> Self {
        Value::Uint(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

/// Off-chain metadata reference attached to pools and registrations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub protocol: u64,
    pub pointer: String,
}

impl Metadata {
    pub fn new(protocol: u64, pointer: impl Into<String>) -> Self {
        Self {
            protocol,
            pointer: pointer.into(),
        }
    }
}

/// Typed, name-based access to a set of fields.
///
/// Implemented by event data and by resolved payloads, so handlers read both
/// through the same accessors and get the same `InvalidField` errors.
pub trait FieldAccess {
    fn field(&self, name: &str) -> Option<&Value>;

    fn require(&self, name: &str) -> Result<&Value, ProjectionError> {
        self.field(name)
            .ok_or_else(|| ProjectionError::field(name, "missing"))
    }

    fn uint(&self, name: &str) -> Result<u128, ProjectionError> {
        match self.require(name)? {
            Value::Uint(v) => Ok(*v),
            Value::BigUint(_) => Err(ProjectionError::field(name, "exceeds 128 bits")),
            other => Err(type_error(name, "uint", other)),
        }
    }

    fn u64(&self, name: &str) -> Result<u64, ProjectionError> {
        let v = self.uint(name)?;
        u64::try_from(v).map_err(|_| ProjectionError::field(name, format!("{v} exceeds u64")))
    }

    fn boolean(&self, name: &str) -> Result<bool, ProjectionError> {
        match self.require(name)? {
            Value::Bool(b) => Ok(*b),
            other => Err(type_error(name, "bool", other)),
        }
    }

    /// An address, lowercased.
    fn address(&self, name: &str) -> Result<String, ProjectionError> {
        match self.require(name)? {
            Value::Address(a) => Ok(a.to_lowercase()),
            other => Err(type_error(name, "address", other)),
        }
    }

    fn string(&self, name: &str) -> Result<String, ProjectionError> {
        match self.require(name)? {
            Value::Str(s) => Ok(s.clone()),
            other => Err(type_error(name, "string", other)),
        }
    }

    fn bytes(&self, name: &str) -> Result<&[u8], ProjectionError> {
        match self.require(name)? {
            Value::Bytes(b) => Ok(b),
            other => Err(type_error(name, "bytes", other)),
        }
    }

    fn metadata(&self, name: &str) -> Result<Metadata, ProjectionError> {
        match self.require(name)? {
            Value::Metadata(m) => Ok(m.clone()),
            other => Err(type_error(name, "metadata", other)),
        }
    }

    fn addresses(&self, name: &str) -> Result<Vec<String>, ProjectionError> {
        match self.require(name)? {
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::Address(a) => Ok(a.to_lowercase()),
                    other => Err(type_error(name, "address[]", other)),
                })
                .collect(),
            other => Err(type_error(name, "address[]", other)),
        }
    }

    /// Any scalar rendered as a key component (see [`Value::to_identifier`]).
    fn identifier(&self, name: &str) -> Result<String, ProjectionError> {
        let v = self.require(name)?;
        v.to_identifier()
            .ok_or_else(|| type_error(name, "identifier", v))
    }
}

fn type_error(name: &str, expected: &str, got: &Value) -> ProjectionError {
    ProjectionError::field(name, format!("expected {expected}, got {}", got.type_name()))
}

impl FieldAccess for std::collections::BTreeMap<String, Value> {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

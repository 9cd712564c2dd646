//! Payload layouts and the schema resolver.
//!
//! Some events carry an opaque ABI payload whose tuple shape depends on a
//! value already known when the event arrives (a pool's `useRegistryAnchor`
//! flag, a strategy sub-type). A [`Selector`] maps that value to exactly one
//! static [`Layout`]; the [`SchemaResolver`] hands the layout to the
//! fixed-schema [`PayloadDecoder`] and reshapes the result into named
//! [`TypedFields`].
//!
//! Resolution is pure: no I/O, no access to stores or side-channels.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::error::ProjectionError;
use crate::value::{FieldAccess, Metadata, Value};

// ─── ABI type tags ────────────────────────────────────────────────────────────

/// Type tags understood by the fixed-schema decoder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AbiType {
    Uint(u16),
    Int(u16),
    Bool,
    Address,
    String,
    Bytes,
    FixedBytes(u8),
    Array(Box<AbiType>),
    Tuple(Vec<AbiType>),
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiType::Uint(bits) => write!(f, "uint{bits}"),
            AbiType::Int(bits) => write!(f, "int{bits}"),
            AbiType::Bool => f.write_str("bool"),
            AbiType::Address => f.write_str("address"),
            AbiType::String => f.write_str("string"),
            AbiType::Bytes => f.write_str("bytes"),
            AbiType::FixedBytes(n) => write!(f, "bytes{n}"),
            AbiType::Array(inner) => write!(f, "{inner}[]"),
            AbiType::Tuple(items) => {
                f.write_str("(")?;
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{t}")?;
                }
                f.write_str(")")
            }
        }
    }
}

// ─── Layouts ──────────────────────────────────────────────────────────────────

/// Declared type of a named layout field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Uint(u16),
    Bool,
    Address,
    String,
    Bytes,
    FixedBytes(u8),
    Array(&'static FieldType),
    /// `(uint256 protocol, string pointer)`, lifted to [`Value::Metadata`].
    Metadata,
    /// A nested tuple whose fields are flattened into the parent record.
    Struct(&'static [FieldSpec]),
}

impl FieldType {
    pub fn abi_type(&self) -> AbiType {
        match self {
            FieldType::Uint(bits) => AbiType::Uint(*bits),
            FieldType::Bool => AbiType::Bool,
            FieldType::Address => AbiType::Address,
            FieldType::String => AbiType::String,
            FieldType::Bytes => AbiType::Bytes,
            FieldType::FixedBytes(n) => AbiType::FixedBytes(*n),
            FieldType::Array(inner) => AbiType::Array(Box::new(inner.abi_type())),
            FieldType::Metadata => AbiType::Tuple(vec![AbiType::Uint(256), AbiType::String]),
            FieldType::Struct(fields) => {
                AbiType::Tuple(fields.iter().map(|f| f.ty.abi_type()).collect())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
}

impl FieldSpec {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty }
    }
}

/// A named, ordered tuple layout.
#[derive(Debug, PartialEq, Eq)]
pub struct Layout {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl Layout {
    /// Top-level parameter types, in order.
    pub fn abi_types(&self) -> Vec<AbiType> {
        self.fields.iter().map(|f| f.ty.abi_type()).collect()
    }

    /// Canonical signature, e.g. `(address,uint256,(uint256,string))`.
    pub fn signature(&self) -> String {
        AbiType::Tuple(self.abi_types()).to_string()
    }
}

/// Maps an already-decoded selector value to its payload layout.
///
/// Implementations use an exhaustive `match`, so every selector value has
/// exactly one layout.
pub trait Selector: Copy + fmt::Debug {
    fn layout(self) -> &'static Layout;
}

// ─── Decoder seam ─────────────────────────────────────────────────────────────

/// The payload could not be parsed as the requested types.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DecodeFailure(pub String);

/// Fixed-schema ABI decoder: bytes + ordered type tags → ordered values.
pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, payload: &[u8], types: &[AbiType]) -> Result<Vec<Value>, DecodeFailure>;
}

// ─── TypedFields ──────────────────────────────────────────────────────────────

/// Named payload fields in layout order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypedFields(IndexMap<String, Value>);

impl TypedFields {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.0
    }
}

impl FieldAccess for TypedFields {
    fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

// ─── SchemaResolver ───────────────────────────────────────────────────────────

/// Selects a layout and decodes a payload against it.
#[derive(Clone)]
pub struct SchemaResolver {
    decoder: Arc<dyn PayloadDecoder>,
}

impl SchemaResolver {
    pub fn new(decoder: Arc<dyn PayloadDecoder>) -> Self {
        Self { decoder }
    }

    /// Decode `payload` with the layout chosen by `selector`.
    pub fn resolve<S: Selector>(&self, selector: S, payload: &[u8]) -> Result<TypedFields, ProjectionError> {
        let layout = selector.layout();
        tracing::trace!(?selector, layout = layout.name, "resolving payload");
        self.decode(layout, payload)
    }

    /// Decode `payload` with a fixed layout.
    pub fn decode(&self, layout: &Layout, payload: &[u8]) -> Result<TypedFields, ProjectionError> {
        let mismatch = |reason: String| ProjectionError::SchemaMismatch {
            layout: layout.name.to_string(),
            reason,
        };

        let values = self
            .decoder
            .decode(payload, &layout.abi_types())
            .map_err(|e| mismatch(e.0))?;
        if values.len() != layout.fields.len() {
            return Err(mismatch(format!(
                "decoder returned {} values for {} fields",
                values.len(),
                layout.fields.len()
            )));
        }

        let mut out = IndexMap::with_capacity(layout.fields.len());
        flatten(layout.fields, values, &mut out).map_err(mismatch)?;
        Ok(TypedFields(out))
    }
}

fn flatten(
    specs: &[FieldSpec],
    values: Vec<Value>,
    out: &mut IndexMap<String, Value>,
) -> Result<(), String> {
    for (spec, value) in specs.iter().zip(values) {
        match spec.ty {
            FieldType::Struct(inner) => match value {
                Value::Tuple(items) if items.len() == inner.len() => flatten(inner, items, out)?,
                other => {
                    return Err(format!(
                        "field '{}': expected {}-tuple, got {}",
                        spec.name,
                        inner.len(),
                        other.type_name()
                    ))
                }
            },
            ty => {
                let lifted = lift(&ty, value).map_err(|e| format!("field '{}': {e}", spec.name))?;
                if out.insert(spec.name.to_string(), lifted).is_some() {
                    return Err(format!("duplicate field name '{}'", spec.name));
                }
            }
        }
    }
    Ok(())
}

fn lift(ty: &FieldType, value: Value) -> Result<Value, String> {
    match (ty, value) {
        (FieldType::Metadata, Value::Tuple(items)) => match items.as_slice() {
            [Value::Uint(protocol), Value::Str(pointer)] => {
                let protocol = u64::try_from(*protocol)
                    .map_err(|_| format!("metadata protocol {protocol} exceeds u64"))?;
                Ok(Value::Metadata(Metadata::new(protocol, pointer.clone())))
            }
            _ => Err("metadata must be (uint256,string)".into()),
        },
        (FieldType::Array(inner), Value::Array(items)) => items
            .into_iter()
            .map(|v| lift(inner, v))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (FieldType::Struct(inner), Value::Tuple(items)) if items.len() == inner.len() => inner
            .iter()
            .zip(items)
            .map(|(s, v)| lift(&s.ty, v))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Tuple),
        (FieldType::Metadata | FieldType::Array(_) | FieldType::Struct(_), other) => {
            Err(format!("unexpected {} value", other.type_name()))
        }
        (_, scalar) => Ok(scalar),
    }
}

//! Entity tables, unique keys and key predicates.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProjectionError;
use crate::store::Row;

/// Static description of a live table.
#[derive(Debug, PartialEq, Eq)]
pub struct TableDef {
    /// Table name, e.g. `"RFPPool"`.
    pub name: &'static str,
    /// Row fields forming the unique key, in key order.
    pub unique_by: &'static [&'static str],
    /// Configuration table whose row must exist before a row of this table
    /// can be written. The owner's unique key is read from this table's row.
    pub owner: Option<&'static TableDef>,
}

impl TableDef {
    /// Unique key of `row`.
    pub fn key_of(&self, row: &Row) -> Result<EntityKey, ProjectionError> {
        EntityKey::from_fields(self.name, self.unique_by, row)
    }

    /// Key of the owning configuration row referenced by `row`, if any.
    pub fn owner_key(&self, row: &Row) -> Result<Option<(&'static TableDef, EntityKey)>, ProjectionError> {
        match self.owner {
            Some(owner) => Ok(Some((owner, EntityKey::from_fields(owner.name, owner.unique_by, row)?))),
            None => Ok(None),
        }
    }
}

impl fmt::Display for TableDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A typed row of a live table.
///
/// Rows serialize to JSON objects with camelCase field names; the unique key
/// fields listed in [`TableDef::unique_by`] must be present and scalar.
pub trait Entity: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {
    const TABLE: &'static TableDef;

    fn to_row(&self) -> Result<Row, ProjectionError> {
        Ok(serde_json::to_value(self)?)
    }

    fn from_row(row: Row) -> Result<Self, ProjectionError> {
        Ok(serde_json::from_value(row)?)
    }

    fn key(&self) -> Result<EntityKey, ProjectionError> {
        Self::TABLE.key_of(&self.to_row()?)
    }
}

// ─── EntityKey ────────────────────────────────────────────────────────────────

/// Canonical rendering of a row's unique key: `chainId=1|poolId=7`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    fn from_fields(table: &str, fields: &[&str], row: &Row) -> Result<Self, ProjectionError> {
        let mut parts = Vec::with_capacity(fields.len());
        for field in fields {
            let rendered = row
                .get(*field)
                .and_then(render_scalar)
                .ok_or_else(|| ProjectionError::field(field, format!("key field missing on {table} row")))?;
            parts.push(format!("{field}={rendered}"));
        }
        Ok(Self(parts.join("|")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn render_scalar(v: &Row) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ─── KeyPredicate ─────────────────────────────────────────────────────────────

/// Field-equality predicate over a table's key fields.
///
/// A predicate naming every unique-key field resolves to a point lookup;
/// a narrower one is matched row by row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPredicate {
    fields: Vec<(String, String)>,
}

impl KeyPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl fmt::Display) -> Self {
        self.fields.push((field.into(), value.to_string()));
        self
    }

    /// Predicate over `table`'s unique key fields of `row`.
    pub fn for_row(table: &TableDef, row: &Row) -> Result<Self, ProjectionError> {
        let mut p = Self::new();
        for field in table.unique_by {
            let rendered = row
                .get(*field)
                .and_then(render_scalar)
                .ok_or_else(|| ProjectionError::field(field, format!("key field missing on {} row", table.name)))?;
            p.fields.push((field.to_string(), rendered));
        }
        Ok(p)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.as_str())
    }

    /// Point-lookup key when the predicate covers the whole unique key.
    pub fn exact_key(&self, table: &TableDef) -> Option<EntityKey> {
        let mut parts = Vec::with_capacity(table.unique_by.len());
        for field in table.unique_by {
            parts.push(format!("{field}={}", self.get(field)?));
        }
        Some(EntityKey(parts.join("|")))
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.fields.iter().all(|(field, expected)| {
            row.get(field.as_str())
                .and_then(render_scalar)
                .is_some_and(|actual| &actual == expected)
        })
    }
}

impl fmt::Display for KeyPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&rendered.join("|"))
    }
}

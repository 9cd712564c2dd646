//! `RoleAccount`: accounts holding an Allo or Registry role.
//!
//! Revocation is a soft delete: the row stays and `isActive` flips to false.

use serde::{Deserialize, Serialize};

use chainproject_core::{Entity, Event, FieldAccess, ProjectionError, TableDef, TableRoutes, WritePolicy};

pub const ROLE_ACCOUNT: TableDef = TableDef {
    name: "RoleAccount",
    unique_by: &["roleId", "accountId", "chainId"],
    owner: None,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAccount {
    pub role_id: String,
    pub account_id: String,
    pub chain_id: u64,
    pub is_active: bool,
}

impl Entity for RoleAccount {
    const TABLE: &'static TableDef = &ROLE_ACCOUNT;
}

/// Contracts whose role events feed this table.
const SOURCES: [&str; 2] = ["Allo", "Registry"];

pub fn routes() -> TableRoutes<RoleAccount> {
    let mut routes = TableRoutes::keyed_by(|row: &mut RoleAccount, ev: &Event| {
        row.chain_id = ev.origin.chain_id;
        row.role_id = ev.identifier("role")?;
        row.account_id = ev.address("account")?;
        Ok(())
    });
    for source in SOURCES {
        routes = routes
            .on_fn(event(source, "RoleGranted"), WritePolicy::GetOrCreate, grant)
            .on_fn(event(source, "RoleRevoked"), WritePolicy::GetOrCreate, revoke);
    }
    routes
}

fn event(contract: &str, name: &str) -> String {
    format!("{}.{contract}.{name}", crate::NAMESPACE)
}

fn grant(row: &mut RoleAccount, _: &Event) -> Result<(), ProjectionError> {
    row.is_active = true;
    Ok(())
}

fn revoke(row: &mut RoleAccount, _: &Event) -> Result<(), ProjectionError> {
    row.is_active = false;
    Ok(())
}

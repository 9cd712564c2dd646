//! chainproject-allo: Allo v2 live tables for ChainProject.
//!
//! Tables:
//! - [`role_account`]: `RoleAccount`, fed by Allo and Registry role events
//! - [`ltip`]: `LTIPHedgeyGovernor` pools and `LTIPRecipient` participants
//! - [`rfp`]: `RFPPool` (simple and committee strategies) and `RFPRecipient`
//! - [`merkle`]: donation-voting Merkle distribution pools and recipients
//!
//! Strategy tables key their rows by the strategy's `getPoolId`, read
//! through the engine's contract reader.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let store = Arc::new(InMemoryStore::new());
//! let engine = chainproject_allo::engine_builder()
//!     .store(store.clone())
//!     .reader(Arc::new(reader))
//!     .build_engine()?;
//! engine.apply(&event).await?;
//! ```

use std::sync::Arc;

use chainproject_abi::AbiDecoder;
use chainproject_core::{EngineBuilder, HandlerRegistry};

pub mod common;
pub mod layouts;
pub mod ltip;
pub mod merkle;
pub mod rfp;
pub mod role_account;

pub use ltip::{LtipHedgeyGovernor, LtipRecipient};
pub use merkle::{MerklePool, MerkleRecipient};
pub use rfp::{RfpPool, RfpRecipient};
pub use role_account::RoleAccount;

/// Event namespace of every Allo v2 route.
pub const NAMESPACE: &str = "allov2";

/// Every Allo v2 route. For events routed to several tables, routes run in
/// the order the tables are listed here.
pub fn registry() -> HandlerRegistry {
    HandlerRegistry::builder()
        .table(role_account::routes())
        .table(ltip::governor_routes())
        .table(ltip::recipient_routes())
        .table(rfp::pool_routes())
        .table(rfp::recipient_routes())
        .table(merkle::pool_routes())
        .declare(&merkle::MERKLE_RECIPIENT)
        .build()
}

/// An [`EngineBuilder`] with the Allo registry and the ABI payload decoder.
pub fn engine_builder() -> EngineBuilder {
    EngineBuilder::new()
        .id("allo-live")
        .registry(registry())
        .decoder(Arc::new(AbiDecoder::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_lives_in_the_namespace() {
        let registry = registry();
        let names = registry.event_names();
        assert!(!names.is_empty());
        for name in names {
            let parsed = chainproject_core::EventName::parse(name).unwrap();
            assert_eq!(parsed.namespace, NAMESPACE, "{name}");
        }
    }

    #[test]
    fn tables_in_declaration_order() {
        let registry = registry();
        let tables: Vec<_> = registry.tables().iter().map(|t| t.name).collect();
        assert_eq!(
            tables,
            [
                "RoleAccount",
                "LTIPHedgeyGovernor",
                "LTIPRecipient",
                "RFPPool",
                "RFPRecipient",
                "DonationVotingMerklePool",
                "DonationVotingMerkleRecipient",
            ]
        );
    }

    #[test]
    fn role_events_from_both_sources() {
        let registry = registry();
        for name in [
            "allov2.Allo.RoleGranted",
            "allov2.Allo.RoleRevoked",
            "allov2.Registry.RoleGranted",
            "allov2.Registry.RoleRevoked",
        ] {
            assert_eq!(registry.tables_for(name), vec![&role_account::ROLE_ACCOUNT], "{name}");
        }
    }
}

//! RFP pools (simple and committee strategies) and their recipients.
//!
//! The pool row is the configuration: it is created by `Initialized` and
//! later updated field by field. Registrations are decoded with the layout
//! selected by the pool's `useRegistryAnchor` flag and upsert the recipient
//! through the linker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chainproject_core::serde_util::u128_string;
use chainproject_core::{
    ApplyContext, Configuration, Entity, Event, EventHandler, FieldAccess, Link, Metadata, Participant,
    PoolScope, ProjectionError, Status, TableDef, TableRoutes, WritePolicy,
};

use crate::common::{self, RecipientRow, StrategyPoolKey, StrategyRecipientKey, StrategyRow};
use crate::layouts::{Anchoring, RfpInit, RfpRegistration};

pub const RFP_POOL: TableDef = TableDef {
    name: "RFPPool",
    unique_by: &["chainId", "poolId"],
    owner: None,
};

pub const RFP_RECIPIENT: TableDef = TableDef {
    name: "RFPRecipient",
    unique_by: &["chainId", "poolId", "recipientId"],
    owner: Some(&RFP_POOL),
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfpPool {
    pub chain_id: u64,
    pub pool_id: String,
    pub strategy: String,
    /// Committee strategies accept a recipient by vote.
    pub committee: bool,
    #[serde(with = "u128_string")]
    pub vote_threshold: u128,
    #[serde(with = "u128_string")]
    pub max_bid: u128,
    pub use_registry_anchor: bool,
    pub metadata_required: bool,
    pub active: bool,
}

impl Entity for RfpPool {
    const TABLE: &'static TableDef = &RFP_POOL;
}

impl Configuration for RfpPool {
    fn scope(&self) -> PoolScope {
        PoolScope::new(self.chain_id, &self.pool_id)
    }
}

impl StrategyRow for RfpPool {
    fn set_strategy_key(&mut self, scope: PoolScope, strategy: String) {
        self.chain_id = scope.chain_id;
        self.pool_id = scope.pool_id;
        self.strategy = strategy;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfpRecipient {
    pub chain_id: u64,
    pub pool_id: String,
    pub recipient_id: String,
    pub strategy: String,
    pub recipient_address: Option<String>,
    pub is_using_registry_anchor: bool,
    #[serde(with = "u128_string")]
    pub proposal_bid: u128,
    pub metadata: Metadata,
    pub status: Status,
    pub sender: Option<String>,
}

impl Entity for RfpRecipient {
    const TABLE: &'static TableDef = &RFP_RECIPIENT;
}

impl Participant for RfpRecipient {
    const DISCRIMINATOR: &'static str = "recipientId";

    fn blank(scope: &PoolScope, id: &str) -> Self {
        Self {
            chain_id: scope.chain_id,
            pool_id: scope.pool_id.clone(),
            recipient_id: id.to_string(),
            ..Default::default()
        }
    }
}

impl StrategyRow for RfpRecipient {
    fn set_strategy_key(&mut self, scope: PoolScope, strategy: String) {
        self.chain_id = scope.chain_id;
        self.pool_id = scope.pool_id;
        self.strategy = strategy;
    }
}

impl RecipientRow for RfpRecipient {
    fn set_recipient_id(&mut self, recipient_id: String) {
        self.recipient_id = recipient_id;
    }
}

const CONTRACTS: [&str; 2] = [RfpInit::SIMPLE_CONTRACT, RfpInit::COMMITTEE_CONTRACT];

fn event(contract: &str, name: &str) -> String {
    format!("{}.{contract}.{name}", crate::NAMESPACE)
}

pub fn pool_routes() -> TableRoutes<RfpPool> {
    let mut routes = TableRoutes::new(StrategyPoolKey);
    for contract in CONTRACTS {
        routes = routes
            .on(event(contract, "Initialized"), WritePolicy::CreateOnce, Initialized)
            .on(event(contract, "Registered"), WritePolicy::UpdateOnly, Registered)
            .on_fn(event(contract, "MaxBidIncreased"), WritePolicy::UpdateOnly, |pool, ev| {
                pool.max_bid = ev.uint("maxBid")?;
                Ok(())
            })
            .on_fn(event(contract, "PoolActive"), WritePolicy::UpdateOnly, |pool, ev| {
                pool.active = ev.boolean("active")?;
                Ok(())
            });
    }
    routes
}

pub fn recipient_routes() -> TableRoutes<RfpRecipient> {
    let mut routes = TableRoutes::<RfpRecipient>::new(StrategyRecipientKey);
    for contract in CONTRACTS {
        routes = routes.on_fn(event(contract, "Allocated"), WritePolicy::UpdateIfExists, |r, _| {
            r.status = Status::Accepted;
            Ok(())
        });
    }
    routes
}

/// Decodes the strategy's init params; the layout follows the contract type.
struct Initialized;

#[async_trait]
impl EventHandler<RfpPool> for Initialized {
    async fn handle(&self, pool: &mut RfpPool, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        let event: &Event = ctx.event();
        let name = event.parsed_name()?;
        let flavour = RfpInit::from_contract_type(name.contract_type).ok_or_else(|| ProjectionError::InvalidEvent {
            event: event.name.clone(),
            reason: format!("'{}' is not an RFP strategy", name.contract_type),
        })?;

        let fields = ctx.resolver().resolve(flavour, event.payload("data")?)?;
        pool.committee = flavour == RfpInit::Committee;
        if pool.committee {
            pool.vote_threshold = fields.uint("voteThreshold")?;
        }
        pool.max_bid = fields.uint("maxBid")?;
        pool.use_registry_anchor = fields.boolean("useRegistryAnchor")?;
        pool.metadata_required = fields.boolean("metadataRequired")?;
        Ok(())
    }
}

/// Upserts the registering recipient.
struct Registered;

#[async_trait]
impl EventHandler<RfpPool> for Registered {
    async fn handle(&self, pool: &mut RfpPool, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        let event = ctx.event();
        let anchoring = Anchoring::from_flag(pool.use_registry_anchor);
        let fields = ctx
            .resolver()
            .resolve(RfpRegistration(anchoring), event.payload("data")?)?;

        let (recipient_address, is_using_registry_anchor) = match anchoring {
            Anchoring::RegistryAnchor => (None, true),
            Anchoring::Open => (
                Some(fields.address("recipientAddress")?),
                common::names_anchor(&fields)?,
            ),
        };
        let proposal_bid = fields.uint("proposalBid")?;
        let metadata = fields.metadata("metadata")?;
        let recipient_id = event.address("recipientId")?;
        let sender = common::sender(ctx);
        let strategy = pool.strategy.clone();

        ctx.linker()
            .modify::<RfpRecipient, _>(&pool.scope(), &recipient_id, Link::CreateOnDemand, move |r| {
                r.strategy = strategy;
                if recipient_address.is_some() {
                    r.recipient_address = recipient_address;
                }
                r.is_using_registry_anchor = is_using_registry_anchor;
                r.proposal_bid = proposal_bid;
                r.metadata = metadata;
                r.status = Status::Pending;
                if sender.is_some() {
                    r.sender = sender;
                }
            })
            .await?;
        Ok(())
    }
}

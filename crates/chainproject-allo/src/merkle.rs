//! Donation Voting Merkle Distribution pools and their recipients.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chainproject_core::{
    ApplyContext, Configuration, Entity, EventHandler, FieldAccess, Link, Metadata, Participant, PoolScope,
    ProjectionError, Status, TableDef, TableRoutes, WritePolicy,
};

use crate::common::{self, StrategyPoolKey, StrategyRow};
use crate::layouts::{Anchoring, MerkleRegistration, MERKLE_INIT};

pub const MERKLE_POOL: TableDef = TableDef {
    name: "DonationVotingMerklePool",
    unique_by: &["chainId", "poolId"],
    owner: None,
};

pub const MERKLE_RECIPIENT: TableDef = TableDef {
    name: "DonationVotingMerkleRecipient",
    unique_by: &["chainId", "poolId", "recipientId"],
    owner: Some(&MERKLE_POOL),
};

const CONTRACT: &str = "DonationVotingMerkleDistributionDirectTransferStrategy";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerklePool {
    pub chain_id: u64,
    pub pool_id: String,
    pub strategy: String,
    pub use_registry_anchor: bool,
    pub metadata_required: bool,
    pub registration_start_time: u64,
    pub registration_end_time: u64,
    pub allocation_start_time: u64,
    pub allocation_end_time: u64,
    pub allowed_tokens: Vec<String>,
}

impl Entity for MerklePool {
    const TABLE: &'static TableDef = &MERKLE_POOL;
}

impl Configuration for MerklePool {
    fn scope(&self) -> PoolScope {
        PoolScope::new(self.chain_id, &self.pool_id)
    }
}

impl StrategyRow for MerklePool {
    fn set_strategy_key(&mut self, scope: PoolScope, strategy: String) {
        self.chain_id = scope.chain_id;
        self.pool_id = scope.pool_id;
        self.strategy = strategy;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleRecipient {
    pub chain_id: u64,
    pub pool_id: String,
    pub recipient_id: String,
    pub recipient_address: String,
    pub is_using_registry_anchor: bool,
    pub metadata: Metadata,
    pub status: Status,
    pub sender: Option<String>,
}

impl Entity for MerkleRecipient {
    const TABLE: &'static TableDef = &MERKLE_RECIPIENT;
}

impl Participant for MerkleRecipient {
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

fn event(name: &str) -> String {
    format!("{}.{CONTRACT}.{name}", crate::NAMESPACE)
}

pub fn pool_routes() -> TableRoutes<MerklePool> {
    TableRoutes::new(StrategyPoolKey)
        .on(event("Initialized"), WritePolicy::CreateOnce, Initialized)
        .on_fn(event("TimestampsUpdated"), WritePolicy::UpdateOnly, |pool, ev| {
            pool.registration_start_time = ev.u64("registrationStartTime")?;
            pool.registration_end_time = ev.u64("registrationEndTime")?;
            pool.allocation_start_time = ev.u64("allocationStartTime")?;
            pool.allocation_end_time = ev.u64("allocationEndTime")?;
            Ok(())
        })
        .on(event("Registered"), WritePolicy::UpdateOnly, Registration)
        .on(event("UpdatedRegistration"), WritePolicy::UpdateOnly, Registration)
}

struct Initialized;

#[async_trait]
impl EventHandler<MerklePool> for Initialized {
    async fn handle(&self, pool: &mut MerklePool, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        let f = ctx.resolver().decode(&MERKLE_INIT, ctx.event().payload("data")?)?;
        pool.use_registry_anchor = f.boolean("useRegistryAnchor")?;
        pool.metadata_required = f.boolean("metadataRequired")?;
        pool.registration_start_time = f.u64("registrationStartTime")?;
        pool.registration_end_time = f.u64("registrationEndTime")?;
        pool.allocation_start_time = f.u64("allocationStartTime")?;
        pool.allocation_end_time = f.u64("allocationEndTime")?;
        pool.allowed_tokens = f.addresses("allowedTokens")?;
        Ok(())
    }
}

/// `Registered` / `UpdatedRegistration`: only the metadata and addresses
/// change; review status is reset to Pending.
struct Registration;

#[async_trait]
impl EventHandler<MerklePool> for Registration {
    async fn handle(&self, pool: &mut MerklePool, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        let event = ctx.event();
        let anchoring = Anchoring::from_flag(pool.use_registry_anchor);
        let fields = ctx
            .resolver()
            .resolve(MerkleRegistration(anchoring), event.payload("data")?)?;

        let is_using_registry_anchor = match anchoring {
            Anchoring::RegistryAnchor => true,
            Anchoring::Open => common::names_anchor(&fields)?,
        };
        let recipient_address = fields.address("recipientAddress")?;
        let metadata = fields.metadata("metadata")?;
        let recipient_id = event.address("recipientId")?;
        let sender = common::sender(ctx);

        ctx.linker()
            .modify::<MerkleRecipient, _>(&pool.scope(), &recipient_id, Link::CreateOnDemand, move |r| {
                r.recipient_address = recipient_address;
                r.is_using_registry_anchor = is_using_registry_anchor;
                r.metadata = metadata;
                r.status = Status::Pending;
                r.sender = sender;
            })
            .await?;
        Ok(())
    }
}

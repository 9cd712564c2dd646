//! LTIP Hedgey Governor pools and LTIP recipients.
//!
//! Registration and review events are emitted by the strategy but mutate the
//! recipient rows, so the governor routes reach them through the linker.
//! Vote revocation re-derives the recipient's status from the strategy's
//! current `votingThreshold`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chainproject_core::serde_util::u128_string;
use chainproject_core::{
    ApplyContext, Configuration, Entity, EventHandler, FieldAccess, Link, Participant, PoolScope,
    ProjectionError, Status, TableDef, TableRoutes, WritePolicy,
};

use crate::common::{self, RecipientRow, StrategyPoolKey, StrategyRecipientKey, StrategyRow};
use crate::layouts::{Anchoring, LtipRegistration, LTIP_HEDGEY_INIT};

pub const LTIP_HEDGEY_GOVERNOR: TableDef = TableDef {
    name: "LTIPHedgeyGovernor",
    unique_by: &["chainId", "poolId"],
    owner: None,
};

pub const LTIP_RECIPIENT: TableDef = TableDef {
    name: "LTIPRecipient",
    unique_by: &["chainId", "poolId", "recipientId"],
    owner: Some(&LTIP_HEDGEY_GOVERNOR),
};

/// Side-channel field read when votes are revoked.
pub const VOTING_THRESHOLD: &str = "votingThreshold";

const CONTRACT: &str = "LTIPHedgeyGovernorStrategy";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtipHedgeyGovernor {
    pub chain_id: u64,
    pub pool_id: String,
    pub strategy: String,
    pub registry_gating: bool,
    pub metadata_required: bool,
    #[serde(with = "u128_string")]
    pub voting_threshold: u128,
    pub registration_start_time: u64,
    pub registration_end_time: u64,
    pub review_start_time: u64,
    pub review_end_time: u64,
    pub allocation_start_time: u64,
    pub allocation_end_time: u64,
    pub distribution_start_time: u64,
    pub distribution_end_time: u64,
    pub vesting_period: u64,
    pub active: bool,
    pub hedgey_contract: String,
    pub vesting_admin: String,
    #[serde(rename = "adminTransferOBO")]
    pub admin_transfer_obo: bool,
    pub governor_contract: String,
    pub voting_block: u64,
}

impl Entity for LtipHedgeyGovernor {
    const TABLE: &'static TableDef = &LTIP_HEDGEY_GOVERNOR;
}

impl Configuration for LtipHedgeyGovernor {
    fn scope(&self) -> PoolScope {
        PoolScope::new(self.chain_id, &self.pool_id)
    }
}

impl StrategyRow for LtipHedgeyGovernor {
    fn set_strategy_key(&mut self, scope: PoolScope, strategy: String) {
        self.chain_id = scope.chain_id;
        self.pool_id = scope.pool_id;
        self.strategy = strategy;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtipRecipient {
    pub chain_id: u64,
    pub pool_id: String,
    pub recipient_id: String,
    pub strategy: String,
    pub recipient_address: String,
    #[serde(with = "u128_string")]
    pub allocation_amount: u128,
    pub is_using_registry_anchor: bool,
    pub status: Status,
    pub metadata_protocol: u64,
    pub metadata_pointer: String,
    pub sender: Option<String>,
    pub vesting_contract: Option<String>,
    #[serde(with = "u128_string")]
    pub token_id: u128,
    #[serde(with = "u128_string")]
    pub votes: u128,
}

impl Entity for LtipRecipient {
    const TABLE: &'static TableDef = &LTIP_RECIPIENT;
}

impl Participant for LtipRecipient {
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

impl StrategyRow for LtipRecipient {
    fn set_strategy_key(&mut self, scope: PoolScope, strategy: String) {
        self.chain_id = scope.chain_id;
        self.pool_id = scope.pool_id;
        self.strategy = strategy;
    }
}

impl RecipientRow for LtipRecipient {
    fn set_recipient_id(&mut self, recipient_id: String) {
        self.recipient_id = recipient_id;
    }
}

fn event(name: &str) -> String {
    format!("{}.{CONTRACT}.{name}", crate::NAMESPACE)
}

pub fn governor_routes() -> TableRoutes<LtipHedgeyGovernor> {
    TableRoutes::new(StrategyPoolKey)
        .on(event("Initialized"), WritePolicy::CreateOnce, Initialized)
        .on_fn(event("PoolActive"), WritePolicy::UpdateOnly, |pool, ev| {
            pool.active = ev.boolean("active")?;
            Ok(())
        })
        .on_fn(event("AllocationPeriodExtended"), WritePolicy::UpdateOnly, |pool, ev| {
            pool.allocation_end_time = ev.u64("allocationEndTime")?;
            Ok(())
        })
        .on_fn(event("AdminAddressUpdated"), WritePolicy::UpdateOnly, |pool, ev| {
            pool.vesting_admin = ev.address("adminAddress")?;
            Ok(())
        })
        .on_fn(event("AdminTransferOBOUpdated"), WritePolicy::UpdateOnly, |pool, ev| {
            pool.admin_transfer_obo = ev.boolean("adminTransferOBO")?;
            Ok(())
        })
        .on_fn(event("VotingBlockUpdated"), WritePolicy::UpdateOnly, |pool, ev| {
            pool.voting_block = ev.u64("blockNumber")?;
            Ok(())
        })
        .on(event("Registered"), WritePolicy::UpdateOnly, Registration)
        .on(event("UpdatedRegistration"), WritePolicy::UpdateOnly, Registration)
        .on(event("VestingPlanCreated"), WritePolicy::UpdateOnly, VestingPlanCreated)
        .on(event("RecipientStatusUpdated"), WritePolicy::UpdateOnly, RecipientStatusUpdated)
        .on(event("VotesRevoked"), WritePolicy::UpdateOnly, VotesRevoked)
}

pub fn recipient_routes() -> TableRoutes<LtipRecipient> {
    TableRoutes::<LtipRecipient>::new(StrategyRecipientKey)
        .on_fn(event("Allocated"), WritePolicy::GetOrCreate, |r, ev| {
            r.status = Status::Accepted;
            r.allocation_amount = ev.uint("amount")?;
            r.votes = ev.uint("votes")?;
            Ok(())
        })
        .on_fn(event("AllocationRevoked"), WritePolicy::GetOrCreate, |r, _| {
            r.status = Status::Canceled;
            Ok(())
        })
        .on_fn(event("Canceled"), WritePolicy::GetOrCreate, |r, _| {
            r.status = Status::Canceled;
            Ok(())
        })
        .on_fn(event("Distributed"), WritePolicy::GetOrCreate, |r, _| {
            r.status = Status::Rejected;
            Ok(())
        })
}

struct Initialized;

#[async_trait]
impl EventHandler<LtipHedgeyGovernor> for Initialized {
    async fn handle(&self, pool: &mut LtipHedgeyGovernor, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        let f = ctx.resolver().decode(&LTIP_HEDGEY_INIT, ctx.event().payload("data")?)?;

        pool.governor_contract = f.address("governorContract")?;
        pool.voting_block = f.u64("votingBlock")?;
        pool.hedgey_contract = f.address("hedgeyContract")?;
        pool.vesting_admin = f.address("vestingAdmin")?;
        pool.admin_transfer_obo = f.boolean("adminTransferOBO")?;
        pool.registry_gating = f.boolean("registryGating")?;
        pool.metadata_required = f.boolean("metadataRequired")?;
        pool.voting_threshold = f.uint("votingThreshold")?;
        pool.registration_start_time = f.u64("registrationStartTime")?;
        pool.registration_end_time = f.u64("registrationEndTime")?;
        pool.review_start_time = f.u64("reviewStartTime")?;
        pool.review_end_time = f.u64("reviewEndTime")?;
        pool.allocation_start_time = f.u64("allocationStartTime")?;
        pool.allocation_end_time = f.u64("allocationEndTime")?;
        pool.distribution_start_time = f.u64("distributionStartTime")?;
        pool.distribution_end_time = f.u64("distributionEndTime")?;
        pool.vesting_period = f.u64("vestingPeriod")?;
        Ok(())
    }
}

/// `Registered` / `UpdatedRegistration`: upsert the recipient as Pending.
struct Registration;

#[async_trait]
impl EventHandler<LtipHedgeyGovernor> for Registration {
    async fn handle(&self, pool: &mut LtipHedgeyGovernor, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        let event = ctx.event();
        let anchoring = Anchoring::from_flag(pool.registry_gating);
        let fields = ctx
            .resolver()
            .resolve(LtipRegistration(anchoring), event.payload("data")?)?;

        let is_using_registry_anchor = match anchoring {
            Anchoring::RegistryAnchor => true,
            Anchoring::Open => common::names_anchor(&fields)?,
        };
        let recipient_address = fields.address("recipientAddress")?;
        let allocation_amount = fields.uint("allocationAmount")?;
        let metadata = fields.metadata("metadata")?;
        let recipient_id = event.address("recipientId")?;
        let sender = common::sender(ctx);
        let strategy = pool.strategy.clone();

        ctx.linker()
            .modify::<LtipRecipient, _>(&pool.scope(), &recipient_id, Link::CreateOnDemand, move |r| {
                r.strategy = strategy;
                r.recipient_address = recipient_address;
                r.allocation_amount = allocation_amount;
                r.is_using_registry_anchor = is_using_registry_anchor;
                r.metadata_protocol = metadata.protocol;
                r.metadata_pointer = metadata.pointer;
                r.status = Status::Pending;
                r.sender = sender;
            })
            .await?;
        Ok(())
    }
}

struct VestingPlanCreated;

#[async_trait]
impl EventHandler<LtipHedgeyGovernor> for VestingPlanCreated {
    async fn handle(&self, pool: &mut LtipHedgeyGovernor, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        let event = ctx.event();
        let recipient_id = event.address("recipientId")?;
        let vesting_contract = event.address("vestingContract")?;
        let token_id = event.uint("tokenId")?;

        ctx.linker()
            .modify::<LtipRecipient, _>(&pool.scope(), &recipient_id, Link::ExistingOnly, move |r| {
                r.vesting_contract = Some(vesting_contract);
                r.token_id = token_id;
            })
            .await?;
        Ok(())
    }
}

struct RecipientStatusUpdated;

#[async_trait]
impl EventHandler<LtipHedgeyGovernor> for RecipientStatusUpdated {
    async fn handle(&self, pool: &mut LtipHedgeyGovernor, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        let event = ctx.event();
        let recipient_id = event.address("recipientId")?;
        let status = Status::from_code(event.u64("status")?)?;

        ctx.linker()
            .modify::<LtipRecipient, _>(&pool.scope(), &recipient_id, Link::ExistingOnly, |r| r.status = status)
            .await?;
        Ok(())
    }
}

struct VotesRevoked;

#[async_trait]
impl EventHandler<LtipHedgeyGovernor> for VotesRevoked {
    async fn handle(&self, pool: &mut LtipHedgeyGovernor, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        let event = ctx.event();
        let recipient_id = event.address("recipient")?;
        let votes = event.uint("votes")?;

        let threshold = ctx.read_contract_field(VOTING_THRESHOLD).await?;
        let threshold = threshold.as_u128().ok_or_else(|| {
            ProjectionError::field(VOTING_THRESHOLD, format!("expected uint, got {}", threshold.type_name()))
        })?;
        let status = Status::from_votes(votes, threshold);
        tracing::debug!(recipient = %recipient_id, %votes, %threshold, status = status.label(), "votes revoked");

        ctx.linker()
            .modify::<LtipRecipient, _>(&pool.scope(), &recipient_id, Link::ExistingOnly, move |r| {
                r.votes = votes;
                r.status = status;
            })
            .await?;
        Ok(())
    }
}

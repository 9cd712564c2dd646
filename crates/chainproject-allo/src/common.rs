//! Key steps shared by the strategy tables.
//!
//! Strategy events do not carry their pool id; it is read from the emitting
//! strategy contract (`getPoolId`) before any handler runs.

use async_trait::async_trait;

use chainproject_core::{
    ApplyContext, CommonProperties, Entity, FieldAccess, PoolScope, ProjectionError, TypedFields, Value,
};

/// Side-channel field holding a strategy's pool id.
pub const GET_POOL_ID: &str = "getPoolId";

/// Pool id of the strategy that emitted the current event.
pub async fn pool_id(ctx: &ApplyContext<'_>) -> Result<String, ProjectionError> {
    let value = ctx.read_contract_field(GET_POOL_ID).await?;
    match &value {
        Value::Uint(_) | Value::BigUint(_) | Value::Str(_) => value
            .to_identifier()
            .ok_or_else(|| ProjectionError::field(GET_POOL_ID, "empty pool id")),
        other => Err(ProjectionError::field(
            GET_POOL_ID,
            format!("expected uint, got {}", other.type_name()),
        )),
    }
}

/// Pool scope of the current event.
pub async fn scope(ctx: &ApplyContext<'_>) -> Result<PoolScope, ProjectionError> {
    Ok(PoolScope::new(ctx.event().origin.chain_id, pool_id(ctx).await?))
}

/// A row keyed by `{chainId, poolId}` of a strategy.
pub trait StrategyRow: Entity {
    fn set_strategy_key(&mut self, scope: PoolScope, strategy: String);
}

/// A strategy participant additionally keyed by `recipientId`.
pub trait RecipientRow: StrategyRow {
    fn set_recipient_id(&mut self, recipient_id: String);
}

/// Keys a configuration row by the emitting strategy's pool.
pub struct StrategyPoolKey;

#[async_trait]
impl<T: StrategyRow> CommonProperties<T> for StrategyPoolKey {
    async fn populate(&self, row: &mut T, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        let scope = scope(ctx).await?;
        row.set_strategy_key(scope, ctx.event().contract());
        Ok(())
    }
}

/// Keys a participant row by pool plus the event's `recipientId`.
pub struct StrategyRecipientKey;

#[async_trait]
impl<T: RecipientRow> CommonProperties<T> for StrategyRecipientKey {
    async fn populate(&self, row: &mut T, ctx: &mut ApplyContext<'_>) -> Result<(), ProjectionError> {
        let scope = scope(ctx).await?;
        let event = ctx.event();
        row.set_strategy_key(scope, event.contract());
        row.set_recipient_id(event.address("recipientId")?);
        Ok(())
    }
}

/// `sender` of a registration, when the feed carries it.
pub fn sender(ctx: &ApplyContext<'_>) -> Option<String> {
    ctx.event().field("sender").and_then(Value::to_identifier)
}

/// Whether an open registration names a non-zero registry anchor.
pub fn names_anchor(fields: &TypedFields) -> Result<bool, ProjectionError> {
    let anchor = fields.address("registryAnchor")?;
    Ok(anchor.trim_start_matches("0x").chars().any(|c| c != '0'))
}

//! Cross-entity linking between configuration rows and their participants.
//!
//! Participants share the `{chainId, poolId}` prefix of their configuration
//! row plus one discriminator field (a recipient id, an account). Events on
//! the configuration often reference a participant that has not registered
//! yet; the [`Link`] policy decides whether that creates the row or is a
//! no-op.

use std::fmt;

use crate::context::ApplyContext;
use crate::entity::{Entity, KeyPredicate};
use crate::error::ProjectionError;

/// The `{chainId, poolId}` prefix shared by a configuration and its participants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolScope {
    pub chain_id: u64,
    pub pool_id: String,
}

impl PoolScope {
    pub fn new(chain_id: u64, pool_id: impl fmt::Display) -> Self {
        Self {
            chain_id,
            pool_id: pool_id.to_string(),
        }
    }

    fn predicate(&self) -> KeyPredicate {
        KeyPredicate::new()
            .with("chainId", self.chain_id)
            .with("poolId", &self.pool_id)
    }
}

impl fmt::Display for PoolScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chain_id, self.pool_id)
    }
}

/// A configuration (pool) row.
pub trait Configuration: Entity {
    fn scope(&self) -> PoolScope;
}

/// A participant row keyed by `chainId`, `poolId` and [`Self::DISCRIMINATOR`].
pub trait Participant: Entity {
    /// Row field holding the per-participant id.
    const DISCRIMINATOR: &'static str;

    /// A fresh row carrying only its key fields.
    fn blank(scope: &PoolScope, id: &str) -> Self;
}

/// What to do when the referenced participant does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    CreateOnDemand,
    ExistingOnly,
}

pub struct Linker<'c, 'a> {
    ctx: &'c mut ApplyContext<'a>,
}

impl<'c, 'a> Linker<'c, 'a> {
    pub(crate) fn new(ctx: &'c mut ApplyContext<'a>) -> Self {
        Self { ctx }
    }

    /// The unique participant for `id` within `scope`, if registered.
    pub async fn find<P: Participant>(&self, scope: &PoolScope, id: &str) -> Result<Option<P>, ProjectionError> {
        let predicate = scope.predicate().with(P::DISCRIMINATOR, id);
        self.ctx.find(&predicate).await
    }

    /// Load the participant, mutate it with `f` and stage the result.
    ///
    /// Returns `false` when the participant is missing and `link` is
    /// [`Link::ExistingOnly`]; nothing is written in that case.
    pub async fn modify<P, F>(&mut self, scope: &PoolScope, id: &str, link: Link, f: F) -> Result<bool, ProjectionError>
    where
        P: Participant,
        F: FnOnce(&mut P) + Send,
    {
        let (mut participant, created) = match (self.find::<P>(scope, id).await?, link) {
            (Some(p), _) => (p, false),
            (None, Link::CreateOnDemand) => (P::blank(scope, id), true),
            (None, Link::ExistingOnly) => {
                tracing::debug!(
                    table = P::TABLE.name,
                    %scope,
                    id,
                    "participant not registered yet, skipping"
                );
                return Ok(false);
            }
        };

        f(&mut participant);
        if created {
            self.ctx.create(&participant).await?;
        } else {
            self.ctx.save(&participant).await?;
        }
        Ok(true)
    }
}

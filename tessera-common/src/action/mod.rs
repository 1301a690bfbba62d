//! Actions and the machinery that evaluates them.
//!
//! ## Core Concepts
//!
//! - **Action**: an opaque, serializable operation with a single capability: turn an
//!   [`ActionContext`] into a new state. What an action does is up to its implementor.
//! - **ActionContext**: immutable environment of one action, including a seeded random source.
//! - **ActionEvaluation**: the record produced for every action attempted.
//! - **BlockEvaluator**: anything able to produce the ordered evaluations of a block, either
//!   in process ([`ActionEvaluator`]) or by delegating to a remote service.
//!
//! ## Determinism
//!
//! Replaying a block must reproduce its evaluations bit for bit. Actions therefore only read
//! state through their context and only draw randomness from the context's generator, whose
//! seed is derived from the block's pre-evaluation hash and the transaction signature.

pub mod builtin;
pub mod context;
pub mod errors;
pub mod evaluation;
pub mod evaluator;
pub mod random;

use std::fmt::Debug;

use async_trait::async_trait;

pub use self::{
    context::ActionContext,
    errors::{ActionError, EvaluationError, UnexpectedlyTerminatedAction},
    evaluation::ActionEvaluation,
    evaluator::{evaluate_actions, ActionEvaluator},
};
use crate::{models::PreEvaluationBlock, state::AccountStateDelta};

/// A state transition.
///
/// Implementations are registered with `typetag` so that transactions carrying arbitrary
/// actions can be (de)serialized, which the remote evaluation protocol relies on.
#[typetag::serde(tag = "type")]
pub trait Action: Debug + Send + Sync {
    /// Runs the action against `context.previous_state` and returns the resulting state.
    fn execute(&self, context: &ActionContext) -> Result<AccountStateDelta, ActionError>;
}

/// Produces the ordered evaluations of every action in a block.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait BlockEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        block: &PreEvaluationBlock,
    ) -> Result<Vec<ActionEvaluation>, EvaluationError>;
}

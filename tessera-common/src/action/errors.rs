//! Error types for action execution and block evaluation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    models::{PreEvaluationHash, TxId},
    state::StateError,
};

/// Failure raised by an action's own execution.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionError {
    /// The host ran out of a resource (memory, stack). Depends on the machine running the
    /// action rather than on the action itself, so it is never recorded as an outcome.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("Action failed: {0}")]
    Failed(String),
}

impl ActionError {
    /// Fatal errors abort the evaluation run instead of being recorded.
    pub fn is_fatal(&self) -> bool {
        match self {
            ActionError::ResourceExhausted(_) => true,
            ActionError::State(err) => err.is_host_failure(),
            ActionError::Failed(_) => false,
        }
    }
}

/// A deterministic action failure together with where it happened.
///
/// Terminates the transaction the action belongs to. Earlier evaluations are kept.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct UnexpectedlyTerminatedAction {
    pub message: String,
    pub pre_evaluation_hash: PreEvaluationHash,
    pub block_index: i64,
    pub tx_id: Option<TxId>,
    /// JSON rendering of the failed action.
    pub action: String,
    #[source]
    pub cause: ActionError,
}

/// Errors aborting a whole evaluation run. No evaluations are returned alongside them.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Fatal failure evaluating block #{block_index} ({pre_evaluation_hash}): {source}")]
    Fatal {
        block_index: i64,
        pre_evaluation_hash: PreEvaluationHash,
        #[source]
        source: ActionError,
    },
    #[error("Failed to load the state preceding the block: {0}")]
    State(#[from] StateError),
    #[error("Remote evaluation failed: {0}")]
    Remote(String),
    #[error("Evaluation task did not complete: {0}")]
    Aborted(String),
}

//! Sequential, in-process evaluation of actions.
//!
//! Actions of a transaction run strictly one after the other: the output state of one action
//! is the previous state of the next. A deterministic failure ends the transaction with a
//! final record carrying the error; a fatal failure aborts the whole evaluation.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use tracing::{debug, error, instrument, trace};

use super::{
    random::{generate_random_seed, hash_signature},
    Action, ActionContext, ActionError, ActionEvaluation, BlockEvaluator, EvaluationError,
    UnexpectedlyTerminatedAction,
};
use crate::{
    display::{opt, short},
    models::{Address, PreEvaluationBlock, PreEvaluationBlockHeader, TxId},
    state::{AccountGetters, AccountStateDelta, BlockChainStates},
};

/// Evaluates the actions of one transaction, in order, starting from `previous_state`.
///
/// Returns one evaluation per attempted action. Stops after the first action that fails
/// deterministically; that failure is recorded with the unchanged running state as output.
/// Fatal failures are returned as errors and discard every evaluation.
pub fn evaluate_actions(
    header: &PreEvaluationBlockHeader,
    tx_id: Option<TxId>,
    signer: Address,
    signature: &[u8],
    actions: &[Arc<dyn Action>],
    previous_state: AccountStateDelta,
) -> Result<Vec<ActionEvaluation>, EvaluationError> {
    let pre_evaluation_hash = &header.pre_evaluation_hash;
    let create_context = |state: AccountStateDelta, seed: i32| {
        ActionContext::new(
            signer,
            tx_id,
            header.miner,
            header.index,
            header.protocol_version,
            false,
            state,
            seed,
        )
    };

    let hashed_signature = hash_signature(signature);
    let mut seed =
        generate_random_seed(pre_evaluation_hash.as_bytes(), &hashed_signature, signature, 0);

    let mut state = previous_state;
    let mut evaluations = Vec::with_capacity(actions.len());
    for action in actions {
        let context = create_context(state.clone(), seed);
        let started = Instant::now();
        let result = action.execute(&context);
        let duration_ms = started.elapsed().as_millis();

        let (next_state, exception) = match result {
            Ok(next_state) => {
                debug!(?action, duration_ms, "Action executed");
                (next_state, None)
            }
            Err(err) if err.is_fatal() => {
                error!(
                    ?action,
                    tx_id = opt(&tx_id),
                    block_index = header.index,
                    pre_evaluation_hash = short(pre_evaluation_hash),
                    error = %err,
                    "Action threw a fatal error during execution"
                );
                return Err(EvaluationError::Fatal {
                    block_index: header.index,
                    pre_evaluation_hash: *pre_evaluation_hash,
                    source: err,
                });
            }
            Err(err) => {
                error!(
                    ?action,
                    tx_id = opt(&tx_id),
                    block_index = header.index,
                    pre_evaluation_hash = short(pre_evaluation_hash),
                    error = %err,
                    "Action threw an exception during execution"
                );
                let exception = terminated(header, tx_id, action.as_ref(), err);
                (state.clone(), Some(exception))
            }
        };

        // The executed context's random source has been consumed, record a fresh one.
        let input_context = create_context(state, seed);
        let failed = exception.is_some();
        evaluations.push(ActionEvaluation::new(
            action.clone(),
            input_context,
            next_state.clone(),
            exception,
        ));
        if failed {
            break;
        }

        state = next_state;
        seed = seed.wrapping_add(1);
    }

    Ok(evaluations)
}

fn terminated(
    header: &PreEvaluationBlockHeader,
    tx_id: Option<TxId>,
    action: &dyn Action,
    cause: ActionError,
) -> UnexpectedlyTerminatedAction {
    let message = format!(
        "The action {action:?} (block #{}, pre-evaluation hash {}, tx {}) threw an exception \
         during execution: {cause}",
        header.index,
        header.pre_evaluation_hash,
        tx_id.map_or_else(|| "none".to_string(), |id| id.to_string()),
    );
    UnexpectedlyTerminatedAction {
        message,
        pre_evaluation_hash: header.pre_evaluation_hash,
        block_index: header.index,
        tx_id,
        action: serde_json::to_string(action).unwrap_or_else(|_| format!("{action:?}")),
        cause,
    }
}

/// Evaluates blocks in process against committed chain state.
#[derive(Clone)]
pub struct ActionEvaluator {
    states: Arc<dyn BlockChainStates>,
}

impl ActionEvaluator {
    pub fn new(states: Arc<dyn BlockChainStates>) -> Self {
        Self { states }
    }

    /// The state a block starts from: the committed state after its previous block, or the
    /// empty state for genesis.
    ///
    /// Fails when the previous block's state is not available on this node.
    pub fn initial_state(
        &self,
        block: &PreEvaluationBlock,
    ) -> Result<AccountStateDelta, EvaluationError> {
        let getters = match block.previous_hash() {
            Some(previous) => {
                self.states
                    .get_world_state(Some(*previous))
                    .inspect_err(|err| {
                        error!(previous = short(previous), error = %err, "Missing previous state")
                    })?;
                AccountGetters::at_block(self.states.clone(), *previous)
            }
            None => AccountGetters::null(),
        };
        Ok(AccountStateDelta::new(getters))
    }

    /// Evaluates every transaction of `block` in order, each continuing from the state the
    /// previous one left behind.
    #[instrument(skip_all, fields(block_index = block.index(), actions = block.action_count()))]
    pub fn evaluate_block(
        &self,
        block: &PreEvaluationBlock,
    ) -> Result<Vec<ActionEvaluation>, EvaluationError> {
        let mut state = self.initial_state(block)?;
        let mut evaluations = Vec::with_capacity(block.action_count());
        for tx in &block.transactions {
            let tx_evaluations = evaluate_actions(
                &block.header,
                Some(tx.id),
                tx.signer,
                &tx.signature,
                &tx.actions,
                state.clone(),
            )?;
            if let Some(last) = tx_evaluations.last() {
                state = last.output_state.clone();
            }
            trace!(tx_id = %tx.id, evaluated = tx_evaluations.len(), "Transaction evaluated");
            evaluations.extend(tx_evaluations);
        }
        Ok(evaluations)
    }
}

/// Runs the evaluation on the blocking pool, state reads may hit disk.
#[async_trait]
impl BlockEvaluator for ActionEvaluator {
    async fn evaluate(
        &self,
        block: &PreEvaluationBlock,
    ) -> Result<Vec<ActionEvaluation>, EvaluationError> {
        let evaluator = self.clone();
        let block = block.clone();
        tokio::task::spawn_blocking(move || evaluator.evaluate_block(&block))
            .await
            .map_err(|err| EvaluationError::Aborted(err.to_string()))?
    }
}

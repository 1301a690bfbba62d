//! Data Transfer Objects (or structs)
//!
//! These structs serialise and deserialize messages exchanged with a remote evaluation
//! service. They carry snapshots, never behaviour: a deserialized state delta comes back with
//! detached getters, and it is up to the receiver to wire evaluations together again.
use std::{collections::BTreeMap, sync::Arc};

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::{
    action::{Action, ActionContext, ActionEvaluation, UnexpectedlyTerminatedAction},
    models::{Address, Currency, PreEvaluationBlock, TxId, ValidatorSet, Value},
    serde_primitives::bigint_string,
    state::{AccountGetters, AccountStateDelta},
};

/// Body of `POST /{prefix}/evaluation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEvaluationRequest {
    pub pre_evaluation_block: PreEvaluationBlock,
}

impl RemoteEvaluationRequest {
    pub fn new(pre_evaluation_block: PreEvaluationBlock) -> Self {
        Self { pre_evaluation_block }
    }
}

/// Evaluations in the order the actions appear in the block.
#[derive(Debug, Serialize, Deserialize)]
pub struct RemoteEvaluationResponse {
    pub evaluations: Vec<SerializedActionEvaluation>,
}

impl RemoteEvaluationResponse {
    pub fn new(evaluations: Vec<SerializedActionEvaluation>) -> Self {
        Self { evaluations }
    }
}

impl From<&[ActionEvaluation]> for RemoteEvaluationResponse {
    fn from(evaluations: &[ActionEvaluation]) -> Self {
        Self::new(
            evaluations
                .iter()
                .map(SerializedActionEvaluation::from)
                .collect(),
        )
    }
}

/// Body of `GET /{prefix}/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
}

impl Health {
    pub fn new(version: &str) -> Self {
        Self { status: "ok".to_string(), version: version.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub address: Address,
    pub currency: Currency,
    #[serde(with = "bigint_string")]
    pub amount: BigInt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyEntry {
    pub currency: Currency,
    #[serde(with = "bigint_string")]
    pub amount: BigInt,
}

/// Updates carried by an [`AccountStateDelta`], without its getters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountStateDeltaSnapshot {
    pub states: BTreeMap<Address, Value>,
    pub fungibles: Vec<BalanceEntry>,
    pub total_supplies: Vec<SupplyEntry>,
    pub validator_set: Option<ValidatorSet>,
}

impl AccountStateDeltaSnapshot {
    /// Rebuilds the delta on top of `getters`.
    pub fn into_delta(self, getters: AccountGetters) -> AccountStateDelta {
        AccountStateDelta::from_parts(
            self.states,
            self.fungibles
                .into_iter()
                .map(|entry| ((entry.address, entry.currency), entry.amount))
                .collect(),
            self.total_supplies
                .into_iter()
                .map(|entry| (entry.currency, entry.amount))
                .collect(),
            self.validator_set,
            getters,
        )
    }
}

impl From<&AccountStateDelta> for AccountStateDeltaSnapshot {
    fn from(delta: &AccountStateDelta) -> Self {
        Self {
            states: delta.updated_states().clone(),
            fungibles: delta
                .updated_fungibles()
                .iter()
                .map(|((address, currency), amount)| BalanceEntry {
                    address: *address,
                    currency: currency.clone(),
                    amount: amount.clone(),
                })
                .collect(),
            total_supplies: delta
                .updated_total_supplies()
                .iter()
                .map(|(currency, amount)| SupplyEntry {
                    currency: currency.clone(),
                    amount: amount.clone(),
                })
                .collect(),
            validator_set: delta.updated_validator_set().cloned(),
        }
    }
}

/// An [`ActionContext`] without its random source, which is rebuilt from `random_seed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedActionContext {
    pub signer: Address,
    pub tx_id: Option<TxId>,
    pub miner: Address,
    pub block_index: i64,
    pub block_protocol_version: i32,
    pub rehearsal: bool,
    pub random_seed: i32,
    pub previous_state: AccountStateDeltaSnapshot,
}

impl From<&ActionContext> for SerializedActionContext {
    fn from(context: &ActionContext) -> Self {
        Self {
            signer: context.signer,
            tx_id: context.tx_id,
            miner: context.miner,
            block_index: context.block_index,
            block_protocol_version: context.block_protocol_version,
            rehearsal: context.rehearsal,
            random_seed: context.random_seed(),
            previous_state: AccountStateDeltaSnapshot::from(&context.previous_state),
        }
    }
}

impl SerializedActionContext {
    pub fn into_context(self, getters: AccountGetters) -> ActionContext {
        ActionContext::new(
            self.signer,
            self.tx_id,
            self.miner,
            self.block_index,
            self.block_protocol_version,
            self.rehearsal,
            self.previous_state
                .into_delta(getters),
            self.random_seed,
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SerializedActionEvaluation {
    pub action: Arc<dyn Action>,
    pub input_context: SerializedActionContext,
    pub output_state: AccountStateDeltaSnapshot,
    pub exception: Option<UnexpectedlyTerminatedAction>,
}

impl From<&ActionEvaluation> for SerializedActionEvaluation {
    fn from(evaluation: &ActionEvaluation) -> Self {
        Self {
            action: evaluation.action.clone(),
            input_context: SerializedActionContext::from(&evaluation.input_context),
            output_state: AccountStateDeltaSnapshot::from(&evaluation.output_state),
            exception: evaluation.exception.clone(),
        }
    }
}

/// The resulting evaluation has detached getters on both its input and output state.
impl From<SerializedActionEvaluation> for ActionEvaluation {
    fn from(serialized: SerializedActionEvaluation) -> Self {
        ActionEvaluation::new(
            serialized.action,
            serialized
                .input_context
                .into_context(AccountGetters::detached()),
            serialized
                .output_state
                .into_delta(AccountGetters::detached()),
            serialized.exception,
        )
    }
}

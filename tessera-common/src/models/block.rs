use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Address, BlockHash, HashDigest, PreEvaluationHash, TxId};
use crate::{action::Action, Bytes};

/// A signed bundle of actions. Actions run in the listed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub signer: Address,
    pub signature: Bytes,
    pub actions: Vec<Arc<dyn Action>>,
}

impl Transaction {
    pub fn new(id: TxId, signer: Address, signature: Bytes, actions: Vec<Arc<dyn Action>>) -> Self {
        Self { id, signer, signature, actions }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreEvaluationBlockHeader {
    pub index: i64,
    pub protocol_version: i32,
    pub timestamp: DateTime<Utc>,
    pub miner: Address,
    /// `None` for the genesis block.
    pub previous_hash: Option<BlockHash>,
    pub pre_evaluation_hash: PreEvaluationHash,
    pub tx_hash: Option<HashDigest>,
}

/// A block whose state root has not been computed yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreEvaluationBlock {
    pub header: PreEvaluationBlockHeader,
    pub transactions: Vec<Transaction>,
}

impl PreEvaluationBlock {
    pub fn new(header: PreEvaluationBlockHeader, transactions: Vec<Transaction>) -> Self {
        Self { header, transactions }
    }

    pub fn index(&self) -> i64 {
        self.header.index
    }

    pub fn previous_hash(&self) -> Option<&BlockHash> {
        self.header.previous_hash.as_ref()
    }

    pub fn pre_evaluation_hash(&self) -> &PreEvaluationHash {
        &self.header.pre_evaluation_hash
    }

    pub fn action_count(&self) -> usize {
        self.transactions
            .iter()
            .map(|tx| tx.actions.len())
            .sum()
    }
}

//! Actions and fixtures shared by tests across the workspace.
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    action::{builtin::SetState, Action, ActionContext, ActionError},
    models::{
        Address, BlockHash, Currency, FungibleAssetValue, HashDigest, PreEvaluationBlock,
        PreEvaluationBlockHeader, Transaction, TxId, Value,
    },
    state::AccountStateDelta,
    Bytes,
};

pub fn address(byte: u8) -> Address {
    Address::new([byte; 20])
}

pub fn gold() -> Currency {
    Currency::uncapped("GOLD", 2, None)
}

/// Adds one to the integer stored at `address`, treating no state as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Increment {
    pub address: Address,
}

#[typetag::serde(name = "increment")]
impl Action for Increment {
    fn execute(&self, context: &ActionContext) -> Result<AccountStateDelta, ActionError> {
        let current = match context
            .previous_state
            .get_state(&self.address)?
        {
            Some(Value::Integer(i)) => i,
            None => 0.into(),
            Some(other) => {
                return Err(ActionError::Failed(format!("expected an integer, found {other}")))
            }
        };
        Ok(context
            .previous_state
            .set_state(self.address, Value::Integer(current + 1)))
    }
}

/// Stores the next random draw at `address`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomDraw {
    pub address: Address,
}

#[typetag::serde(name = "random_draw")]
impl Action for RandomDraw {
    fn execute(&self, context: &ActionContext) -> Result<AccountStateDelta, ActionError> {
        let drawn = context.random().next();
        Ok(context
            .previous_state
            .set_state(self.address, Value::from(drawn as i64)))
    }
}

/// Mints to the signer, then transfers part of it to `recipient`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintAndTransfer {
    pub minted: FungibleAssetValue,
    pub recipient: Address,
    pub transferred: FungibleAssetValue,
}

#[typetag::serde(name = "mint_and_transfer")]
impl Action for MintAndTransfer {
    fn execute(&self, context: &ActionContext) -> Result<AccountStateDelta, ActionError> {
        let signer = context.signer;
        Ok(context
            .previous_state
            .mint_asset(&signer, &signer, &self.minted)?
            .transfer_asset(&signer, &self.recipient, &self.transferred)?)
    }
}

/// Records the total supply of `currency` under the signer's address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadTotalSupply {
    pub currency: Currency,
}

#[typetag::serde(name = "read_total_supply")]
impl Action for ReadTotalSupply {
    fn execute(&self, context: &ActionContext) -> Result<AccountStateDelta, ActionError> {
        let supply = context
            .previous_state
            .get_total_supply(&self.currency)?;
        Ok(context
            .previous_state
            .set_state(context.signer, Value::Integer(supply.raw_value)))
    }
}

/// Always fails deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fail {
    pub reason: String,
}

#[typetag::serde(name = "fail")]
impl Action for Fail {
    fn execute(&self, _context: &ActionContext) -> Result<AccountStateDelta, ActionError> {
        Err(ActionError::Failed(self.reason.clone()))
    }
}

/// Simulates the host running out of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exhaust {
    pub resource: String,
}

#[typetag::serde(name = "exhaust")]
impl Action for Exhaust {
    fn execute(&self, _context: &ActionContext) -> Result<AccountStateDelta, ActionError> {
        Err(ActionError::ResourceExhausted(self.resource.clone()))
    }
}

pub fn set_state(target: u8, value: impl Into<Value>) -> Arc<dyn Action> {
    Arc::new(SetState { address: address(target), value: value.into() })
}

pub fn increment(target: u8) -> Arc<dyn Action> {
    Arc::new(Increment { address: address(target) })
}

pub fn draw(target: u8) -> Arc<dyn Action> {
    Arc::new(RandomDraw { address: address(target) })
}

pub fn read_total_supply(currency: Currency) -> Arc<dyn Action> {
    Arc::new(ReadTotalSupply { currency })
}

pub fn fail(reason: &str) -> Arc<dyn Action> {
    Arc::new(Fail { reason: reason.to_string() })
}

pub fn exhaust() -> Arc<dyn Action> {
    Arc::new(Exhaust { resource: "memory".to_string() })
}

/// A transaction signed by `address(seed)` with a signature and id derived from `seed`.
pub fn transaction(seed: u8, actions: Vec<Arc<dyn Action>>) -> Transaction {
    Transaction::new(
        TxId::new([seed; 32]),
        address(seed),
        Bytes::from(vec![seed; 64]),
        actions,
    )
}

pub fn header(index: i64, previous_hash: Option<BlockHash>) -> PreEvaluationBlockHeader {
    PreEvaluationBlockHeader {
        index,
        protocol_version: 5,
        timestamp: Utc
            .with_ymd_and_hms(2023, 6, 1, 0, 0, 0)
            .unwrap(),
        miner: address(0xee),
        previous_hash,
        pre_evaluation_hash: HashDigest::new([index as u8 + 0x10; 32]),
        tx_hash: None,
    }
}

pub fn genesis_block(transactions: Vec<Transaction>) -> PreEvaluationBlock {
    PreEvaluationBlock::new(header(0, None), transactions)
}

pub fn block_after(previous: BlockHash, transactions: Vec<Transaction>) -> PreEvaluationBlock {
    PreEvaluationBlock::new(header(1, Some(previous)), transactions)
}

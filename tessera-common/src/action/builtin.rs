//! Actions every evaluator knows how to deserialize.
//!
//! Each one is a thin wrapper over an [`AccountStateDelta`] update, run on behalf of the
//! transaction signer.
use serde::{Deserialize, Serialize};

use super::{Action, ActionContext, ActionError};
use crate::{
    models::{Address, FungibleAssetValue, Validator, Value},
    state::AccountStateDelta,
};

/// Writes `value` at `address`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetState {
    pub address: Address,
    pub value: Value,
}

#[typetag::serde(name = "set_state")]
impl Action for SetState {
    fn execute(&self, context: &ActionContext) -> Result<AccountStateDelta, ActionError> {
        Ok(context
            .previous_state
            .set_state(self.address, self.value.clone()))
    }
}

/// Mints `amount` to `recipient`. The signer must be a minter of the currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintAsset {
    pub recipient: Address,
    pub amount: FungibleAssetValue,
}

#[typetag::serde(name = "mint_asset")]
impl Action for MintAsset {
    fn execute(&self, context: &ActionContext) -> Result<AccountStateDelta, ActionError> {
        Ok(context
            .previous_state
            .mint_asset(&context.signer, &self.recipient, &self.amount)?)
    }
}

/// Burns `amount` from `owner`. The signer must be a minter of the currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurnAsset {
    pub owner: Address,
    pub amount: FungibleAssetValue,
}

#[typetag::serde(name = "burn_asset")]
impl Action for BurnAsset {
    fn execute(&self, context: &ActionContext) -> Result<AccountStateDelta, ActionError> {
        Ok(context
            .previous_state
            .burn_asset(&context.signer, &self.owner, &self.amount)?)
    }
}

/// Moves `amount` from the signer to `recipient`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferAsset {
    pub recipient: Address,
    pub amount: FungibleAssetValue,
}

#[typetag::serde(name = "transfer_asset")]
impl Action for TransferAsset {
    fn execute(&self, context: &ActionContext) -> Result<AccountStateDelta, ActionError> {
        Ok(context
            .previous_state
            .transfer_asset(&context.signer, &self.recipient, &self.amount)?)
    }
}

/// Adds or updates a validator, or removes it when its power is zero.
///
/// Only allowed as a block action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetValidator {
    pub validator: Validator,
}

#[typetag::serde(name = "set_validator")]
impl Action for SetValidator {
    fn execute(&self, context: &ActionContext) -> Result<AccountStateDelta, ActionError> {
        if !context.block_action() {
            return Err(ActionError::Failed(
                "validators can only be set by block actions".to_string(),
            ));
        }
        Ok(context
            .previous_state
            .set_validator(self.validator.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, sync::Arc};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        action::{evaluate_actions, ActionEvaluation},
        models::{Currency, TxId},
        state::{AccountGetters, StateError},
        testing::{address, header},
        Bytes,
    };

    fn minted_by(minter: u8) -> Currency {
        Currency::uncapped("SILVER", 0, Some(BTreeSet::from([address(minter)])))
    }

    fn run(
        tx_id: Option<TxId>,
        actions: Vec<Arc<dyn Action>>,
    ) -> Vec<ActionEvaluation> {
        evaluate_actions(
            &header(0, None),
            tx_id,
            address(1),
            &[1u8; 64],
            &actions,
            AccountStateDelta::new(AccountGetters::null()),
        )
        .unwrap()
    }

    #[test]
    fn test_asset_actions_compose() {
        let silver = minted_by(1);
        let amount = |raw: i64| FungibleAssetValue::from_raw_value(silver.clone(), raw.into());

        let evaluations = run(
            Some(TxId::new([1; 32])),
            vec![
                Arc::new(MintAsset { recipient: address(1), amount: amount(10) }),
                Arc::new(TransferAsset { recipient: address(2), amount: amount(4) }),
                Arc::new(BurnAsset { owner: address(1), amount: amount(1) }),
            ],
        );

        let output = &evaluations[2].output_state;
        assert!(evaluations
            .iter()
            .all(|e| e.exception.is_none()));
        assert_eq!(
            output
                .get_balance(&address(1), &silver)
                .unwrap(),
            amount(5)
        );
        assert_eq!(
            output
                .get_balance(&address(2), &silver)
                .unwrap(),
            amount(4)
        );
        assert_eq!(output.get_total_supply(&silver).unwrap(), amount(9));
    }

    #[test]
    fn test_mint_requires_minter() {
        let silver = minted_by(9);

        let evaluations = run(
            Some(TxId::new([1; 32])),
            vec![Arc::new(MintAsset {
                recipient: address(1),
                amount: FungibleAssetValue::from_raw_value(silver.clone(), 1.into()),
            })],
        );

        let exception = evaluations[0]
            .exception
            .as_ref()
            .unwrap();
        assert_eq!(
            exception.cause,
            ActionError::State(StateError::CurrencyPermission {
                minter: address(1),
                currency: silver
            })
        );
    }

    #[test]
    fn test_set_validator_only_as_block_action() {
        let validator = Validator::new(Bytes::from(vec![7u8; 33]), 10.into());
        let action: Arc<dyn Action> = Arc::new(SetValidator { validator: validator.clone() });

        let in_transaction = run(Some(TxId::new([1; 32])), vec![action.clone()]);
        let in_block = run(None, vec![action]);

        assert!(in_transaction[0].exception.is_some());
        assert_eq!(
            in_block[0]
                .output_state
                .get_validator_set()
                .unwrap()
                .validators(),
            &[validator]
        );
    }

    #[test]
    fn test_builtin_actions_are_tagged() {
        let action: Arc<dyn Action> =
            Arc::new(SetState { address: address(3), value: Value::from("x") });

        let json = serde_json::to_value(&action).unwrap();

        assert_eq!(json["type"], "set_state");
        let back: Arc<dyn Action> = serde_json::from_value(json).unwrap();
        assert_eq!(format!("{back:?}"), format!("{action:?}"));
    }
}

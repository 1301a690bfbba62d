//! Read-only views over committed chain state.
//!
//! The traits here are the boundary to whatever engine actually stores the state tries. The
//! evaluator only ever reads through them; writes happen in [`AccountStateDelta`] values that
//! layer updates on top of a set of [`AccountGetters`].
pub mod delta;
pub mod errors;
pub mod getters;

use std::sync::Arc;

use num_bigint::BigInt;

pub use self::{
    delta::AccountStateDelta,
    errors::StateError,
    getters::{AccountGetters, BalanceGetter, StateGetter, TotalSupplyGetter, ValidatorSetGetter},
};
use crate::models::{
    Address, BlockHash, Currency, FungibleAssetValue, HashDigest, ReservedAddresses, Value,
    ValidatorSet,
};

/// A state view scoped to one account trie.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait AccountState: Send + Sync {
    /// Root hash of the backing trie, `None` for a view that has no committed root.
    fn state_root(&self) -> Option<HashDigest>;

    fn get_state(&self, address: &Address) -> Result<Option<Value>, StateError>;

    /// Returns one entry per address, in the order of `addresses`.
    fn get_states(&self, addresses: &[Address]) -> Result<Vec<Option<Value>>, StateError> {
        addresses
            .iter()
            .map(|address| self.get_state(address))
            .collect()
    }

    fn get_balance(
        &self,
        address: &Address,
        currency: &Currency,
    ) -> Result<FungibleAssetValue, StateError>;

    /// Fails with [`StateError::TotalSupplyNotTrackable`] for legacy currencies.
    fn get_total_supply(&self, currency: &Currency) -> Result<FungibleAssetValue, StateError>;

    fn get_validator_set(&self) -> Result<ValidatorSet, StateError>;
}

/// The whole state at one block, partitioned into accounts.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait WorldState: Send + Sync {
    /// Legacy worlds keep everything under [`ReservedAddresses::LEGACY_ACCOUNT`].
    fn legacy(&self) -> Result<bool, StateError>;

    fn get_account(&self, address: &Address) -> Result<Arc<dyn AccountState>, StateError>;
}

/// Entry point into committed chain state.
///
/// `None` offsets and roots denote the empty state preceding genesis.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait BlockChainStates: Send + Sync {
    fn get_world_state(&self, offset: Option<BlockHash>) -> Result<Arc<dyn WorldState>, StateError>;

    fn get_account_state(
        &self,
        state_root: Option<HashDigest>,
    ) -> Result<Arc<dyn AccountState>, StateError>;

    fn get_states(
        &self,
        addresses: &[Address],
        offset: Option<BlockHash>,
    ) -> Result<Vec<Option<Value>>, StateError> {
        legacy_account(self, offset)?.get_states(addresses)
    }

    fn get_balance(
        &self,
        address: &Address,
        currency: &Currency,
        offset: Option<BlockHash>,
    ) -> Result<FungibleAssetValue, StateError> {
        legacy_account(self, offset)?.get_balance(address, currency)
    }

    fn get_total_supply(
        &self,
        currency: &Currency,
        offset: Option<BlockHash>,
    ) -> Result<FungibleAssetValue, StateError> {
        legacy_account(self, offset)?.get_total_supply(currency)
    }

    fn get_validator_set(&self, offset: Option<BlockHash>) -> Result<ValidatorSet, StateError> {
        legacy_account(self, offset)?.get_validator_set()
    }
}

fn legacy_account<S: BlockChainStates + ?Sized>(
    states: &S,
    offset: Option<BlockHash>,
) -> Result<Arc<dyn AccountState>, StateError> {
    states
        .get_world_state(offset)?
        .get_account(&ReservedAddresses::LEGACY_ACCOUNT)
}

/// The account state before anything was committed.
///
/// No address holds a state, every balance is zero and the validator set is empty. Total
/// supply is zero for trackable currencies and an error for legacy ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyAccountState;

impl AccountState for EmptyAccountState {
    fn state_root(&self) -> Option<HashDigest> {
        None
    }

    fn get_state(&self, _address: &Address) -> Result<Option<Value>, StateError> {
        Ok(None)
    }

    fn get_states(&self, addresses: &[Address]) -> Result<Vec<Option<Value>>, StateError> {
        Ok(vec![None; addresses.len()])
    }

    fn get_balance(
        &self,
        _address: &Address,
        currency: &Currency,
    ) -> Result<FungibleAssetValue, StateError> {
        Ok(FungibleAssetValue::zero(currency.clone()))
    }

    fn get_total_supply(&self, currency: &Currency) -> Result<FungibleAssetValue, StateError> {
        ensure_trackable(currency)?;
        Ok(FungibleAssetValue::zero(currency.clone()))
    }

    fn get_validator_set(&self) -> Result<ValidatorSet, StateError> {
        Ok(ValidatorSet::default())
    }
}

/// Fails for currencies without total supply tracking.
pub fn ensure_trackable(currency: &Currency) -> Result<(), StateError> {
    if currency.total_supply_trackable {
        Ok(())
    } else {
        Err(StateError::TotalSupplyNotTrackable(currency.clone()))
    }
}

/// Builds a [`FungibleAssetValue`] from a stored raw amount.
pub(crate) fn fav(currency: &Currency, raw: Option<&BigInt>) -> FungibleAssetValue {
    match raw {
        Some(raw) => FungibleAssetValue::from_raw_value(currency.clone(), raw.clone()),
        None => FungibleAssetValue::zero(currency.clone()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_empty_account_state() {
        let state = EmptyAccountState;
        let legacy = Currency::legacy("OLD", 0, None);
        let tracked = Currency::uncapped("NEW", 0, None);

        assert_eq!(state.get_states(&[Address::default(); 3]).unwrap(), vec![None; 3]);
        assert!(state
            .get_balance(&Address::default(), &legacy)
            .unwrap()
            .is_zero());
        assert!(state
            .get_total_supply(&tracked)
            .unwrap()
            .is_zero());
        assert_eq!(
            state
                .get_total_supply(&legacy)
                .unwrap_err(),
            StateError::TotalSupplyNotTrackable(legacy)
        );
        assert!(state
            .get_validator_set()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_default_convenience_getters_go_through_legacy_account() {
        let mut account = MockAccountState::new();
        account
            .expect_get_validator_set()
            .times(1)
            .returning(|| Ok(ValidatorSet::default()));
        let account: Arc<dyn AccountState> = Arc::new(account);

        let mut world = MockWorldState::new();
        world
            .expect_get_account()
            .withf(|address| *address == ReservedAddresses::LEGACY_ACCOUNT)
            .times(1)
            .returning(move |_| Ok(account.clone()));
        let world: Arc<dyn WorldState> = Arc::new(world);

        let mut states = MockBlockChainStates::new();
        let offset = BlockHash::new([1u8; 32]);
        states
            .expect_get_world_state()
            .withf(move |o| *o == Some(offset))
            .times(1)
            .returning(move |_| Ok(world.clone()));

        assert!(legacy_account(&states, Some(offset))
            .unwrap()
            .get_validator_set()
            .unwrap()
            .is_empty());
    }
}

use std::{fmt, sync::Arc};

use super::{AccountState, AccountStateDelta, BlockChainStates, EmptyAccountState, StateError};
use crate::models::{Address, BlockHash, Currency, FungibleAssetValue, Value, ValidatorSet};

pub type StateGetter =
    Arc<dyn Fn(&[Address]) -> Result<Vec<Option<Value>>, StateError> + Send + Sync>;
pub type BalanceGetter =
    Arc<dyn Fn(&Address, &Currency) -> Result<FungibleAssetValue, StateError> + Send + Sync>;
pub type TotalSupplyGetter =
    Arc<dyn Fn(&Currency) -> Result<FungibleAssetValue, StateError> + Send + Sync>;
pub type ValidatorSetGetter = Arc<dyn Fn() -> Result<ValidatorSet, StateError> + Send + Sync>;

/// Functions an [`AccountStateDelta`] falls back to for anything it has not updated itself.
///
/// Each getter can be swapped independently. Rebinding a delta to another delta's getters is
/// how consecutive evaluations are chained without sharing mutable state.
#[derive(Clone)]
pub struct AccountGetters {
    pub state: StateGetter,
    pub balance: BalanceGetter,
    pub total_supply: TotalSupplyGetter,
    pub validator_set: ValidatorSetGetter,
}

impl AccountGetters {
    /// Getters of the empty pre-genesis state.
    pub fn null() -> Self {
        Self::from_account_state(Arc::new(EmptyAccountState))
    }

    /// Getters that fail on every call. Deserialized deltas start out like this until they
    /// are rebound.
    pub fn detached() -> Self {
        fn state(_: &[Address]) -> Result<Vec<Option<Value>>, StateError> {
            Err(StateError::DetachedGetter)
        }
        fn balance(_: &Address, _: &Currency) -> Result<FungibleAssetValue, StateError> {
            Err(StateError::DetachedGetter)
        }
        fn total_supply(_: &Currency) -> Result<FungibleAssetValue, StateError> {
            Err(StateError::DetachedGetter)
        }
        fn validator_set() -> Result<ValidatorSet, StateError> {
            Err(StateError::DetachedGetter)
        }

        Self {
            state: Arc::new(state),
            balance: Arc::new(balance),
            total_supply: Arc::new(total_supply),
            validator_set: Arc::new(validator_set),
        }
    }

    pub fn from_account_state(account: Arc<dyn AccountState>) -> Self {
        let (a, b, c, d) = (account.clone(), account.clone(), account.clone(), account);
        Self {
            state: Arc::new(move |addresses: &[Address]| a.get_states(addresses)),
            balance: Arc::new(move |address: &Address, currency: &Currency| {
                b.get_balance(address, currency)
            }),
            total_supply: Arc::new(move |currency: &Currency| c.get_total_supply(currency)),
            validator_set: Arc::new(move || d.get_validator_set()),
        }
    }

    /// Getters reading the committed state right after `block`.
    pub fn at_block(states: Arc<dyn BlockChainStates>, block: BlockHash) -> Self {
        let (a, b, c, d) = (states.clone(), states.clone(), states.clone(), states);
        Self {
            state: Arc::new(move |addresses: &[Address]| a.get_states(addresses, Some(block))),
            balance: Arc::new(move |address: &Address, currency: &Currency| {
                b.get_balance(address, currency, Some(block))
            }),
            total_supply: Arc::new(move |currency: &Currency| {
                c.get_total_supply(currency, Some(block))
            }),
            validator_set: Arc::new(move || d.get_validator_set(Some(block))),
        }
    }

    /// Getters reading through `delta`: its own updates first, then its getters.
    pub fn from_delta(delta: &AccountStateDelta) -> Self {
        let delta = Arc::new(delta.clone());
        let (a, b, c, d) = (delta.clone(), delta.clone(), delta.clone(), delta);
        Self {
            state: Arc::new(move |addresses: &[Address]| a.get_states(addresses)),
            balance: Arc::new(move |address: &Address, currency: &Currency| {
                b.get_balance(address, currency)
            }),
            total_supply: Arc::new(move |currency: &Currency| c.get_total_supply(currency)),
            validator_set: Arc::new(move || d.get_validator_set()),
        }
    }
}

impl fmt::Debug for AccountGetters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccountGetters")
    }
}

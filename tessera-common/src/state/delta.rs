use std::{collections::BTreeMap, fmt};

use num_bigint::BigInt;
use num_traits::Signed;

use super::{ensure_trackable, fav, AccountGetters, AccountState, StateError};
use crate::models::{
    Address, Currency, FungibleAssetValue, HashDigest, Validator, ValidatorSet, Value,
};

/// Uncommitted updates layered over a previous state.
///
/// Reads consult the updates first and fall back to the [`AccountGetters`]. Every update
/// returns a new delta; an existing delta never changes, so it can safely be shared as the
/// input of one evaluation and the fallback of the next.
#[derive(Clone)]
pub struct AccountStateDelta {
    states: BTreeMap<Address, Value>,
    fungibles: BTreeMap<(Address, Currency), BigInt>,
    total_supplies: BTreeMap<Currency, BigInt>,
    validator_set: Option<ValidatorSet>,
    getters: AccountGetters,
}

impl AccountStateDelta {
    pub fn new(getters: AccountGetters) -> Self {
        Self {
            states: BTreeMap::new(),
            fungibles: BTreeMap::new(),
            total_supplies: BTreeMap::new(),
            validator_set: None,
            getters,
        }
    }

    /// Rebuilds a delta from previously captured updates.
    pub fn from_parts(
        states: BTreeMap<Address, Value>,
        fungibles: BTreeMap<(Address, Currency), BigInt>,
        total_supplies: BTreeMap<Currency, BigInt>,
        validator_set: Option<ValidatorSet>,
        getters: AccountGetters,
    ) -> Self {
        Self { states, fungibles, total_supplies, validator_set, getters }
    }

    /// Same updates, different fallback.
    pub fn with_getters(&self, getters: AccountGetters) -> Self {
        Self { getters, ..self.clone() }
    }

    pub fn getters(&self) -> &AccountGetters {
        &self.getters
    }

    pub fn updated_states(&self) -> &BTreeMap<Address, Value> {
        &self.states
    }

    pub fn updated_fungibles(&self) -> &BTreeMap<(Address, Currency), BigInt> {
        &self.fungibles
    }

    pub fn updated_total_supplies(&self) -> &BTreeMap<Currency, BigInt> {
        &self.total_supplies
    }

    pub fn updated_validator_set(&self) -> Option<&ValidatorSet> {
        self.validator_set.as_ref()
    }

    /// Addresses whose states or balances were updated.
    pub fn updated_addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self
            .states
            .keys()
            .chain(self.fungibles.keys().map(|(a, _)| a))
            .copied()
            .collect();
        addresses.sort();
        addresses.dedup();
        addresses
    }

    pub fn get_state(&self, address: &Address) -> Result<Option<Value>, StateError> {
        Ok(self
            .get_states(std::slice::from_ref(address))?
            .pop()
            .flatten())
    }

    /// Looks up all addresses the delta does not know with a single getter call.
    pub fn get_states(&self, addresses: &[Address]) -> Result<Vec<Option<Value>>, StateError> {
        let missing: Vec<Address> = addresses
            .iter()
            .filter(|address| !self.states.contains_key(*address))
            .copied()
            .collect();
        let mut fetched = if missing.is_empty() {
            Vec::new().into_iter()
        } else {
            let values = (self.getters.state)(&missing)?;
            if values.len() != missing.len() {
                return Err(StateError::Unexpected(format!(
                    "state getter returned {} values for {} addresses",
                    values.len(),
                    missing.len()
                )));
            }
            values.into_iter()
        };
        Ok(addresses
            .iter()
            .map(|address| match self.states.get(address) {
                Some(value) => Some(value.clone()),
                None => fetched.next().flatten(),
            })
            .collect())
    }

    pub fn get_balance(
        &self,
        address: &Address,
        currency: &Currency,
    ) -> Result<FungibleAssetValue, StateError> {
        match self
            .fungibles
            .get(&(*address, currency.clone()))
        {
            Some(raw) => Ok(fav(currency, Some(raw))),
            None => (self.getters.balance)(address, currency),
        }
    }

    pub fn get_total_supply(&self, currency: &Currency) -> Result<FungibleAssetValue, StateError> {
        ensure_trackable(currency)?;
        match self.total_supplies.get(currency) {
            Some(raw) => Ok(fav(currency, Some(raw))),
            None => (self.getters.total_supply)(currency),
        }
    }

    pub fn get_validator_set(&self) -> Result<ValidatorSet, StateError> {
        match &self.validator_set {
            Some(set) => Ok(set.clone()),
            None => (self.getters.validator_set)(),
        }
    }

    pub fn set_state(&self, address: Address, value: Value) -> Self {
        let mut next = self.clone();
        next.states.insert(address, value);
        next
    }

    /// Creates `value` out of thin air in `recipient`'s balance.
    pub fn mint_asset(
        &self,
        minter: &Address,
        recipient: &Address,
        value: &FungibleAssetValue,
    ) -> Result<Self, StateError> {
        ensure_positive(value)?;
        let currency = &value.currency;
        if !currency.allows_to_mint(minter) {
            return Err(StateError::CurrencyPermission {
                minter: *minter,
                currency: currency.clone(),
            });
        }

        let mut next = self.clone();
        if currency.total_supply_trackable {
            let supply = &self.get_total_supply(currency)?.raw_value + &value.raw_value;
            if let Some(max) = &currency.maximum_supply {
                if &supply > max {
                    return Err(StateError::SupplyOverflow {
                        currency: currency.clone(),
                        amount: value.clone(),
                    });
                }
            }
            next.total_supplies
                .insert(currency.clone(), supply);
        }
        let balance = self.get_balance(recipient, currency)?;
        next.fungibles
            .insert((*recipient, currency.clone()), balance.raw_value + &value.raw_value);
        Ok(next)
    }

    /// Destroys `value` from `owner`'s balance.
    pub fn burn_asset(
        &self,
        burner: &Address,
        owner: &Address,
        value: &FungibleAssetValue,
    ) -> Result<Self, StateError> {
        ensure_positive(value)?;
        let currency = &value.currency;
        if !currency.allows_to_mint(burner) {
            return Err(StateError::CurrencyPermission {
                minter: *burner,
                currency: currency.clone(),
            });
        }

        let balance = self.get_balance(owner, currency)?;
        let remaining = debit(owner, &balance, value)?;

        let mut next = self.clone();
        next.fungibles
            .insert((*owner, currency.clone()), remaining);
        if currency.total_supply_trackable {
            let supply = self.get_total_supply(currency)?.raw_value - &value.raw_value;
            next.total_supplies
                .insert(currency.clone(), supply);
        }
        Ok(next)
    }

    pub fn transfer_asset(
        &self,
        sender: &Address,
        recipient: &Address,
        value: &FungibleAssetValue,
    ) -> Result<Self, StateError> {
        ensure_positive(value)?;
        let currency = &value.currency;
        let sender_balance = self.get_balance(sender, currency)?;
        let remaining = debit(sender, &sender_balance, value)?;

        let mut next = self.clone();
        next.fungibles
            .insert((*sender, currency.clone()), remaining);
        let recipient_balance = next.get_balance(recipient, currency)?;
        next.fungibles.insert(
            (*recipient, currency.clone()),
            recipient_balance.raw_value + &value.raw_value,
        );
        Ok(next)
    }

    /// Adds, updates or (with zero power) removes a validator.
    pub fn set_validator(&self, validator: Validator) -> Result<Self, StateError> {
        let set = self.get_validator_set()?.update(validator);
        let mut next = self.clone();
        next.validator_set = Some(set);
        Ok(next)
    }
}

fn ensure_positive(value: &FungibleAssetValue) -> Result<(), StateError> {
    if value.is_positive() {
        Ok(())
    } else {
        Err(StateError::InvalidAmount(value.clone()))
    }
}

fn debit(
    owner: &Address,
    balance: &FungibleAssetValue,
    value: &FungibleAssetValue,
) -> Result<BigInt, StateError> {
    let remaining = &balance.raw_value - &value.raw_value;
    if remaining.is_negative() {
        return Err(StateError::InsufficientBalance {
            address: *owner,
            balance: balance.clone(),
            required: value.clone(),
        });
    }
    Ok(remaining)
}

impl AccountState for AccountStateDelta {
    fn state_root(&self) -> Option<HashDigest> {
        None
    }

    fn get_state(&self, address: &Address) -> Result<Option<Value>, StateError> {
        AccountStateDelta::get_state(self, address)
    }

    fn get_states(&self, addresses: &[Address]) -> Result<Vec<Option<Value>>, StateError> {
        AccountStateDelta::get_states(self, addresses)
    }

    fn get_balance(
        &self,
        address: &Address,
        currency: &Currency,
    ) -> Result<FungibleAssetValue, StateError> {
        AccountStateDelta::get_balance(self, address, currency)
    }

    fn get_total_supply(&self, currency: &Currency) -> Result<FungibleAssetValue, StateError> {
        AccountStateDelta::get_total_supply(self, currency)
    }

    fn get_validator_set(&self) -> Result<ValidatorSet, StateError> {
        AccountStateDelta::get_validator_set(self)
    }
}

/// Two deltas are equal when they carry the same updates, regardless of their getters.
impl PartialEq for AccountStateDelta {
    fn eq(&self, other: &Self) -> bool {
        self.states == other.states &&
            self.fungibles == other.fungibles &&
            self.total_supplies == other.total_supplies &&
            self.validator_set == other.validator_set
    }
}

impl fmt::Debug for AccountStateDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountStateDelta")
            .field("states", &self.states)
            .field("fungibles", &self.fungibles)
            .field("total_supplies", &self.total_supplies)
            .field("validator_set", &self.validator_set)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::Bytes;

    const ALICE: Address = Address::new([0xa1; 20]);
    const BOB: Address = Address::new([0xb0; 20]);

    #[fixture]
    fn gold() -> Currency {
        Currency::uncapped("GOLD", 2, Some([ALICE].into()))
    }

    fn amount(currency: &Currency, raw: i64) -> FungibleAssetValue {
        FungibleAssetValue::from_raw_value(currency.clone(), raw.into())
    }

    #[test]
    fn test_reads_fall_back_to_getters() {
        let delta = AccountStateDelta::new(AccountGetters::null()).set_state(ALICE, Value::from(1));

        assert_eq!(
            delta
                .get_states(&[BOB, ALICE])
                .unwrap(),
            vec![None, Some(Value::from(1))]
        );
    }

    #[test]
    fn test_get_states_batches_misses_into_one_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut getters = AccountGetters::null();
        getters.state = Arc::new(move |addresses: &[Address]| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(addresses
                .iter()
                .map(|a| Some(Value::Binary(Bytes::from(a.to_vec()))))
                .collect())
        });
        let delta = AccountStateDelta::new(getters).set_state(BOB, Value::Null);

        let values = delta
            .get_states(&[ALICE, BOB, Address::default()])
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            values,
            vec![
                Some(Value::Binary(Bytes::from(ALICE.to_vec()))),
                Some(Value::Null),
                Some(Value::Binary(Bytes::from(Address::default().to_vec()))),
            ]
        );
    }

    #[rstest]
    fn test_mint_and_transfer(gold: Currency) {
        let delta = AccountStateDelta::new(AccountGetters::null())
            .mint_asset(&ALICE, &ALICE, &amount(&gold, 100))
            .unwrap()
            .transfer_asset(&ALICE, &BOB, &amount(&gold, 30))
            .unwrap();

        assert_eq!(delta.get_balance(&ALICE, &gold).unwrap(), amount(&gold, 70));
        assert_eq!(delta.get_balance(&BOB, &gold).unwrap(), amount(&gold, 30));
        assert_eq!(delta.get_total_supply(&gold).unwrap(), amount(&gold, 100));
        assert_eq!(delta.updated_addresses(), vec![ALICE, BOB]);
    }

    #[rstest]
    fn test_transfer_rejects_overdraft(gold: Currency) {
        let delta = AccountStateDelta::new(AccountGetters::null());

        let err = delta
            .transfer_asset(&ALICE, &BOB, &amount(&gold, 1))
            .unwrap_err();

        assert_eq!(
            err,
            StateError::InsufficientBalance {
                address: ALICE,
                balance: amount(&gold, 0),
                required: amount(&gold, 1),
            }
        );
    }

    #[rstest]
    #[case::zero(0)]
    #[case::negative(-5)]
    fn test_non_positive_amounts_rejected(gold: Currency, #[case] raw: i64) {
        let delta = AccountStateDelta::new(AccountGetters::null());

        assert_eq!(
            delta
                .mint_asset(&ALICE, &BOB, &amount(&gold, raw))
                .unwrap_err(),
            StateError::InvalidAmount(amount(&gold, raw))
        );
    }

    #[rstest]
    fn test_only_minters_mint_and_burn(gold: Currency) {
        let delta = AccountStateDelta::new(AccountGetters::null())
            .mint_asset(&ALICE, &BOB, &amount(&gold, 10))
            .unwrap();

        assert!(matches!(
            delta.mint_asset(&BOB, &BOB, &amount(&gold, 1)),
            Err(StateError::CurrencyPermission { .. })
        ));
        let burned = delta
            .burn_asset(&ALICE, &BOB, &amount(&gold, 4))
            .unwrap();
        assert_eq!(burned.get_balance(&BOB, &gold).unwrap(), amount(&gold, 6));
        assert_eq!(burned.get_total_supply(&gold).unwrap(), amount(&gold, 6));
    }

    #[test]
    fn test_capped_currency_overflow() {
        let capped = Currency::capped("CAP", 0, 10.into(), None);
        let delta = AccountStateDelta::new(AccountGetters::null())
            .mint_asset(&ALICE, &ALICE, &amount(&capped, 10))
            .unwrap();

        assert!(matches!(
            delta.mint_asset(&ALICE, &ALICE, &amount(&capped, 1)),
            Err(StateError::SupplyOverflow { .. })
        ));
    }

    #[test]
    fn test_legacy_currency_supply_untracked() {
        let legacy = Currency::legacy("OLD", 0, None);
        let delta = AccountStateDelta::new(AccountGetters::null())
            .mint_asset(&ALICE, &ALICE, &amount(&legacy, 5))
            .unwrap();

        assert_eq!(delta.get_balance(&ALICE, &legacy).unwrap(), amount(&legacy, 5));
        assert_eq!(
            delta
                .get_total_supply(&legacy)
                .unwrap_err(),
            StateError::TotalSupplyNotTrackable(legacy)
        );
    }

    #[test]
    fn test_set_validator_and_equality_ignores_getters() {
        let validator = Validator::new(Bytes::from([1u8; 33]), 10.into());
        let delta = AccountStateDelta::new(AccountGetters::null())
            .set_validator(validator.clone())
            .unwrap();

        assert_eq!(delta.get_validator_set().unwrap().validators(), &[validator]);
        assert_eq!(delta.with_getters(AccountGetters::detached()), delta);
        assert_ne!(delta, AccountStateDelta::new(AccountGetters::null()));
    }
}

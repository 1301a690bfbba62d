use std::sync::Arc;

use num_bigint::BigInt;
use tessera_common::{
    codec,
    models::{Address, Currency, FungibleAssetValue, HashDigest, ValidatorSet, Value},
    state::{ensure_trackable, AccountState, StateError},
};
use tracing::trace;

use super::store::{CacheStore, ABSENT};

/// Suffix of the validator set entry; it cannot collide with an address or a currency hash.
const VALIDATOR_SET_SUFFIX: [u8; 3] = [b'_'; 3];

fn state_key(root: &HashDigest, address: &Address) -> Vec<u8> {
    [root.as_bytes(), address.as_bytes()].concat()
}

fn balance_key(root: &HashDigest, address: &Address, currency: &Currency) -> Vec<u8> {
    [root.as_bytes(), address.as_bytes(), currency.hash().as_bytes()].concat()
}

fn total_supply_key(root: &HashDigest, currency: &Currency) -> Vec<u8> {
    [root.as_bytes(), currency.hash().as_bytes()].concat()
}

fn validator_set_key(root: &HashDigest) -> Vec<u8> {
    [root.as_bytes(), VALIDATOR_SET_SUFFIX.as_slice()].concat()
}

fn decode_integer(bytes: &[u8]) -> Result<BigInt, StateError> {
    match codec::decode(bytes)? {
        Value::Integer(amount) => Ok(amount),
        other => Err(StateError::Unexpected(format!("cached amount is not an integer: {other}"))),
    }
}

fn encode_integer(amount: &BigInt) -> Vec<u8> {
    codec::encode(&Value::Integer(amount.clone()))
}

/// Read-through cache in front of one account trie.
///
/// A view without a state root is the empty trie, it is answered by the inner view directly.
pub struct LocalCacheAccountState {
    root: Option<HashDigest>,
    inner: Arc<dyn AccountState>,
    store: CacheStore,
}

impl LocalCacheAccountState {
    pub fn new(root: Option<HashDigest>, inner: Arc<dyn AccountState>, store: CacheStore) -> Self {
        Self { root, inner, store }
    }
}

impl AccountState for LocalCacheAccountState {
    fn state_root(&self) -> Option<HashDigest> {
        self.root
    }

    fn get_state(&self, address: &Address) -> Result<Option<Value>, StateError> {
        let Some(root) = &self.root else {
            return self.inner.get_state(address);
        };
        self.store.get_or_fetch(
            "state",
            &state_key(root, address),
            || self.inner.get_state(address),
            codec::encode,
            |bytes| Ok(codec::decode(bytes)?),
        )
    }

    /// Answers hits from the cache and fetches all misses with a single inner call.
    fn get_states(&self, addresses: &[Address]) -> Result<Vec<Option<Value>>, StateError> {
        let Some(root) = &self.root else {
            return self.inner.get_states(addresses);
        };

        let mut values = Vec::with_capacity(addresses.len());
        let mut misses = Vec::new();
        for (index, address) in addresses.iter().enumerate() {
            match self.store.get(&state_key(root, address))? {
                Some(cached) if cached == [ABSENT] => values.push(None),
                Some(cached) => values.push(Some(codec::decode(&cached)?)),
                None => {
                    values.push(None);
                    misses.push(index);
                }
            }
        }
        trace!(requested = addresses.len(), misses = misses.len(), "Batched state lookup");
        if misses.is_empty() {
            return Ok(values);
        }

        let missing: Vec<Address> = misses
            .iter()
            .map(|&index| addresses[index])
            .collect();
        let fetched = self.inner.get_states(&missing)?;
        if fetched.len() != missing.len() {
            return Err(StateError::Unexpected(format!(
                "requested {} states, got {}",
                missing.len(),
                fetched.len()
            )));
        }
        for (index, value) in misses.into_iter().zip(fetched) {
            let key = state_key(root, &addresses[index]);
            match &value {
                Some(value) => self.store.insert(&key, &codec::encode(value))?,
                None => self.store.insert(&key, &[ABSENT])?,
            }
            values[index] = value;
        }
        Ok(values)
    }

    fn get_balance(
        &self,
        address: &Address,
        currency: &Currency,
    ) -> Result<FungibleAssetValue, StateError> {
        let Some(root) = &self.root else {
            return self.inner.get_balance(address, currency);
        };
        let raw = self.store.get_or_fetch(
            "balance",
            &balance_key(root, address, currency),
            || {
                self.inner
                    .get_balance(address, currency)
                    .map(|value| Some(value.raw_value))
            },
            encode_integer,
            decode_integer,
        )?;
        Ok(FungibleAssetValue::from_raw_value(currency.clone(), raw.unwrap_or_default()))
    }

    fn get_total_supply(&self, currency: &Currency) -> Result<FungibleAssetValue, StateError> {
        ensure_trackable(currency)?;
        let Some(root) = &self.root else {
            return self.inner.get_total_supply(currency);
        };
        let raw = self.store.get_or_fetch(
            "total_supply",
            &total_supply_key(root, currency),
            || {
                self.inner
                    .get_total_supply(currency)
                    .map(|value| Some(value.raw_value))
            },
            encode_integer,
            decode_integer,
        )?;
        Ok(FungibleAssetValue::from_raw_value(currency.clone(), raw.unwrap_or_default()))
    }

    fn get_validator_set(&self) -> Result<ValidatorSet, StateError> {
        let Some(root) = &self.root else {
            return self.inner.get_validator_set();
        };
        let set = self.store.get_or_fetch(
            "validator_set",
            &validator_set_key(root),
            || self.inner.get_validator_set().map(Some),
            |set| codec::encode(&set.to_value()),
            |bytes| Ok(ValidatorSet::from_value(&codec::decode(bytes)?)?),
        )?;
        Ok(set.unwrap_or_default())
    }
}

//! In-memory, content-addressed chain state.
//!
//! Every block commits a single legacy account. Its root is the SHA-256 digest of the account's
//! canonical encoding, so identical contents share a root across blocks.
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use num_bigint::BigInt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tessera_common::{
    codec,
    dto::AccountStateDeltaSnapshot,
    models::{
        Address, BlockHash, Currency, CurrencyHash, FungibleAssetValue, HashDigest, Key,
        ReservedAddresses, ValidatorSet, Value,
    },
    state::{
        ensure_trackable, AccountGetters, AccountState, AccountStateDelta, BlockChainStates,
        EmptyAccountState, StateError, WorldState,
    },
    Bytes,
};
use tracing::{debug, instrument};

#[derive(Debug, Clone, Default, PartialEq)]
struct AccountContents {
    states: BTreeMap<Address, Value>,
    balances: BTreeMap<(Address, CurrencyHash), BigInt>,
    total_supplies: BTreeMap<CurrencyHash, BigInt>,
    validator_set: ValidatorSet,
}

impl AccountContents {
    fn apply(&mut self, delta: &AccountStateDelta) {
        for (address, value) in delta.updated_states() {
            self.states
                .insert(*address, value.clone());
        }
        for ((address, currency), amount) in delta.updated_fungibles() {
            self.balances
                .insert((*address, *currency.hash()), amount.clone());
        }
        for (currency, amount) in delta.updated_total_supplies() {
            self.total_supplies
                .insert(*currency.hash(), amount.clone());
        }
        if let Some(set) = delta.updated_validator_set() {
            self.validator_set = set.clone();
        }
    }

    fn to_value(&self) -> Value {
        let binary = |bytes: &[u8]| Key::Binary(Bytes::from(bytes.to_vec()));
        let states: Value = self
            .states
            .iter()
            .map(|(address, value)| (binary(address.as_bytes()), value.clone()))
            .collect();
        let balances: Value = self
            .balances
            .iter()
            .map(|((address, currency), amount)| {
                let key = [address.as_bytes(), currency.as_bytes()].concat();
                (binary(&key), Value::Integer(amount.clone()))
            })
            .collect();
        let total_supplies: Value = self
            .total_supplies
            .iter()
            .map(|(currency, amount)| (binary(currency.as_bytes()), Value::Integer(amount.clone())))
            .collect();
        [
            (Key::from("states"), states),
            (Key::from("balances"), balances),
            (Key::from("totalSupplies"), total_supplies),
            (Key::from("validators"), self.validator_set.to_value()),
        ]
        .into_iter()
        .collect()
    }

    fn root(&self) -> HashDigest {
        HashDigest::new(Sha256::digest(codec::encode(&self.to_value())).into())
    }
}

/// A committed account trie.
#[derive(Debug)]
pub struct MemoryAccountState {
    root: HashDigest,
    contents: AccountContents,
}

impl AccountState for MemoryAccountState {
    fn state_root(&self) -> Option<HashDigest> {
        Some(self.root)
    }

    fn get_state(&self, address: &Address) -> Result<Option<Value>, StateError> {
        Ok(self.contents.states.get(address).cloned())
    }

    fn get_balance(
        &self,
        address: &Address,
        currency: &Currency,
    ) -> Result<FungibleAssetValue, StateError> {
        let raw = self
            .contents
            .balances
            .get(&(*address, *currency.hash()))
            .cloned()
            .unwrap_or_default();
        Ok(FungibleAssetValue::from_raw_value(currency.clone(), raw))
    }

    fn get_total_supply(&self, currency: &Currency) -> Result<FungibleAssetValue, StateError> {
        ensure_trackable(currency)?;
        let raw = self
            .contents
            .total_supplies
            .get(currency.hash())
            .cloned()
            .unwrap_or_default();
        Ok(FungibleAssetValue::from_raw_value(currency.clone(), raw))
    }

    fn get_validator_set(&self) -> Result<ValidatorSet, StateError> {
        Ok(self.contents.validator_set.clone())
    }
}

/// The world at one block: account roots by address.
pub struct MemoryWorldState {
    accounts: BTreeMap<Address, Arc<MemoryAccountState>>,
}

impl WorldState for MemoryWorldState {
    fn legacy(&self) -> Result<bool, StateError> {
        Ok(true)
    }

    fn get_account(&self, address: &Address) -> Result<Arc<dyn AccountState>, StateError> {
        Ok(match self.accounts.get(address) {
            Some(account) => account.clone() as Arc<dyn AccountState>,
            None => Arc::new(EmptyAccountState),
        })
    }
}

/// One block of a JSON state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub hash: BlockHash,
    pub previous_hash: Option<BlockHash>,
    pub state: AccountStateDeltaSnapshot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub blocks: Vec<BlockSnapshot>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<HashDigest, Arc<MemoryAccountState>>,
    blocks: HashMap<BlockHash, BTreeMap<Address, HashDigest>>,
}

/// [`BlockChainStates`] held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryBlockChainStates {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryBlockChainStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a snapshot, committing its blocks in order.
    pub fn from_snapshot(snapshot: StateSnapshot) -> Result<Self, StateError> {
        let states = Self::new();
        for block in snapshot.blocks {
            let delta = block
                .state
                .into_delta(AccountGetters::null());
            states.commit(block.hash, block.previous_hash, &delta)?;
        }
        Ok(states)
    }

    pub fn from_json(json: &str) -> Result<Self, StateError> {
        let snapshot: StateSnapshot = serde_json::from_str(json)
            .map_err(|err| StateError::Unexpected(format!("invalid state snapshot: {err}")))?;
        Self::from_snapshot(snapshot)
    }

    /// Commits the updates of `delta` on top of the state after `previous_hash` as `block`.
    ///
    /// Returns the new root of the legacy account.
    #[instrument(skip_all, fields(block = %block))]
    pub fn commit(
        &self,
        block: BlockHash,
        previous_hash: Option<BlockHash>,
        delta: &AccountStateDelta,
    ) -> Result<HashDigest, StateError> {
        let mut inner = self.inner.write();
        let mut contents = match previous_hash {
            Some(previous) => {
                let roots = inner
                    .blocks
                    .get(&previous)
                    .ok_or(StateError::UnknownBlock(previous))?;
                roots
                    .get(&ReservedAddresses::LEGACY_ACCOUNT)
                    .and_then(|root| inner.accounts.get(root))
                    .map(|account| account.contents.clone())
                    .unwrap_or_default()
            }
            None => AccountContents::default(),
        };
        contents.apply(delta);

        let root = contents.root();
        inner
            .accounts
            .entry(root)
            .or_insert_with(|| Arc::new(MemoryAccountState { root, contents }));
        inner
            .blocks
            .insert(block, BTreeMap::from([(ReservedAddresses::LEGACY_ACCOUNT, root)]));
        debug!(%root, "Committed block state");
        Ok(root)
    }

    pub fn contains_block(&self, block: &BlockHash) -> bool {
        self.inner
            .read()
            .blocks
            .contains_key(block)
    }
}

impl BlockChainStates for MemoryBlockChainStates {
    fn get_world_state(
        &self,
        offset: Option<BlockHash>,
    ) -> Result<Arc<dyn WorldState>, StateError> {
        let Some(block) = offset else {
            return Ok(Arc::new(MemoryWorldState { accounts: BTreeMap::new() }));
        };
        let inner = self.inner.read();
        let roots = inner
            .blocks
            .get(&block)
            .ok_or(StateError::UnknownBlock(block))?;
        let accounts = roots
            .iter()
            .map(|(address, root)| {
                inner
                    .accounts
                    .get(root)
                    .map(|account| (*address, account.clone()))
                    .ok_or(StateError::UnknownStateRoot(*root))
            })
            .collect::<Result<_, _>>()?;
        Ok(Arc::new(MemoryWorldState { accounts }))
    }

    fn get_account_state(
        &self,
        state_root: Option<HashDigest>,
    ) -> Result<Arc<dyn AccountState>, StateError> {
        let Some(root) = state_root else {
            return Ok(Arc::new(EmptyAccountState));
        };
        self.inner
            .read()
            .accounts
            .get(&root)
            .map(|account| account.clone() as Arc<dyn AccountState>)
            .ok_or(StateError::UnknownStateRoot(root))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tessera_common::testing::{address, gold};

    use super::*;

    const GENESIS: BlockHash = BlockHash::new([1u8; 32]);
    const NEXT: BlockHash = BlockHash::new([2u8; 32]);

    fn minted(amount: i64) -> AccountStateDelta {
        let minter = address(0xaa);
        AccountStateDelta::new(AccountGetters::null())
            .set_state(address(1), Value::from("hello"))
            .mint_asset(
                &minter,
                &minter,
                &FungibleAssetValue::from_raw_value(gold(), amount.into()),
            )
            .unwrap()
    }

    #[test]
    fn test_commit_builds_on_previous_block() {
        let states = MemoryBlockChainStates::new();
        let first = states
            .commit(GENESIS, None, &minted(100))
            .unwrap();
        let second = states
            .commit(
                NEXT,
                Some(GENESIS),
                &AccountStateDelta::new(AccountGetters::null()).set_state(address(2), "x".into()),
            )
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(
            states
                .get_states(&[address(1), address(2), address(3)], Some(NEXT))
                .unwrap(),
            vec![Some(Value::from("hello")), Some(Value::from("x")), None]
        );
        assert_eq!(
            states
                .get_total_supply(&gold(), Some(NEXT))
                .unwrap()
                .raw_value,
            100.into()
        );
        assert_eq!(
            states
                .get_account_state(Some(first))
                .unwrap()
                .get_state(&address(2))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_roots_are_content_addressed() {
        let states = MemoryBlockChainStates::new();

        let a = states
            .commit(GENESIS, None, &minted(5))
            .unwrap();
        let b = states
            .commit(NEXT, None, &minted(5))
            .unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_references_fail() {
        let states = MemoryBlockChainStates::new();
        let root = HashDigest::new([9u8; 32]);

        assert_eq!(
            states
                .get_world_state(Some(NEXT))
                .err()
                .unwrap(),
            StateError::UnknownBlock(NEXT)
        );
        assert_eq!(
            states
                .get_account_state(Some(root))
                .err()
                .unwrap(),
            StateError::UnknownStateRoot(root)
        );
        assert!(states
            .get_world_state(None)
            .unwrap()
            .get_account(&ReservedAddresses::LEGACY_ACCOUNT)
            .unwrap()
            .state_root()
            .is_none());
    }

    #[test]
    fn test_from_json_snapshot() {
        let snapshot = StateSnapshot {
            blocks: vec![BlockSnapshot {
                hash: GENESIS,
                previous_hash: None,
                state: AccountStateDeltaSnapshot::from(&minted(42)),
            }],
        };
        let json = serde_json::to_string(&snapshot).unwrap();

        let states = MemoryBlockChainStates::from_json(&json).unwrap();

        assert!(states.contains_block(&GENESIS));
        assert_eq!(
            states
                .get_balance(&address(0xaa), &gold(), Some(GENESIS))
                .unwrap()
                .raw_value,
            42.into()
        );
    }
}

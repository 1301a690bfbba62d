use std::sync::Arc;

use tessera_common::{
    codec,
    models::{Address, BlockHash, HashDigest, Value},
    state::{AccountState, BlockChainStates, StateError, WorldState},
};

use super::{
    account::LocalCacheAccountState,
    store::{CacheStore, ABSENT},
};

/// Suffix of the legacy flag entry, distinct in length from any address.
const LEGACY_SUFFIX: &[u8] = b"__legacy";

fn account_root_key(block: &BlockHash, address: &Address) -> Vec<u8> {
    [block.as_bytes(), address.as_bytes()].concat()
}

fn legacy_key(block: &BlockHash) -> Vec<u8> {
    [block.as_bytes(), LEGACY_SUFFIX].concat()
}

/// Read-through cache of the account roots of a world at one block.
///
/// Accounts handed out are [`LocalCacheAccountState`] views, so reads through them are cached
/// as well.
pub struct LocalCacheWorldState {
    block: Option<BlockHash>,
    inner: Arc<dyn WorldState>,
    source: Arc<dyn BlockChainStates>,
    store: CacheStore,
}

impl LocalCacheWorldState {
    pub fn new(
        block: Option<BlockHash>,
        inner: Arc<dyn WorldState>,
        source: Arc<dyn BlockChainStates>,
        store: CacheStore,
    ) -> Self {
        Self { block, inner, source, store }
    }

    fn wrap(
        &self,
        root: Option<HashDigest>,
        account: Arc<dyn AccountState>,
    ) -> Arc<dyn AccountState> {
        Arc::new(LocalCacheAccountState::new(root, account, self.store.clone()))
    }
}

impl WorldState for LocalCacheWorldState {
    fn legacy(&self) -> Result<bool, StateError> {
        let Some(block) = &self.block else {
            return self.inner.legacy();
        };
        let legacy = self.store.get_or_fetch(
            "world_legacy",
            &legacy_key(block),
            || self.inner.legacy().map(Some),
            |legacy| codec::encode(&Value::Boolean(*legacy)),
            |bytes| match codec::decode(bytes)? {
                Value::Boolean(legacy) => Ok(legacy),
                other => {
                    Err(StateError::Unexpected(format!("cached flag is not a bool: {other}")))
                }
            },
        )?;
        Ok(legacy.unwrap_or_default())
    }

    fn get_account(&self, address: &Address) -> Result<Arc<dyn AccountState>, StateError> {
        let Some(block) = &self.block else {
            let account = self.inner.get_account(address)?;
            return Ok(self.wrap(account.state_root(), account));
        };

        let key = account_root_key(block, address);
        if let Some(cached) = self.store.get(&key)? {
            let root = match cached.as_slice() {
                [ABSENT] => None,
                bytes => Some(
                    HashDigest::from_slice(bytes)
                        .map_err(|err| StateError::Unexpected(err.to_string()))?,
                ),
            };
            let account = self.source.get_account_state(root)?;
            return Ok(self.wrap(root, account));
        }

        let account = self.inner.get_account(address)?;
        let root = account.state_root();
        match &root {
            Some(root) => self.store.insert(&key, root.as_bytes())?,
            None => self.store.insert(&key, &[ABSENT])?,
        }
        Ok(self.wrap(root, account))
    }
}

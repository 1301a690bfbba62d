//! Persistent read-through cache over committed chain state.
//!
//! Every lookup is keyed by the content hash it was resolved against (a state root or a block
//! hash) followed by a suffix naming the entry. Because a content hash never changes meaning,
//! entries are never invalidated or evicted. Absence is cached too, as a one byte marker.
//!
//! | entry          | key                                  | value                 |
//! |----------------|--------------------------------------|-----------------------|
//! | state          | state root ‖ address                 | encoded value         |
//! | balance        | state root ‖ address ‖ currency hash | encoded integer       |
//! | total supply   | state root ‖ currency hash           | encoded integer       |
//! | validator set  | state root ‖ `___`                   | encoded validator set |
//! | account root   | block hash ‖ address                 | state root            |
//! | legacy flag    | block hash ‖ `__legacy`              | encoded boolean       |
pub mod account;
pub mod store;
pub mod world;

use std::{path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};
use tessera_common::{
    models::{BlockHash, HashDigest},
    state::{AccountState, BlockChainStates, StateError, WorldState},
};
use tracing::instrument;

pub use self::{
    account::LocalCacheAccountState,
    store::{CacheStore, StorageError, ABSENT, CACHE_FILE_NAME},
    world::LocalCacheWorldState,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory the cache database lives in.
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { path: PathBuf::from(".tessera/cache") }
    }
}

/// A [`BlockChainStates`] that memoizes every lookup of `source` in a [`CacheStore`].
#[derive(Clone)]
pub struct LocalCacheBlockChainStates {
    source: Arc<dyn BlockChainStates>,
    store: CacheStore,
}

impl LocalCacheBlockChainStates {
    #[instrument(skip_all, fields(path = %config.path.display()))]
    pub fn open(
        source: Arc<dyn BlockChainStates>,
        config: &CacheConfig,
    ) -> Result<Self, StorageError> {
        Ok(Self::new(source, CacheStore::open(&config.path)?))
    }

    pub fn new(source: Arc<dyn BlockChainStates>, store: CacheStore) -> Self {
        Self { source, store }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }
}

impl BlockChainStates for LocalCacheBlockChainStates {
    fn get_world_state(
        &self,
        offset: Option<BlockHash>,
    ) -> Result<Arc<dyn WorldState>, StateError> {
        let inner = self.source.get_world_state(offset)?;
        Ok(Arc::new(LocalCacheWorldState::new(
            offset,
            inner,
            self.source.clone(),
            self.store.clone(),
        )))
    }

    fn get_account_state(
        &self,
        state_root: Option<HashDigest>,
    ) -> Result<Arc<dyn AccountState>, StateError> {
        let inner = self.source.get_account_state(state_root)?;
        Ok(Arc::new(LocalCacheAccountState::new(state_root, inner, self.store.clone())))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tessera_common::{
        models::{ReservedAddresses, Value},
        state::{MockAccountState, MockBlockChainStates, MockWorldState},
        testing::address,
    };

    use super::*;

    const BLOCK: BlockHash = BlockHash::new([1u8; 32]);
    const ROOT: HashDigest = HashDigest::new([2u8; 32]);

    #[test_log::test]
    fn test_repeated_block_queries_hit_the_backing_state_once() {
        let dir = TempDir::new().unwrap();
        let mut account = MockAccountState::new();
        account
            .expect_state_root()
            .return_const(Some(ROOT));
        account
            .expect_get_states()
            .times(1)
            .returning(|addresses| Ok(vec![Some(Value::from("v")); addresses.len()]));
        let account: Arc<dyn AccountState> = Arc::new(account);

        let mut world = MockWorldState::new();
        world
            .expect_get_account()
            .withf(|a| *a == ReservedAddresses::LEGACY_ACCOUNT)
            .times(1)
            .returning(move |_| Ok(account.clone()));
        let world: Arc<dyn WorldState> = Arc::new(world);

        let mut source = MockBlockChainStates::new();
        source
            .expect_get_world_state()
            .withf(|offset| *offset == Some(BLOCK))
            .times(2)
            .returning(move |_| Ok(world.clone()));
        // the second lookup resolves the cached root again, reads come from the cache
        source
            .expect_get_account_state()
            .withf(|root| *root == Some(ROOT))
            .times(1)
            .returning(|_| Ok(Arc::new(MockAccountState::new())));

        let states = LocalCacheBlockChainStates::open(
            Arc::new(source),
            &CacheConfig { path: dir.path().to_path_buf() },
        )
        .unwrap();

        for _ in 0..2 {
            assert_eq!(
                states
                    .get_states(&[address(1), address(2)], Some(BLOCK))
                    .unwrap(),
                vec![Some(Value::from("v")), Some(Value::from("v"))]
            );
        }
        assert!(dir
            .path()
            .join(CACHE_FILE_NAME)
            .exists());
    }
}

//! Storage backends for Tessera state views.
//!
//! [`cache`] memoizes lookups against any [`tessera_common::state::BlockChainStates`] in an
//! embedded database. [`memory`] is a self-contained in-memory implementation used for replays
//! and tests.
pub mod cache;
pub mod memory;

pub use cache::{CacheConfig, CacheStore, LocalCacheBlockChainStates, StorageError};
pub use memory::MemoryBlockChainStates;

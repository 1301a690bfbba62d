use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use metrics::counter;
use redb::{Database, ReadableTable, TableDefinition};
use tessera_common::state::StateError;
use thiserror::Error;
use tracing::{debug, trace};

const STATE_CACHE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("state_cache");

/// File created inside the configured cache directory.
pub const CACHE_FILE_NAME: &str = "state-cache.redb";

/// Stored in place of a value to remember that the backing state had none.
///
/// No encoded value is a single `x` byte, so the marker cannot be mistaken for a payload.
pub const ABSENT: u8 = b'x';

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Could not open state cache at {path}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("State cache backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for StateError {
    fn from(err: StorageError) -> Self {
        StateError::Storage(err.to_string())
    }
}

fn backend<E: Into<redb::Error>>(err: E) -> StorageError {
    StorageError::Backend(err.into().to_string())
}

/// A persistent byte-keyed cache.
///
/// Entries are written once and never invalidated: keys are prefixed with content hashes, so a
/// key always maps to the same value. The store is meant for a single writer; clones share the
/// same database handle.
#[derive(Clone)]
pub struct CacheStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl CacheStore {
    /// Opens or creates the cache inside `directory`.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, StorageError> {
        let directory = directory.as_ref();
        let path = directory.join(CACHE_FILE_NAME);
        let open_error =
            |reason: String| StorageError::Open { path: path.clone(), reason };

        fs::create_dir_all(directory).map_err(|err| open_error(err.to_string()))?;
        let db = Database::create(&path).map_err(|err| open_error(err.to_string()))?;

        let write = db.begin_write().map_err(backend)?;
        write
            .open_table(STATE_CACHE)
            .map_err(backend)?;
        write.commit().map_err(backend)?;

        debug!(path = %path.display(), "Opened state cache");
        Ok(Self { db: Arc::new(db), path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let read = self.db.begin_read().map_err(backend)?;
        let table = read
            .open_table(STATE_CACHE)
            .map_err(backend)?;
        let value = table.get(key).map_err(backend)?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let write = self.db.begin_write().map_err(backend)?;
        {
            let mut table = write
                .open_table(STATE_CACHE)
                .map_err(backend)?;
            table
                .insert(key, value)
                .map_err(backend)?;
        }
        write.commit().map_err(backend)
    }

    /// Returns the cached entry for `key`, or fetches, stores and returns it on a miss.
    ///
    /// `None` from `fetch` is cached as [`ABSENT`] and reported as `None` on later hits. Errors
    /// from `fetch` are not cached.
    pub fn get_or_fetch<T>(
        &self,
        kind: &'static str,
        key: &[u8],
        fetch: impl FnOnce() -> Result<Option<T>, StateError>,
        encode: impl Fn(&T) -> Vec<u8>,
        decode: impl Fn(&[u8]) -> Result<T, StateError>,
    ) -> Result<Option<T>, StateError> {
        if let Some(cached) = self.get(key)? {
            trace!(kind, key = hex::encode(key), "CacheHit");
            counter!("state_cache_hits", "kind" => kind).increment(1);
            return match cached.as_slice() {
                [ABSENT] => Ok(None),
                bytes => decode(bytes).map(Some),
            };
        }

        trace!(kind, key = hex::encode(key), "CacheMiss");
        counter!("state_cache_misses", "kind" => kind).increment(1);
        let fetched = fetch()?;
        match &fetched {
            Some(value) => self.insert(key, &encode(value))?,
            None => self.insert(key, &[ABSENT])?,
        }
        Ok(fetched)
    }
}

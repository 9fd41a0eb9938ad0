//! LMDB-backed persistent store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped,
//! transactional key-value store on local disk.
//!
//! # Layout
//!
//! Each value is stored as `[deadline: 8 bytes BE unix ms, 0 = none][payload]`.
//! LMDB has no native expiry, so reads hide entries past their deadline and
//! write transactions delete them when they come across one.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions with a single writer:
//! - Read transactions for `get` and `ttl`
//! - Write transactions for everything that renews, inserts or deletes, so a
//!   read-and-renew is one atomic step

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use std::path::PathBuf;
use std::time::Duration;

use crate::entry::Entry;
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::now_ms;

const STORE_NAME: &str = "lmdb";

/// Configuration for LmdbStore.
#[derive(Debug, Clone)]
pub struct LmdbStoreConfig {
    /// Directory where the LMDB files live. Created if missing.
    pub path: PathBuf,

    /// Maximum size of the memory map in megabytes.
    pub max_size_mb: usize,
}

impl LmdbStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LmdbStoreConfig {
            path: path.into(),
            ..Default::default()
        }
    }
}

impl Default for LmdbStoreConfig {
    fn default() -> Self {
        LmdbStoreConfig {
            path: PathBuf::from("cache"),
            max_size_mb: 1024,
        }
    }
}

/// Persistent embedded store on top of LMDB.
///
/// # Example
/// ```ignore
/// let store = LmdbStore::open(LmdbStoreConfig::new("/var/cache/app"))?;
/// store.set(b"user:42", b"Alice", Duration::from_secs(30)).await?;
/// ```
pub struct LmdbStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

fn txn_error(key: &[u8], err: impl std::fmt::Display) -> CacheError {
    CacheError::storage(STORE_NAME, key, err.to_string())
}

impl LmdbStore {
    /// Open (or create) the environment at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn open(config: LmdbStoreConfig) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&config.path)
            .map_err(|e| txn_error(b"", format!("failed to create {:?}: {}", config.path, e)))?;

        // SAFETY: the environment is opened once per store and the files are
        // not truncated or modified by anything else while it is mapped.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(config.max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(&config.path)
        }
        .map_err(|e| txn_error(b"", format!("failed to open environment: {}", e)))?;

        let mut wtxn = env.write_txn().map_err(|e| txn_error(b"", e))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| txn_error(b"", format!("failed to open database: {}", e)))?;
        wtxn.commit().map_err(|e| txn_error(b"", e))?;

        tracing::debug!(path = ?config.path, "opened lmdb store");
        Ok(LmdbStore { env, db })
    }

    /// Number of records on disk, including expired ones not yet deleted.
    pub fn len(&self) -> Result<u64, CacheError> {
        let rtxn = self.env.read_txn().map_err(|e| txn_error(b"", e))?;
        self.db.len(&rtxn).map_err(|e| txn_error(b"", e))
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Read a live entry inside a write transaction, deleting it if expired.
    fn live_entry(&self, wtxn: &mut RwTxn, key: &[u8]) -> Result<Option<Entry>, CacheError> {
        let raw = self
            .db
            .get(wtxn, key)
            .map_err(|e| txn_error(key, e))?
            .map(Entry::from_bytes)
            .transpose()?;

        match raw {
            Some(entry) if entry.is_expired(now_ms()) => {
                self.db.delete(wtxn, key).map_err(|e| txn_error(key, e))?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn put_entry(&self, wtxn: &mut RwTxn, key: &[u8], entry: &Entry) -> Result<(), CacheError> {
        self.db
            .put(wtxn, key, &entry.to_bytes())
            .map_err(|e| txn_error(key, e))
    }

    /// Run `f` in a write transaction and commit it.
    ///
    /// Entries deleted while sweeping an expired key are committed even when
    /// `f` reports a miss.
    fn update<T>(
        &self,
        key: &[u8],
        f: impl FnOnce(&mut RwTxn) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let mut wtxn = self.env.write_txn().map_err(|e| txn_error(key, e))?;
        let out = f(&mut wtxn)?;
        wtxn.commit().map_err(|e| txn_error(key, e))?;
        Ok(out)
    }

    fn view_entry(&self, key: &[u8]) -> Result<Option<Entry>, CacheError> {
        let rtxn = self.env.read_txn().map_err(|e| txn_error(key, e))?;
        let entry = self
            .db
            .get(&rtxn, key)
            .map_err(|e| txn_error(key, e))?
            .map(Entry::from_bytes)
            .transpose()?;
        Ok(entry.filter(|entry| !entry.is_expired(now_ms())))
    }

    fn touch_entry(&self, key: &[u8], ttl: Duration) -> Result<Option<Entry>, CacheError> {
        self.update(key, |wtxn| {
            let Some(mut entry) = self.live_entry(wtxn, key)? else {
                return Ok(None);
            };
            entry.renew(ttl);
            self.put_entry(wtxn, key, &entry)?;
            Ok(Some(entry))
        })
    }
}

#[async_trait]
impl Store for LmdbStore {
    fn name(&self) -> &'static str {
        STORE_NAME
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.view_entry(key)?.map(|entry| entry.value))
    }

    async fn get_touch(&self, key: &[u8], ttl: Duration) -> Result<Option<Vec<u8>>, CacheError> {
        if ttl.is_zero() {
            return self.get(key).await;
        }
        Ok(self.touch_entry(key, ttl)?.map(|entry| entry.value))
    }

    async fn set(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry::new(value.to_vec(), ttl);
        self.update(key, |wtxn| self.put_entry(wtxn, key, &entry))
    }

    async fn delete(&self, key: &[u8]) -> Result<(), CacheError> {
        self.update(key, |wtxn| {
            self.db.delete(wtxn, key).map_err(|e| txn_error(key, e))?;
            Ok(())
        })
    }

    async fn exists(&self, key: &[u8], touch: Duration) -> Result<bool, CacheError> {
        if touch.is_zero() {
            return Ok(self.view_entry(key)?.is_some());
        }
        Ok(self.touch_entry(key, touch)?.is_some())
    }

    async fn mark(&self, key: &[u8], ttl: Duration) -> Result<bool, CacheError> {
        self.update(key, |wtxn| match self.live_entry(wtxn, key)? {
            Some(mut entry) => {
                entry.renew(ttl);
                self.put_entry(wtxn, key, &entry)?;
                Ok(true)
            }
            None => {
                self.put_entry(wtxn, key, &Entry::new(Vec::new(), ttl))?;
                Ok(false)
            }
        })
    }

    async fn ttl(&self, key: &[u8]) -> Result<Option<Duration>, CacheError> {
        Ok(self.view_entry(key)?.map(|entry| entry.remaining()))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.update(b"", |wtxn| {
            self.db.clear(wtxn).map_err(|e| txn_error(b"", e))
        })?;
        tracing::debug!("cleared lmdb store");
        Ok(())
    }
}

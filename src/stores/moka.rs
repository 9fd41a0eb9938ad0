use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::time::{Duration, Instant};

use crate::entry::Entry;
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::now_ms;

/// Configuration for MokaStore.
#[derive(Debug, Clone)]
pub struct MokaStoreConfig {
    /// Maximum number of entries the cache can hold.
    pub max_capacity: u64,

    /// Time to idle: entries are expired if not accessed within this duration.
    /// `None` means entries don't expire based on idle time.
    pub time_to_idle: Option<Duration>,
}

impl Default for MokaStoreConfig {
    fn default() -> Self {
        MokaStoreConfig {
            max_capacity: 10_000,
            time_to_idle: None,
        }
    }
}

/// Per-entry expiry driven by the deadline carried in each [`Entry`].
struct EntryExpiry;

impl EntryExpiry {
    fn until_deadline(entry: &Entry) -> Option<Duration> {
        entry
            .expires_at
            .map(|deadline| Duration::from_millis((deadline - now_ms()).max(0) as u64))
    }
}

impl Expiry<Vec<u8>, Entry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &Vec<u8>,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Self::until_deadline(value)
    }

    fn expire_after_update(
        &self,
        _key: &Vec<u8>,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Self::until_deadline(value)
    }
}

/// High-performance bounded in-memory store using Moka.
///
/// MokaStore provides:
/// - Lock-free concurrent access for reads and writes
/// - Per-entry expiration from each write's ttl
/// - Size-bounded eviction once `max_capacity` is reached
///
/// Read-and-renew uses Moka's atomic compute API, so a renewal cannot race
/// with a concurrent removal of the same key.
pub struct MokaStore {
    cache: Cache<Vec<u8>, Entry>,
}

impl MokaStore {
    /// Create a new MokaStore with the given configuration.
    ///
    /// # Example
    /// ```ignore
    /// let config = MokaStoreConfig {
    ///     max_capacity: 10_000,
    ///     time_to_idle: Some(Duration::from_secs(600)),
    /// };
    /// let store = MokaStore::new(config);
    /// ```
    pub fn new(config: MokaStoreConfig) -> Self {
        let mut builder = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(EntryExpiry);

        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        MokaStore {
            cache: builder.build(),
        }
    }

    /// Get cache statistics (for monitoring/debugging).
    pub fn stats(&self) -> (u64, u64) {
        let entry_count = self.cache.entry_count();
        let weighted_size = self.cache.weighted_size();
        (entry_count, weighted_size)
    }

    /// Atomically apply `renew` to a live entry and return its value.
    async fn compute_live<F>(&self, key: &[u8], renew: F) -> Option<Entry>
    where
        F: FnOnce(&mut Entry) + Send,
    {
        let now = now_ms();
        let result = self
            .cache
            .entry(key.to_vec())
            .and_compute_with(|current| {
                let op = match current {
                    None => Op::Nop,
                    Some(found) if found.value().is_expired(now) => Op::Remove,
                    Some(found) => {
                        let mut entry = found.into_value();
                        renew(&mut entry);
                        Op::Put(entry)
                    }
                };
                std::future::ready(op)
            })
            .await;

        match result {
            CompResult::ReplacedWith(entry) => Some(entry.into_value()),
            _ => None,
        }
    }
}

impl Default for MokaStore {
    fn default() -> Self {
        Self::new(MokaStoreConfig::default())
    }
}

#[async_trait]
impl Store for MokaStore {
    fn name(&self) -> &'static str {
        "moka"
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
        match self.cache.get(key).await {
            Some(entry) => {
                // Moka expires lazily; the deadline is authoritative
                if entry.is_expired(now_ms()) {
                    self.cache.invalidate(key).await;
                    return Ok(None);
                }
                Ok(Some(entry.value))
            }
            None => Ok(None),
        }
    }

    async fn get_touch(&self, key: &[u8], ttl: Duration) -> Result<Option<Vec<u8>>, CacheError> {
        if ttl.is_zero() {
            return self.get(key).await;
        }
        let entry = self.compute_live(key, |entry| entry.renew(ttl)).await;
        Ok(entry.map(|entry| entry.value))
    }

    async fn set(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(key.to_vec(), Entry::new(value.to_vec(), ttl))
            .await;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn exists(&self, key: &[u8], touch: Duration) -> Result<bool, CacheError> {
        if touch.is_zero() {
            return Ok(self.get(key).await?.is_some());
        }
        Ok(self.compute_live(key, |entry| entry.renew(touch)).await.is_some())
    }

    async fn mark(&self, key: &[u8], ttl: Duration) -> Result<bool, CacheError> {
        let now = now_ms();
        let mut existed = false;
        self.cache
            .entry(key.to_vec())
            .and_compute_with(|current| {
                let op = match current {
                    Some(found) if !found.value().is_expired(now) => {
                        existed = true;
                        let mut entry = found.into_value();
                        entry.renew(ttl);
                        Op::Put(entry)
                    }
                    _ => Op::Put(Entry::new(Vec::new(), ttl)),
                };
                std::future::ready(op)
            })
            .await;

        Ok(existed)
    }

    async fn ttl(&self, key: &[u8]) -> Result<Option<Duration>, CacheError> {
        let now = now_ms();
        Ok(self
            .cache
            .get(key)
            .await
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.remaining()))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

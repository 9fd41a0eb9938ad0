use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::entry::Entry;
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::{now_ms, rand_simple};

/// Configuration for eviction on set operations.
#[derive(Debug, Clone)]
pub struct EvictOnSetConfig {
    /// Provide a number between 0 and 1 to calculate whether eviction should run on each set.
    ///
    /// - `1.0` -> run eviction on every `set`
    /// - `0.5` -> run eviction on every 2nd `set` (on average)
    /// - `0.0` -> disable eviction
    pub frequency: f64,

    /// Remove items until the number of items in the map is lower than `max_items`.
    pub max_items: usize,
}

/// Configuration for MemoryStore.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreConfig {
    /// Remove expired entries on `set` operations.
    pub evict_on_set: Option<EvictOnSetConfig>,
}

/// Thread-safe in-memory store using a HashMap behind a RwLock.
///
/// This is the store used when no path is configured. Reads take the shared
/// lock; every read-modify-write (renewal, probe-and-mark) runs under the
/// exclusive lock, which gives each operation transactional isolation.
pub struct MemoryStore {
    state: RwLock<HashMap<Vec<u8>, Entry>>,
    evict_on_set: Option<EvictOnSetConfig>,
}

impl MemoryStore {
    /// Create a new MemoryStore with the given configuration.
    pub fn new(config: MemoryStoreConfig) -> Self {
        MemoryStore {
            state: RwLock::new(HashMap::new()),
            evict_on_set: config.evict_on_set,
        }
    }

    /// Number of entries held, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run eviction if configured and random check passes.
    async fn maybe_evict(&self) {
        let Some(ref config) = self.evict_on_set else {
            return;
        };

        if config.frequency <= 0.0 {
            return;
        }

        let should_evict = config.frequency >= 1.0 || rand_simple() < config.frequency;
        if !should_evict {
            return;
        }

        let mut state = self.state.write().await;
        let now = now_ms();

        // First delete all expired entries
        state.retain(|_, entry| !entry.is_expired(now));

        // If still over max_items, drop the entries closest to expiry.
        // Entries without a deadline go last.
        if state.len() > config.max_items {
            let mut entries: Vec<_> = state
                .iter()
                .map(|(k, v)| (k.clone(), v.expires_at.unwrap_or(i64::MAX)))
                .collect();
            entries.sort_by_key(|(_, expires)| *expires);

            let to_remove = state.len() - config.max_items;
            for (key, _) in entries.into_iter().take(to_remove) {
                state.remove(&key);
            }
            tracing::debug!(removed = to_remove, "memory store evicted entries over capacity");
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

/// Look up a live entry, dropping it if it has expired.
fn live_entry<'a>(state: &'a mut HashMap<Vec<u8>, Entry>, key: &[u8]) -> Option<&'a mut Entry> {
    let now = now_ms();
    if state.get(key).is_some_and(|entry| entry.is_expired(now)) {
        state.remove(key);
        return None;
    }
    state.get_mut(key)
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
        let state = self.state.read().await;

        let Some(entry) = state.get(key) else {
            return Ok(None);
        };

        if entry.is_expired(now_ms()) {
            // Entry is expired, remove it
            drop(state);
            let mut state = self.state.write().await;
            live_entry(&mut state, key);
            return Ok(None);
        }

        Ok(Some(entry.value.clone()))
    }

    async fn get_touch(&self, key: &[u8], ttl: Duration) -> Result<Option<Vec<u8>>, CacheError> {
        if ttl.is_zero() {
            return self.get(key).await;
        }

        let mut state = self.state.write().await;
        Ok(live_entry(&mut state, key).map(|entry| {
            entry.renew(ttl);
            entry.value.clone()
        }))
    }

    async fn set(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        {
            let mut state = self.state.write().await;
            state.insert(key.to_vec(), Entry::new(value.to_vec(), ttl));
        }

        self.maybe_evict().await;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &[u8], touch: Duration) -> Result<bool, CacheError> {
        if touch.is_zero() {
            return Ok(self.get(key).await?.is_some());
        }

        let mut state = self.state.write().await;
        match live_entry(&mut state, key) {
            Some(entry) => {
                entry.renew(touch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark(&self, key: &[u8], ttl: Duration) -> Result<bool, CacheError> {
        let existed = {
            let mut state = self.state.write().await;
            match live_entry(&mut state, key) {
                Some(entry) => {
                    entry.renew(ttl);
                    true
                }
                None => {
                    state.insert(key.to_vec(), Entry::new(Vec::new(), ttl));
                    false
                }
            }
        };

        if !existed {
            self.maybe_evict().await;
        }
        Ok(existed)
    }

    async fn ttl(&self, key: &[u8]) -> Result<Option<Duration>, CacheError> {
        let state = self.state.read().await;
        let now = now_ms();
        Ok(state
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(Entry::remaining))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.state.write().await.clear();
        Ok(())
    }
}

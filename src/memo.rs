use std::error::Error as StdError;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::{Codec, Encode};
use crate::error::CacheError;
use crate::flight::SingleFlight;
use crate::keys::group_key;
use crate::kv::Kv;
use crate::lock::KeyLocks;
use crate::store::Store;
use crate::utils::display_key;

/// Coalesced callers share the stored bytes and decode them each.
type Stored = Arc<[u8]>;

/// How concurrent misses on the same key are de-duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dedup {
    /// One caller computes and stores; everybody waiting gets its result.
    #[default]
    Coalesce,
    /// Callers take turns under a per-key lock. The first computes and
    /// stores; the others find the stored value on their re-read.
    KeyLock,
}

/// Policy for [`Memo`].
#[derive(Debug, Clone)]
pub struct MemoConfig {
    pub dedup: Dedup,

    /// When a ttl is given, renew the entry to that ttl on every hit. The
    /// renewal happens in the same store transaction as the read.
    pub touch_on_hit: bool,
}

impl Default for MemoConfig {
    fn default() -> Self {
        MemoConfig {
            dedup: Dedup::Coalesce,
            touch_on_hit: true,
        }
    }
}

/// Compute-if-absent cache over a [`Store`].
///
/// `get_or_store` returns the stored value for a key, or runs the producer,
/// stores its result and returns it. Among callers racing on the same absent
/// key the producer runs once per miss; later callers read the stored value.
///
/// Dereferences to [`Kv`] for the plain accessors.
///
/// # Example
/// ```ignore
/// let memo = Memo::new(Arc::new(MemoryStore::default()));
///
/// let name: String = memo
///     .get_or_store_with_ttl("user:42", || async { load_name(42).await }, Duration::from_secs(30))
///     .await?;
/// ```
#[derive(Clone)]
pub struct Memo {
    kv: Kv,
    locks: KeyLocks,
    flights: SingleFlight<Stored>,
    config: MemoConfig,
}

impl Memo {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, MemoConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: MemoConfig) -> Self {
        Memo {
            kv: Kv::new(store),
            locks: KeyLocks::new(),
            flights: SingleFlight::new(),
            config,
        }
    }

    pub fn config(&self) -> &MemoConfig {
        &self.config
    }

    pub fn kv(&self) -> &Kv {
        &self.kv
    }

    /// Keys with a miss currently being resolved.
    pub fn pending(&self) -> usize {
        match self.config.dedup {
            Dedup::Coalesce => self.flights.in_flight(),
            Dedup::KeyLock => self.locks.len(),
        }
    }

    /// Return the value stored under `key`, computing and storing it without
    /// expiry on a miss.
    pub async fn get_or_store<K, V, F, Fut, E>(&self, key: &K, producer: F) -> Result<V, CacheError>
    where
        K: Encode + ?Sized,
        V: Codec + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        self.get_or_store_with_ttl(key, producer, Duration::ZERO).await
    }

    /// Return the value stored under `key`, computing and storing it with
    /// `ttl` on a miss. A zero ttl never expires.
    ///
    /// With `touch_on_hit`, a hit renews the entry to `ttl`.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Encoding`] / [`CacheError::Decoding`] when the key or
    ///   value cannot go through the codec
    /// - [`CacheError::Storage`] when the store fails
    /// - [`CacheError::Producer`] when the producer fails; nothing is stored
    ///   and the next call runs the producer again
    pub async fn get_or_store_with_ttl<K, V, F, Fut, E>(
        &self,
        key: &K,
        producer: F,
        ttl: Duration,
    ) -> Result<V, CacheError>
    where
        K: Encode + ?Sized,
        V: Codec + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let key = key.encode()?;
        let touch = self.touch_for(ttl);

        if let Some(bytes) = self.kv.get_raw(&key, touch).await? {
            tracing::trace!(key = %display_key(&key), "hit");
            return V::decode(&bytes);
        }

        tracing::debug!(key = %display_key(&key), dedup = ?self.config.dedup, "miss");

        match self.config.dedup {
            Dedup::KeyLock => {
                let _guard = self.locks.acquire(&key).await;
                let bytes = fill(&self.kv, &key, producer, ttl, touch).await?;
                V::decode(&bytes)
            }
            Dedup::Coalesce => {
                let group = group_key(&key);
                let kv = self.kv.clone();

                let shared = self
                    .flights
                    .run(&group, move || async move {
                        let bytes = fill(&kv, &key, producer, ttl, touch).await?;
                        Ok(Stored::from(bytes))
                    })
                    .await?;

                V::decode(&shared)
            }
        }
    }

    fn touch_for(&self, ttl: Duration) -> Duration {
        if self.config.touch_on_hit {
            ttl
        } else {
            Duration::ZERO
        }
    }
}

impl Deref for Memo {
    type Target = Kv;

    fn deref(&self) -> &Kv {
        &self.kv
    }
}

/// The critical section: re-read, then compute and store on a confirmed miss.
/// Returns the bytes now stored under `key`.
async fn fill<V, F, Fut, E>(
    kv: &Kv,
    key: &[u8],
    producer: F,
    ttl: Duration,
    touch: Duration,
) -> Result<Vec<u8>, CacheError>
where
    V: Encode,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    // Someone else may have stored it while we waited
    if let Some(bytes) = kv.get_raw(key, touch).await? {
        tracing::trace!(key = %display_key(key), "hit after wait");
        return Ok(bytes);
    }

    tracing::debug!(key = %display_key(key), ttl_ms = ttl.as_millis() as u64, "running producer");
    let value = producer().await.map_err(CacheError::producer)?;

    let bytes = value.encode()?;
    kv.set_raw(key, &bytes, ttl).await?;
    Ok(bytes)
}

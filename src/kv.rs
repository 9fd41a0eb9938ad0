use std::sync::Arc;
use std::time::Duration;

use crate::codec::{Decode, Encode};
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::display_key;

/// Typed key-value accessors over a [`Store`].
///
/// Keys and values go through the [codec](crate::codec) on the way in and
/// out; every call is exactly one store transaction. `Kv` is a cheap handle:
/// clones share the same store.
///
/// # Example
/// ```ignore
/// let kv = Kv::new(Arc::new(MemoryStore::default()));
///
/// kv.set_with_ttl("user:42", "Alice", Duration::from_secs(30)).await?;
/// let name: Option<String> = kv.get("user:42").await?;
/// ```
#[derive(Clone)]
pub struct Kv {
    store: Arc<dyn Store>,
}

impl Kv {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Kv { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Store a value without expiry.
    pub async fn set<K, V>(&self, key: &K, value: &V) -> Result<(), CacheError>
    where
        K: Encode + ?Sized,
        V: Encode + ?Sized,
    {
        self.set_with_ttl(key, value, Duration::ZERO).await
    }

    /// Store a value that expires `ttl` from now. A zero ttl never expires.
    pub async fn set_with_ttl<K, V>(&self, key: &K, value: &V, ttl: Duration) -> Result<(), CacheError>
    where
        K: Encode + ?Sized,
        V: Encode + ?Sized,
    {
        let key = key.encode()?;
        let value = value.encode()?;
        self.set_raw(&key, &value, ttl).await
    }

    /// Store a marker key with an empty value.
    pub async fn set_key<K: Encode + ?Sized>(&self, key: &K) -> Result<(), CacheError> {
        self.set_key_with_ttl(key, Duration::ZERO).await
    }

    pub async fn set_key_with_ttl<K: Encode + ?Sized>(
        &self,
        key: &K,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = key.encode()?;
        self.set_raw(&key, &[], ttl).await
    }

    /// Read and decode a value. A missing key is `Ok(None)`.
    pub async fn get<K, V>(&self, key: &K) -> Result<Option<V>, CacheError>
    where
        K: Encode + ?Sized,
        V: Decode,
    {
        self.get_touch(key, Duration::ZERO).await
    }

    /// Read and decode a value, renewing it to expire `ttl` from now in the
    /// same transaction.
    pub async fn get_touch<K, V>(&self, key: &K, ttl: Duration) -> Result<Option<V>, CacheError>
    where
        K: Encode + ?Sized,
        V: Decode,
    {
        let key = key.encode()?;
        match self.get_raw(&key, ttl).await? {
            Some(bytes) => Ok(Some(V::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn exists<K: Encode + ?Sized>(&self, key: &K) -> Result<bool, CacheError> {
        self.exists_touch(key, Duration::ZERO).await
    }

    /// Check for the key and renew it when present.
    pub async fn exists_touch<K: Encode + ?Sized>(
        &self,
        key: &K,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let key = key.encode()?;
        self.store.exists(&key, ttl).await
    }

    /// Report whether the key existed, leaving a persistent marker behind if
    /// it did not.
    pub async fn mark<K: Encode + ?Sized>(&self, key: &K) -> Result<bool, CacheError> {
        self.mark_with_ttl(key, Duration::ZERO).await
    }

    /// Report whether the key existed. A missing key becomes a marker that
    /// expires after `ttl`; an existing one keeps its value and is renewed.
    pub async fn mark_with_ttl<K: Encode + ?Sized>(
        &self,
        key: &K,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let key = key.encode()?;
        let existed = self.store.mark(&key, ttl).await?;
        tracing::trace!(key = %display_key(&key), existed, "mark");
        Ok(existed)
    }

    pub async fn del<K: Encode + ?Sized>(&self, key: &K) -> Result<(), CacheError> {
        let key = key.encode()?;
        self.store.delete(&key).await
    }

    /// Remaining lifetime: `None` when absent, `Some(Duration::ZERO)` when the
    /// entry never expires.
    pub async fn ttl<K: Encode + ?Sized>(&self, key: &K) -> Result<Option<Duration>, CacheError> {
        let key = key.encode()?;
        self.store.ttl(&key).await
    }

    /// Remove every entry from the store.
    pub async fn clear(&self) -> Result<(), CacheError> {
        tracing::debug!(store = self.store.name(), "clearing store");
        self.store.clear().await
    }

    pub(crate) async fn get_raw(
        &self,
        key: &[u8],
        touch: Duration,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let result = if touch.is_zero() {
            self.store.get(key).await
        } else {
            self.store.get_touch(key, touch).await
        };

        if let Err(ref err) = result {
            tracing::warn!(store = self.store.name(), key = %display_key(key), error = %err, "store read failed");
        }
        result
    }

    pub(crate) async fn set_raw(
        &self,
        key: &[u8],
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let result = self.store.set(key, value, ttl).await;
        if let Err(ref err) = result {
            tracing::warn!(store = self.store.name(), key = %display_key(key), error = %err, "store write failed");
        }
        result
    }
}

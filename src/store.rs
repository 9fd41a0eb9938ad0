use async_trait::async_trait;
use std::time::Duration;

use crate::error::CacheError;

/// A store is a common interface for reading, writing and deleting raw
/// key-value pairs with an optional expiry.
///
/// Every method is a single transaction against the backend. A missing key is
/// never an error: it is reported as `None` or `false`. Failures are surfaced
/// as [`CacheError::Storage`] and are not retried here.
///
/// A ttl of `Duration::ZERO` means "no expiration". The store implementation
/// is responsible for hiding and cleaning up expired data on its own.
#[async_trait]
pub trait Store: Send + Sync {
    /// A name for metrics/tracing.
    ///
    /// # Example
    /// - "memory"
    /// - "lmdb"
    /// - "redis"
    fn name(&self) -> &'static str;

    /// Return the stored bytes, or `None` for a miss.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError>;

    /// Return the stored bytes and renew the entry to expire `ttl` from now.
    ///
    /// The read and the renewal happen in the same transaction, so a
    /// concurrent delete can never slip in between them. The value itself is
    /// left untouched. A zero ttl behaves like [`Store::get`].
    async fn get_touch(&self, key: &[u8], ttl: Duration) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write the value, replacing any previous entry and its expiry.
    async fn set(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Remove the key. Removing a missing key succeeds.
    async fn delete(&self, key: &[u8]) -> Result<(), CacheError>;

    /// Check whether the key exists, renewing it to `touch` from now when it
    /// does and `touch` is non-zero. Probe and renewal share one transaction.
    async fn exists(&self, key: &[u8], touch: Duration) -> Result<bool, CacheError>;

    /// Report whether the key existed, creating an empty marker entry with
    /// `ttl` when it did not. An existing entry keeps its value and is renewed
    /// when `ttl` is non-zero. One transaction.
    async fn mark(&self, key: &[u8], ttl: Duration) -> Result<bool, CacheError>;

    /// Remaining lifetime of the key.
    ///
    /// `None` for a missing key, `Some(Duration::ZERO)` for an entry without
    /// expiry.
    async fn ttl(&self, key: &[u8]) -> Result<Option<Duration>, CacheError>;

    /// Remove every entry owned by this store.
    async fn clear(&self) -> Result<(), CacheError>;
}

//! Configuration and assembly of [`Memo`] instances.
//!
//! A [`KvConfig`] picks the backend and the de-duplication policy, usually
//! from the environment; [`MemoBuilder`] turns it (or a store you already
//! have) into a ready-to-use [`Memo`].

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::CacheError;
use crate::memo::{Dedup, Memo, MemoConfig};
use crate::store::Store;
use crate::stores::lmdb::{LmdbStore, LmdbStoreConfig};
use crate::stores::memory::{MemoryStore, MemoryStoreConfig};
use crate::stores::metrics::{MetricsSink, MetricsStore};
use crate::stores::moka::{MokaStore, MokaStoreConfig};
use crate::stores::redis::{RedisStore, RedisStoreConfig};

/// Which backend to open, with its settings.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Memory(MemoryStoreConfig),
    Moka(MokaStoreConfig),
    Lmdb(LmdbStoreConfig),
    Redis(RedisStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory(MemoryStoreConfig::default())
    }
}

impl StoreConfig {
    /// Open the configured backend.
    pub async fn open(&self) -> Result<Arc<dyn Store>, CacheError> {
        let store: Arc<dyn Store> = match self {
            StoreConfig::Memory(config) => Arc::new(MemoryStore::new(config.clone())),
            StoreConfig::Moka(config) => Arc::new(MokaStore::new(config.clone())),
            StoreConfig::Lmdb(config) => Arc::new(LmdbStore::open(config.clone())?),
            StoreConfig::Redis(config) => Arc::new(RedisStore::new(config.clone()).await?),
        };

        tracing::info!(store = store.name(), "store opened");
        Ok(store)
    }
}

/// Full configuration for a [`Memo`].
#[derive(Debug, Clone, Default)]
pub struct KvConfig {
    pub store: StoreConfig,
    pub memo: MemoConfig,
}

impl KvConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `KV_REDIS_URL`: use Redis at this URL (takes precedence over a path)
    /// - `KV_REDIS_PREFIX`: key prefix for Redis (default: `kv:`)
    /// - `KV_CACHE_PATH`: LMDB directory; empty or unset keeps data in memory
    /// - `KV_DEDUP`: `coalesce` (default) or `lock`
    /// - `KV_TOUCH_ON_HIT`: renew entries on hit (default: true)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`KvConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = MemoConfig::default();

        let store = if let Some(url) = var("KV_REDIS_URL") {
            let defaults = RedisStoreConfig::default();
            StoreConfig::Redis(RedisStoreConfig {
                url,
                prefix: var("KV_REDIS_PREFIX").unwrap_or(defaults.prefix),
            })
        } else if let Some(path) = var("KV_CACHE_PATH") {
            StoreConfig::Lmdb(LmdbStoreConfig::new(PathBuf::from(path)))
        } else {
            StoreConfig::default()
        };

        let dedup = match var("KV_DEDUP").as_deref().map(str::trim) {
            Some("lock") | Some("key_lock") => Dedup::KeyLock,
            Some("coalesce") | None => Dedup::Coalesce,
            Some(other) => {
                tracing::warn!(value = other, "unknown KV_DEDUP, using coalesce");
                Dedup::Coalesce
            }
        };

        let touch_on_hit = var("KV_TOUCH_ON_HIT")
            .map(|s| matches!(s.trim(), "true" | "1" | "yes"))
            .unwrap_or(defaults.touch_on_hit);

        KvConfig {
            store,
            memo: MemoConfig {
                dedup,
                touch_on_hit,
            },
        }
    }
}

/// Builder for [`Memo`].
///
/// # Example
///
/// ```ignore
/// use kv_memo::{Dedup, MemoBuilder, MokaStore};
/// use std::sync::Arc;
///
/// let memo = MemoBuilder::new()
///     .store(Arc::new(MokaStore::default()))
///     .dedup(Dedup::KeyLock)
///     .metrics(sink)
///     .build();
///
/// // Or straight from the environment
/// let memo = MemoBuilder::open(&KvConfig::from_env()).await?;
/// ```
#[derive(Default)]
pub struct MemoBuilder {
    store: Option<Arc<dyn Store>>,
    config: MemoConfig,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl MemoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the backend described by `config` and build a [`Memo`] on it.
    pub async fn open(config: &KvConfig) -> Result<Memo, CacheError> {
        let store = config.store.open().await?;
        Ok(MemoBuilder::new()
            .store(store)
            .config(config.memo.clone())
            .build())
    }

    /// Use this store. Defaults to a fresh [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: MemoConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dedup(mut self, dedup: Dedup) -> Self {
        self.config.dedup = dedup;
        self
    }

    pub fn touch_on_hit(mut self, touch_on_hit: bool) -> Self {
        self.config.touch_on_hit = touch_on_hit;
        self
    }

    /// Report every store operation to `sink`.
    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn build(self) -> Memo {
        let mut store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::default()));

        if let Some(sink) = self.metrics {
            store = Arc::new(MetricsStore::new(store, sink));
        }

        Memo::with_config(store, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::metrics::StoreMetric;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_defaults_to_memory() {
        let config = KvConfig::from_lookup(lookup(&[("KV_CACHE_PATH", "")]));

        assert!(matches!(config.store, StoreConfig::Memory(_)));
        assert_eq!(config.memo.dedup, Dedup::Coalesce);
        assert!(config.memo.touch_on_hit);
    }

    #[test]
    fn test_from_lookup_path_selects_lmdb() {
        let config = KvConfig::from_lookup(lookup(&[
            ("KV_CACHE_PATH", "/var/cache/app"),
            ("KV_DEDUP", "lock"),
            ("KV_TOUCH_ON_HIT", "false"),
        ]));

        match config.store {
            StoreConfig::Lmdb(lmdb) => assert_eq!(lmdb.path, PathBuf::from("/var/cache/app")),
            other => panic!("expected lmdb, got {:?}", other),
        }
        assert_eq!(config.memo.dedup, Dedup::KeyLock);
        assert!(!config.memo.touch_on_hit);
    }

    #[test]
    fn test_from_lookup_redis_wins() {
        let config = KvConfig::from_lookup(lookup(&[
            ("KV_CACHE_PATH", "/var/cache/app"),
            ("KV_REDIS_URL", "redis://cache:6379"),
            ("KV_REDIS_PREFIX", "svc:"),
            ("KV_DEDUP", "bogus"),
        ]));

        match config.store {
            StoreConfig::Redis(redis) => {
                assert_eq!(redis.url, "redis://cache:6379");
                assert_eq!(redis.prefix, "svc:");
            }
            other => panic!("expected redis, got {:?}", other),
        }
        assert_eq!(config.memo.dedup, Dedup::Coalesce);
    }

    #[tokio::test]
    async fn test_open_memory() {
        let memo = MemoBuilder::open(&KvConfig::default()).await.unwrap();
        assert_eq!(memo.store().name(), "memory");

        let value: u64 = memo
            .get_or_store("answer", || async { Ok::<_, CacheError>(42u64) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_open_lmdb() {
        let dir = tempfile::tempdir().unwrap();
        let config = KvConfig {
            store: StoreConfig::Lmdb(LmdbStoreConfig {
                path: dir.path().to_path_buf(),
                max_size_mb: 16,
            }),
            memo: MemoConfig {
                dedup: Dedup::KeyLock,
                ..Default::default()
            },
        };

        let memo = MemoBuilder::open(&config).await.unwrap();
        assert_eq!(memo.store().name(), "lmdb");
        assert_eq!(memo.config().dedup, Dedup::KeyLock);
    }

    struct CountingSink {
        metrics: Mutex<Vec<StoreMetric>>,
    }

    #[async_trait]
    impl MetricsSink for CountingSink {
        fn emit(&self, metric: StoreMetric) {
            self.metrics.lock().unwrap().push(metric);
        }

        async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_builder_wraps_store_with_metrics() {
        let sink = Arc::new(CountingSink {
            metrics: Mutex::new(Vec::new()),
        });
        let memo = MemoBuilder::new()
            .store(Arc::new(MokaStore::default()))
            .touch_on_hit(false)
            .metrics(sink.clone())
            .build();

        assert_eq!(memo.store().name(), "metrics");
        assert!(!memo.config().touch_on_hit);

        let _: String = memo
            .get_or_store("k", || async { Ok::<_, CacheError>("v".to_string()) })
            .await
            .unwrap();

        let metrics = sink.metrics.lock().unwrap();
        // fast-path miss, re-read miss, write
        assert_eq!(metrics.len(), 3);
        assert!(matches!(metrics[0], StoreMetric::Read { hit: false, .. }));
        assert!(matches!(metrics[2], StoreMetric::Write { .. }));
    }
}

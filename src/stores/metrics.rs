//! Metrics middleware for stores.
//!
//! This module provides a `MetricsStore` wrapper that emits an event for
//! every store operation (reads, writes, removes, clears) to a user-provided
//! sink.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kv_memo::{MemoBuilder, MokaStore, Store};
//! use kv_memo::{MetricsSink, MetricsStore, StoreMetric};
//!
//! // Create metrics sink
//! let sink = Arc::new(MyMetricsSink::new());
//!
//! // Wrap store with metrics
//! let moka: Arc<dyn Store> = Arc::new(MokaStore::default());
//! let store: Arc<dyn Store> = Arc::new(MetricsStore::new(moka, sink.clone()));
//!
//! // Use in Memo - metrics emitted automatically
//! let memo = MemoBuilder::new().store(store).build();
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::CacheError;
use crate::store::Store;
use crate::utils::display_key;

/// Metrics emitted by the MetricsStore wrapper.
#[derive(Debug, Clone)]
pub enum StoreMetric {
    /// Emitted on `get`, `get_touch`, `exists` and `ttl`.
    Read {
        /// The key that was read, printable form.
        key: String,
        /// Whether the key was found.
        hit: bool,
        /// Whether the read also renewed the entry's expiry.
        touched: bool,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the wrapped store (from Store::name()).
        store: String,
    },
    /// Emitted on `set` and `mark`.
    Write {
        /// The key that was written, printable form.
        key: String,
        /// Encoded size of the value in bytes (0 for markers).
        bytes: usize,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the wrapped store (from Store::name()).
        store: String,
    },
    /// Emitted on `delete`.
    Remove {
        /// The key that was removed, printable form.
        key: String,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the wrapped store (from Store::name()).
        store: String,
    },
    /// Emitted on `clear`.
    Clear {
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the wrapped store (from Store::name()).
        store: String,
    },
}

/// Trait for receiving store metrics.
///
/// Implement this trait to collect metrics from `MetricsStore`.
///
/// # Example
///
/// ```ignore
/// use std::sync::Mutex;
/// use async_trait::async_trait;
/// use kv_memo::{MetricsSink, StoreMetric};
///
/// struct BufferedSink {
///     buffer: Mutex<Vec<StoreMetric>>,
/// }
///
/// #[async_trait]
/// impl MetricsSink for BufferedSink {
///     fn emit(&self, metric: StoreMetric) {
///         self.buffer.lock().unwrap().push(metric);
///     }
///
///     async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///         // Send buffered metrics to your backend
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Emit a single metric.
    ///
    /// This is called synchronously in the hot path of store operations.
    /// Implementations should be fast (e.g., buffer metrics in memory).
    fn emit(&self, metric: StoreMetric);

    /// Flush any buffered metrics.
    ///
    /// Typically called at shutdown or at periodic intervals.
    async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A store wrapper that emits metrics for all operations.
///
/// Events are emitted whether the wrapped call succeeded or failed; a failed
/// read counts as a miss.
pub struct MetricsStore {
    inner: Arc<dyn Store>,
    sink: Arc<dyn MetricsSink>,
    store_name: String,
}

impl MetricsStore {
    /// Create a new MetricsStore wrapping the given store.
    ///
    /// # Arguments
    /// * `inner` - The store to wrap
    /// * `sink` - The metrics sink to emit metrics to
    pub fn new(inner: Arc<dyn Store>, sink: Arc<dyn MetricsSink>) -> Self {
        let store_name = inner.name().to_string();
        MetricsStore {
            inner,
            sink,
            store_name,
        }
    }

    /// Get a reference to the metrics sink.
    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    fn elapsed_ms(start: Instant) -> f64 {
        start.elapsed().as_secs_f64() * 1000.0
    }

    fn emit_read(&self, key: &[u8], hit: bool, touched: bool, start: Instant) {
        self.sink.emit(StoreMetric::Read {
            key: display_key(key),
            hit,
            touched,
            latency_ms: Self::elapsed_ms(start),
            store: self.store_name.clone(),
        });
    }

    fn emit_write(&self, key: &[u8], bytes: usize, start: Instant) {
        self.sink.emit(StoreMetric::Write {
            key: display_key(key),
            bytes,
            latency_ms: Self::elapsed_ms(start),
            store: self.store_name.clone(),
        });
    }
}

#[async_trait]
impl Store for MetricsStore {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        self.emit_read(key, matches!(result, Ok(Some(_))), false, start);
        result
    }

    async fn get_touch(&self, key: &[u8], ttl: Duration) -> Result<Option<Vec<u8>>, CacheError> {
        let start = Instant::now();
        let result = self.inner.get_touch(key, ttl).await;
        let hit = matches!(result, Ok(Some(_)));
        self.emit_read(key, hit, hit && !ttl.is_zero(), start);
        result
    }

    async fn set(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.set(key, value, ttl).await;
        self.emit_write(key, value.len(), start);
        result
    }

    async fn delete(&self, key: &[u8]) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.delete(key).await;

        self.sink.emit(StoreMetric::Remove {
            key: display_key(key),
            latency_ms: Self::elapsed_ms(start),
            store: self.store_name.clone(),
        });

        result
    }

    async fn exists(&self, key: &[u8], touch: Duration) -> Result<bool, CacheError> {
        let start = Instant::now();
        let result = self.inner.exists(key, touch).await;
        let hit = matches!(result, Ok(true));
        self.emit_read(key, hit, hit && !touch.is_zero(), start);
        result
    }

    async fn mark(&self, key: &[u8], ttl: Duration) -> Result<bool, CacheError> {
        let start = Instant::now();
        let result = self.inner.mark(key, ttl).await;
        self.emit_write(key, 0, start);
        result
    }

    async fn ttl(&self, key: &[u8]) -> Result<Option<Duration>, CacheError> {
        let start = Instant::now();
        let result = self.inner.ttl(key).await;
        self.emit_read(key, matches!(result, Ok(Some(_))), false, start);
        result
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.clear().await;

        self.sink.emit(StoreMetric::Clear {
            latency_ms: Self::elapsed_ms(start),
            store: self.store_name.clone(),
        });

        result
    }
}

//! Store implementations for the cache-aside layer.

pub mod lmdb;
pub mod memory;
pub mod metrics;
pub mod moka;
pub mod redis;

pub use lmdb::{LmdbStore, LmdbStoreConfig};
pub use memory::{EvictOnSetConfig, MemoryStore, MemoryStoreConfig};
pub use metrics::{MetricsSink, MetricsStore, StoreMetric};
pub use moka::{MokaStore, MokaStoreConfig};
pub use redis::{RedisStore, RedisStoreConfig};

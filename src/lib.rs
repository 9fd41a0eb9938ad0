//! kv-memo - A compute-if-absent cache-aside layer for Rust
//!
//! This library provides:
//! - Typed get/set/exists/ttl accessors over a byte-oriented store
//! - `get_or_store`: read, or compute once and persist on a miss
//! - De-duplication of concurrent misses, by request coalescing or per-key locks
//! - Read-and-renew ("touch") folded into the read transaction
//! - In-memory, Moka, LMDB and Redis backends
//!
//! # Example
//!
//! ```ignore
//! use kv_memo::{KvConfig, MemoBuilder};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kv_memo::CacheError> {
//!     // KV_CACHE_PATH selects an LMDB directory; unset keeps data in memory
//!     let memo = MemoBuilder::open(&KvConfig::from_env()).await?;
//!
//!     // Concurrent callers for "user:42" share a single producer run
//!     let name: String = memo
//!         .get_or_store_with_ttl(
//!             "user:42",
//!             || async { Ok::<_, std::io::Error>("Alice".to_string()) },
//!             Duration::from_secs(30),
//!         )
//!         .await?;
//!
//!     assert_eq!(memo.get::<_, String>("user:42").await?, Some(name));
//!     Ok(())
//! }
//! ```

mod builder;
pub mod codec;
mod entry;
mod error;
mod flight;
pub mod keys;
mod kv;
mod lock;
mod memo;
mod store;
pub mod stores;
mod utils;

// Re-export public API
pub use builder::{KvConfig, MemoBuilder, StoreConfig};
pub use codec::{Codec, Complex, Decode, Encode, Json};
pub use error::{CacheError, ErrorKind};
pub use flight::SingleFlight;
pub use keys::{hash_key, int_key};
pub use kv::Kv;
pub use lock::{KeyLockGuard, KeyLocks};
pub use memo::{Dedup, Memo, MemoConfig};
pub use store::Store;
pub use stores::lmdb::{LmdbStore, LmdbStoreConfig};
pub use stores::memory::{EvictOnSetConfig, MemoryStore, MemoryStoreConfig};
pub use stores::metrics::{MetricsSink, MetricsStore, StoreMetric};
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use stores::redis::{RedisStore, RedisStoreConfig};

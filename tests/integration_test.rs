//! Integration tests for kv-memo get-or-store against the Memory, Moka, LMDB and Redis stores.

use kv_memo::{
    CacheError, Dedup, Encode, ErrorKind, LmdbStore, LmdbStoreConfig, Memo, MemoBuilder,
    MemoryStore, MokaStore, RedisStore, RedisStoreConfig, Store, hash_key,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Test Types
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
    email: String,
}

kv_memo::json_codec!(User);

// ============================================================================
// Fake Database
// ============================================================================

fn fake_user_db() -> Arc<HashMap<String, User>> {
    let mut db = HashMap::new();
    db.insert(
        "user:1".into(),
        User {
            id: 1,
            name: "Alice".into(),
            email: "alice@example.com".into(),
        },
    );
    db.insert(
        "user:2".into(),
        User {
            id: 2,
            name: "Bob".into(),
            email: "bob@example.com".into(),
        },
    );
    Arc::new(db)
}

#[derive(Debug)]
struct NotFound(String);

impl std::fmt::Display for NotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found", self.0)
    }
}

impl std::error::Error for NotFound {}

// ============================================================================
// Helper Functions
// ============================================================================

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

fn lmdb_store() -> (tempfile::TempDir, Arc<dyn Store>) {
    let dir = tempfile::tempdir().unwrap();
    let store = LmdbStore::open(LmdbStoreConfig {
        path: dir.path().to_path_buf(),
        max_size_mb: 16,
    })
    .unwrap();
    (dir, Arc::new(store))
}

async fn redis_store() -> Arc<dyn Store> {
    let config = RedisStoreConfig {
        url: "redis://localhost:6379".to_string(),
        prefix: format!("kv-memo-it-{}:", now_ms()),
    };
    Arc::new(
        RedisStore::new(config)
            .await
            .expect("Failed to connect to Redis - is it running?"),
    )
}

/// Load a user through the memo, counting trips to the database.
async fn load_user(memo: &Memo, key: &str, calls: &Arc<AtomicUsize>) -> Result<User, CacheError> {
    let db = fake_user_db();
    let calls = calls.clone();
    let lookup = key.to_string();

    memo.get_or_store_with_ttl(
        key,
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            db.get(&lookup).cloned().ok_or(NotFound(lookup))
        },
        Duration::from_secs(60),
    )
    .await
}

/// The cache-aside contract every backend must satisfy.
async fn exercise_store(store: Arc<dyn Store>, dedup: Dedup) {
    let memo = MemoBuilder::new().store(store).dedup(dedup).build();
    let calls = Arc::new(AtomicUsize::new(0));

    // Miss loads from origin
    let user = load_user(&memo, "user:1", &calls).await.unwrap();
    assert_eq!(user.name, "Alice");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Hit does not call origin
    let user = load_user(&memo, "user:1", &calls).await.unwrap();
    assert_eq!(user.email, "alice@example.com");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Origin failure is reported and not cached
    let err = load_user(&memo, "user:404", &calls).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Producer);
    assert!(!memo.exists("user:404").await.unwrap());
    let _ = load_user(&memo, "user:404", &calls).await.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Concurrent misses share one origin call
    let mut handles = Vec::new();
    for _ in 0..8 {
        let memo = memo.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            load_user(&memo, "user:2", &calls).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().name, "Bob");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(memo.pending(), 0);

    // Plain accessors see what get_or_store wrote
    let stored: Option<User> = memo.get("user:2").await.unwrap();
    assert_eq!(stored.map(|u| u.id), Some(2));
    assert!(memo.ttl("user:2").await.unwrap().unwrap() > Duration::from_secs(50));

    memo.del("user:2").await.unwrap();
    assert!(!memo.exists("user:2").await.unwrap());
}

/// Two racing callers, a slow producer and a 30s ttl on "user:42".
async fn user_42_scenario(store: Arc<dyn Store>, dedup: Dedup) {
    let memo = MemoBuilder::new().store(store.clone()).dedup(dedup).build();
    let counter = Arc::new(AtomicUsize::new(0));

    let call = |memo: Memo, counter: Arc<AtomicUsize>| {
        tokio::spawn(async move {
            memo.get_or_store_with_ttl(
                "user:42",
                move || async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>("Alice".to_string())
                },
                Duration::from_secs(30),
            )
            .await
        })
    };

    let first = call(memo.clone(), counter.clone());
    let second = call(memo.clone(), counter.clone());

    assert_eq!(first.await.unwrap().unwrap(), "Alice");
    assert_eq!(second.await.unwrap().unwrap(), "Alice");
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // Read the canonical key bytes straight from the store
    let key = "user:42".encode().unwrap();
    let raw = store.get(&key).await.unwrap();
    assert_eq!(raw, Some("Alice".encode().unwrap()));

    let ttl = store.ttl(&key).await.unwrap().unwrap();
    assert!(ttl > Duration::from_secs(29) && ttl <= Duration::from_secs(30));
}

// ============================================================================
// Memory Store Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_store_coalesce() {
    exercise_store(Arc::new(MemoryStore::default()), Dedup::Coalesce).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_store_key_lock() {
    exercise_store(Arc::new(MemoryStore::default()), Dedup::KeyLock).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_store_user_42() {
    user_42_scenario(Arc::new(MemoryStore::default()), Dedup::Coalesce).await;
    user_42_scenario(Arc::new(MemoryStore::default()), Dedup::KeyLock).await;
}

// ============================================================================
// Moka Store Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_moka_store_coalesce() {
    exercise_store(Arc::new(MokaStore::default()), Dedup::Coalesce).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_moka_store_user_42() {
    user_42_scenario(Arc::new(MokaStore::default()), Dedup::KeyLock).await;
}

// ============================================================================
// LMDB Store Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lmdb_store_coalesce() {
    let (_dir, store) = lmdb_store();
    exercise_store(store, Dedup::Coalesce).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lmdb_store_key_lock() {
    let (_dir, store) = lmdb_store();
    exercise_store(store, Dedup::KeyLock).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lmdb_store_user_42() {
    let (_dir, store) = lmdb_store();
    user_42_scenario(store, Dedup::Coalesce).await;
}

#[tokio::test]
async fn test_lmdb_values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = LmdbStoreConfig {
        path: dir.path().to_path_buf(),
        max_size_mb: 16,
    };
    let calls = Arc::new(AtomicUsize::new(0));

    {
        let store: Arc<dyn Store> = Arc::new(LmdbStore::open(config.clone()).unwrap());
        let memo = Memo::new(store);
        load_user(&memo, "user:1", &calls).await.unwrap();
    }

    let store: Arc<dyn Store> = Arc::new(LmdbStore::open(config).unwrap());
    let memo = Memo::new(store);
    let user = load_user(&memo, "user:1", &calls).await.unwrap();

    assert_eq!(user.name, "Alice");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Keys
// ============================================================================

#[tokio::test]
async fn test_hashed_and_integer_keys() {
    let memo = Memo::new(Arc::new(MemoryStore::default()));

    let key = hash_key("a rather long natural key that we would rather not store verbatim");
    memo.set(&key[..], &7u32).await.unwrap();
    assert_eq!(memo.get::<_, u32>(&key[..]).await.unwrap(), Some(7));

    let value: i64 = memo
        .get_or_store(&-5i64, || async { Ok::<_, CacheError>(25i64) })
        .await
        .unwrap();
    assert_eq!(value, 25);
    assert!(memo.exists(&kv_memo::int_key(-5)[..]).await.unwrap());
}

// ============================================================================
// Redis Store Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires running Redis instance"]
async fn test_redis_store_coalesce() {
    let store = redis_store().await;
    exercise_store(store.clone(), Dedup::Coalesce).await;
    store.clear().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires running Redis instance"]
async fn test_redis_store_user_42() {
    let store = redis_store().await;
    user_42_scenario(store.clone(), Dedup::KeyLock).await;
    store.clear().await.unwrap();
}

//! Per-key mutual exclusion with a self-cleaning registry.
//!
//! Each key that is currently locked, or waited on, owns one record holding
//! an async mutex and a count of the callers that checked it out. The record
//! is removed by whoever brings that count back to zero, and the decrement
//! runs under the map shard's write lock, so:
//!
//! - a caller that finds a record always finds it with a non-zero count,
//!   and therefore waits on the same mutex as everybody else for that key;
//! - once the count reaches zero nobody can be holding or waiting on the old
//!   mutex, so the next caller is free to create a fresh one.
//!
//! At no point can two mutexes be live for the same key.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

struct Slot {
    mutex: Arc<Mutex<()>>,
    holders: AtomicUsize,
}

impl Slot {
    fn new() -> Self {
        Slot {
            mutex: Arc::new(Mutex::new(())),
            holders: AtomicUsize::new(0),
        }
    }
}

type Slots = Arc<DashMap<Vec<u8>, Slot>>;

/// Registry of per-key async mutexes.
///
/// Unrelated keys never contend with each other. The registry only holds
/// records for keys that are locked or awaited, so it does not grow with the
/// number of keys ever seen.
///
/// # Example
/// ```ignore
/// let locks = KeyLocks::new();
/// let guard = locks.acquire(b"user:42").await;
/// // critical section for "user:42"
/// guard.release();
/// ```
#[derive(Clone, Default)]
pub struct KeyLocks {
    slots: Slots,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    ///
    /// The returned guard releases the lock and, if it was the last user,
    /// removes the registry record when dropped. Dropping this future while it
    /// is still waiting also gives up its claim on the record.
    pub async fn acquire(&self, key: &[u8]) -> KeyLockGuard {
        let (mutex, ticket) = self.checkout(key);
        let held = mutex.lock_owned().await;
        KeyLockGuard {
            _held: held,
            _ticket: ticket,
        }
    }

    /// Number of keys currently locked or awaited.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn checkout(&self, key: &[u8]) -> (Arc<Mutex<()>>, Ticket) {
        // Shared shard lock: the count cannot hit zero while we hold it
        let mutex = match self.slots.get(key) {
            Some(slot) => {
                slot.holders.fetch_add(1, Ordering::AcqRel);
                Arc::clone(&slot.mutex)
            }
            None => {
                // Exclusive shard lock; or_insert_with re-checks for a record
                // created since the lookup above
                let slot = self.slots.entry(key.to_vec()).or_insert_with(Slot::new);
                slot.holders.fetch_add(1, Ordering::AcqRel);
                Arc::clone(&slot.mutex)
            }
        };

        let ticket = Ticket {
            slots: Arc::clone(&self.slots),
            key: key.to_vec(),
        };
        (mutex, ticket)
    }
}

/// A caller's claim on a registry record.
struct Ticket {
    slots: Slots,
    key: Vec<u8>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.slots
            .remove_if(&self.key, |_, slot| slot.holders.fetch_sub(1, Ordering::AcqRel) == 1);
    }
}

/// Exclusive access to one key, released on drop.
#[must_use = "the key is unlocked as soon as the guard is dropped"]
pub struct KeyLockGuard {
    // Field order matters: unlock first, then give up the record
    _held: OwnedMutexGuard<()>,
    _ticket: Ticket,
}

impl KeyLockGuard {
    /// Unlock the key now instead of at the end of the scope.
    pub fn release(self) {
        drop(self);
    }
}

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinError;

use crate::error::CacheError;

type Flight<T> = Shared<BoxFuture<'static, Result<T, CacheError>>>;

/// Request coalescer.
///
/// Concurrent callers that present the same group name while a call for it
/// is running all receive a clone of that call's result; the function is run
/// once. The group is retired as soon as the call finishes, so the next
/// caller starts a fresh execution.
///
/// Each call runs on its own tokio task. It completes and retires its group
/// even if every caller stops waiting, and a panic inside it reaches the
/// waiters as a [`CacheError::Producer`].
pub struct SingleFlight<T> {
    calls: Arc<DashMap<String, Flight<T>>>,
}

impl<T> Clone for SingleFlight<T> {
    fn clone(&self) -> Self {
        SingleFlight {
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        SingleFlight {
            calls: Arc::new(DashMap::new()),
        }
    }
}

/// Removes a group from the table when its call ends, however it ends.
struct Retire<T> {
    calls: Arc<DashMap<String, Flight<T>>>,
    group: String,
}

impl<T> Drop for Retire<T> {
    fn drop(&mut self) {
        self.calls.remove(&self.group);
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` for `group`, or join the call already running for it.
    pub async fn run<F, Fut>(&self, group: &str, f: F) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        let flight = match self.calls.entry(group.to_string()) {
            Entry::Occupied(running) => {
                tracing::trace!(group, "joining in-flight call");
                running.get().clone()
            }
            Entry::Vacant(slot) => {
                let retire = Retire {
                    calls: Arc::clone(&self.calls),
                    group: group.to_string(),
                };
                // The task's Retire blocks on this shard until the insert
                // below releases it
                let task = tokio::spawn(async move {
                    let _retire = retire;
                    f().await
                });

                let name = group.to_string();
                let flight = async move { task.await.unwrap_or_else(|e| Err(join_error(&name, e))) }
                    .boxed()
                    .shared();
                slot.insert(flight.clone());
                flight
            }
        };

        flight.await
    }

    /// Number of groups with a call in progress.
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}

/// A panic is the producer's fault. A cancelled task means the runtime is
/// shutting down, which is reported as a storage failure.
fn join_error(group: &str, err: JoinError) -> CacheError {
    if !err.is_panic() {
        tracing::warn!(group, "coalesced call cancelled");
        return CacheError::storage(
            "runtime",
            group.as_bytes(),
            format!("coalesced call cancelled before completion: {}", err),
        );
    }

    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());

    tracing::warn!(panic = %message, "coalesced call panicked");
    CacheError::producer(format!("producer panicked: {}", message))
}

//! Single-flight coordination of concurrent loads.

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{BoxFuture, FutureExt, Shared};
use quotes_core::Result;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tracing::trace;

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Collapses concurrent loads of the same key into one execution.
///
/// The first caller for a key registers a shared future; every caller that
/// arrives while it is pending awaits that same future and receives a clone of
/// its outcome, success or error. The registration is dropped as soon as the
/// load resolves, so a later call after a failure starts a fresh load.
pub struct SingleFlight<K, V> {
    inflight: Arc<DashMap<K, SharedLoad<V>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Run the load for `key`, or join the one already in flight.
    ///
    /// `make` is only invoked by the caller that starts the load.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let load = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                trace!(key = ?key, "Joining in-flight load");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let registry = Arc::clone(&self.inflight);
                let fetch = make();
                let load = async move {
                    let outcome = fetch.await;
                    registry.remove(&key);
                    outcome
                }
                .boxed()
                .shared();
                entry.insert(load.clone());
                load
            }
        };
        load.await
    }

    /// Number of loads currently pending.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for SingleFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            inflight: Arc::clone(&self.inflight),
        }
    }
}

impl<K: Eq + Hash, V> fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.inflight.len())
            .finish()
    }
}

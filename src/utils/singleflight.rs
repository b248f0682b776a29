//! Keyed single-flight execution
//!
//! Coalesces concurrent calls for the same key onto one in-flight future;
//! every waiter receives a clone of the shared result. Used by the run
//! engine so that overlapping manual and scheduled run requests collapse
//! into one pass.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

type SharedFuture<T> = Shared<BoxFuture<'static, T>>;

pub struct SingleFlight<T: Clone> {
    inflight: Mutex<HashMap<String, (u64, SharedFuture<T>)>>,
    seq: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Run `make()` under `key`, or join the execution already in flight.
    ///
    /// The generation tag guards removal: a slow waiter must not evict a
    /// newer in-flight entry that reused its key.
    pub async fn run<F>(&self, key: &str, make: F) -> T
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let (generation, shared) = {
            let mut map = self.inflight.lock().await;
            match map.get(key) {
                Some((generation, shared)) => (*generation, shared.clone()),
                None => {
                    let generation = self.seq.fetch_add(1, Ordering::Relaxed);
                    let shared = make().shared();
                    map.insert(key.to_string(), (generation, shared.clone()));
                    (generation, shared)
                }
            }
        };

        let result = shared.await;

        let mut map = self.inflight.lock().await;
        if map.get(key).is_some_and(|(g, _)| *g == generation) {
            map.remove(key);
        }
        result
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

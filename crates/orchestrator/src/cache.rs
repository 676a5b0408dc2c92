//! A generic time-to-live cache with a background sweeper, shared by the
//! port pool's recent-tries tracker and the delegator's proxy handler
//! cache. The upstream implementation carried two near-identical cache
//! types (one for port tries, one for reverse-proxy handlers); here
//! they collapse into one generic type parameterized over the cached
//! value.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::watch;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<V> {
    ttl: Duration,
    store: RwLock<HashMap<String, Entry<V>>>,
}

/// A `HashMap<String, V>` where entries expire `ttl` after insertion and
/// are swept by a background task at `sweep_interval`.
pub struct TtlCache<V> {
    inner: Arc<Inner<V>>,
    stop: watch::Sender<bool>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Builds the cache and, if called from within a Tokio runtime, spawns
    /// a background sweeper that prunes expired entries every
    /// `sweep_interval`. Outside a runtime (plain `#[test]` functions that
    /// only need `insert`/`get`) the sweeper is skipped rather than
    /// panicking — `get` already checks expiry lazily, so correctness
    /// doesn't depend on the sweeper running.
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        let inner = Arc::new(Inner { ttl, store: RwLock::new(HashMap::new()) });
        let (stop, mut stop_rx) = watch::channel(false);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let sweeper_inner = inner.clone();
            handle.spawn(async move {
                let mut ticker = tokio::time::interval(sweep_interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => sweeper_inner.prune(),
                        _ = stop_rx.changed() => break,
                    }
                }
            });
        }

        Self { inner, stop }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.inner.store.write().insert(
            key.into(),
            Entry { value, expires_at: Instant::now() + self.inner.ttl },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, key: &str) {
        self.inner.store.write().remove(key);
    }

    /// Stops the background sweeper without waiting for `Drop`.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn get(&self, key: &str) -> Option<V> {
        let store = self.inner.store.read();
        let entry = store.get(key)?;
        if Instant::now() > entry.expires_at {
            return None;
        }
        Some(entry.value.clone())
    }
}

impl<V> Inner<V> {
    fn prune(&self) {
        let now = Instant::now();
        self.store.write().retain(|_, v| v.expires_at > now);
    }
}

impl<V> Drop for TtlCache<V> {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::Value;

use crate::circuit_breaker::{BreakerState, CircuitBreaker, Permit};
use crate::config::BreakerPolicy;
use crate::http_cache::ResponseCache;

/// Cache and breaker for a single upstream, owned by the client that talks to it.
///
/// Locks are only held for the duration of one call and never across an await.
#[derive(Debug, Default)]
pub struct UpstreamStore {
    cache: Mutex<ResponseCache>,
    breaker: Mutex<CircuitBreaker>,
}

impl UpstreamStore {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self::with_cache(policy, ResponseCache::new())
    }

    pub fn with_cache(policy: BreakerPolicy, cache: ResponseCache) -> Self {
        Self {
            cache: Mutex::new(cache),
            breaker: Mutex::new(CircuitBreaker::new(policy)),
        }
    }

    pub fn try_acquire(&self) -> Permit {
        lock(&self.breaker).try_acquire_at(Instant::now())
    }

    pub fn record_success(&self) {
        lock(&self.breaker).record_success();
    }

    pub fn record_failure(&self) {
        lock(&self.breaker).record_failure_at(Instant::now());
    }

    pub fn release_trial(&self) {
        lock(&self.breaker).release_trial();
    }

    pub fn breaker_state(&self) -> BreakerState {
        lock(&self.breaker).state()
    }

    pub fn consecutive_failures(&self) -> u32 {
        lock(&self.breaker).consecutive_failures()
    }

    pub fn get(&self, key: &str) -> Option<Vec<Value>> {
        lock(&self.cache).get(key)
    }

    pub fn get_stale(&self, key: &str) -> Option<Vec<Value>> {
        lock(&self.cache).get_stale(key)
    }

    pub fn put(&self, key: &str, payload: Vec<Value>, ttl: Duration) {
        lock(&self.cache).put(key, payload, ttl);
    }

    pub fn cached_entries(&self) -> usize {
        lock(&self.cache).len()
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let cache = lock(&self.cache).clone();
        cache.save_snapshot(path)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

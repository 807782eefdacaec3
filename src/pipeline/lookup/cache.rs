//! Single-flight, positive-only cache in front of the provider chain.
//!
//! Per key the state moves `absent -> pending -> resolved` for non-empty
//! results, or back to `absent` when the chain found nothing. Empty results
//! are never stored, so an unresolvable key goes back to the network on the
//! next request.
//!
//! Cache entries and pending markers share one mutex. The
//! "check cache, check pending, register pending" sequence runs inside a
//! single critical section with no await in it, which keeps the
//! at-most-one-initiator guarantee exact on a multi-threaded runtime.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, error};

use super::provider_chain::ProviderChain;
use super::rate_limiter::RateLimiter;
use crate::domain::{LookupKey, LookupResult};
use crate::observability::metrics;

type Outcome = Option<LookupResult>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<LookupKey, LookupResult>,
    pending: HashMap<LookupKey, watch::Receiver<Outcome>>,
}

/// Counters describing how lookups were served
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    coalesced: AtomicU64,
    upstream: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatsSnapshot {
    /// Served straight from a cache entry
    pub hits: u64,
    /// Served by awaiting another caller's in-flight lookup
    pub coalesced: u64,
    /// Provider chain invocations started
    pub upstream: u64,
}

enum Role {
    Hit(LookupResult),
    Waiter(watch::Receiver<Outcome>),
    Initiator(watch::Sender<Outcome>),
}

pub struct LookupCache {
    chain: ProviderChain,
    limiter: RateLimiter,
    state: Mutex<CacheState>,
    stats: CacheStats,
}

impl LookupCache {
    pub fn new(chain: ProviderChain, limiter: RateLimiter) -> Self {
        Self {
            chain,
            limiter,
            state: Mutex::new(CacheState::default()),
            stats: CacheStats::default(),
        }
    }

    /// Resolve `key`, serving from cache, joining an in-flight lookup, or starting one.
    pub async fn resolve(&self, key: &LookupKey) -> LookupResult {
        match self.claim(key) {
            Role::Hit(result) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                metrics::lookup::cache_hit();
                debug!(%key, "lookup cache hit");
                result
            }
            Role::Waiter(rx) => {
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                metrics::lookup::coalesced_wait();
                debug!(%key, "joining in-flight lookup");
                wait_for_outcome(rx).await
            }
            Role::Initiator(tx) => self.initiate(key, tx).await,
        }
    }

    /// Cached value for `key`, without triggering a lookup
    pub fn cached(&self, key: &LookupKey) -> Option<LookupResult> {
        self.lock_state().entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys with a lookup currently in flight
    pub fn in_flight(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Drop all cached entries. In-flight lookups are left alone.
    pub fn clear(&self) {
        self.lock_state().entries.clear();
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            coalesced: self.stats.coalesced.load(Ordering::Relaxed),
            upstream: self.stats.upstream.load(Ordering::Relaxed),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Atomic get-or-create on the pending table. Must not await.
    fn claim(&self, key: &LookupKey) -> Role {
        let mut state = self.lock_state();
        if let Some(hit) = state.entries.get(key) {
            return Role::Hit(hit.clone());
        }
        if let Some(rx) = state.pending.get(key) {
            return Role::Waiter(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        state.pending.insert(key.clone(), rx);
        Role::Initiator(tx)
    }

    async fn initiate(&self, key: &LookupKey, tx: watch::Sender<Outcome>) -> LookupResult {
        let guard = PendingGuard {
            cache: self,
            key,
            tx: Some(tx),
        };

        self.stats.upstream.fetch_add(1, Ordering::Relaxed);
        metrics::lookup::upstream_call();

        let result = {
            let _permit = self.limiter.acquire().await;
            match AssertUnwindSafe(self.chain.resolve(key)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    error!(%key, "provider chain panicked; resolving as empty");
                    LookupResult::empty()
                }
            }
        };

        guard.complete(result.clone());
        result
    }

    fn settle(&self, key: &LookupKey, tx: &watch::Sender<Outcome>, result: LookupResult) {
        {
            let mut state = self.lock_state();
            if !result.is_empty() {
                state.entries.insert(key.clone(), result.clone());
            }
            state.pending.remove(key);
        }
        tx.send_replace(Some(result));
    }
}

async fn wait_for_outcome(mut rx: watch::Receiver<Outcome>) -> LookupResult {
    let outcome = match rx.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone(),
        // Sender gone without publishing
        Err(_) => None,
    };
    outcome.unwrap_or_default()
}

/// Owns the initiator's side of a pending lookup.
///
/// Whatever happens to the initiating future (completion, panic, being
/// dropped mid-await) the pending marker is removed and waiters get at
/// least an empty outcome.
struct PendingGuard<'a> {
    cache: &'a LookupCache,
    key: &'a LookupKey,
    tx: Option<watch::Sender<Outcome>>,
}

impl PendingGuard<'_> {
    fn complete(mut self, result: LookupResult) {
        if let Some(tx) = self.tx.take() {
            self.cache.settle(self.key, &tx, result);
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            error!(key = %self.key, "lookup abandoned before completion; releasing waiters");
            self.cache.settle(self.key, &tx, LookupResult::empty());
        }
    }
}

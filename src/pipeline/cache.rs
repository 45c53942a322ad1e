//! Response cache and caching decorator
//!
//! [`ResponseCache`] is the one piece of state shared across unrelated
//! callers. It is constructed explicitly and handed to every [`Cached`]
//! layer as an `Arc`. Entries are keyed by [`CacheKey`], expire after a TTL
//! and are evicted lazily on lookup. Only success envelopes are stored.
//!
//! Misses are single-flight: the first caller for a key becomes the leader
//! and performs the inner call, later callers subscribe to the leader's
//! result through a `watch` channel. Both maps are sharded `DashMap`s, so a
//! slow key never blocks an unrelated one.

use crate::config::CacheConfig;
use crate::pipeline::{CacheKey, RequestDescriptor, ResultEnvelope, Sender};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

type Flight<P> = watch::Sender<Option<ResultEnvelope<P>>>;

/// A stored success envelope and its expiry
#[derive(Debug, Clone)]
pub struct CacheEntry<P> {
    key: CacheKey,
    envelope: ResultEnvelope<P>,
    expires_at: Instant,
}

impl<P> CacheEntry<P> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn envelope(&self) -> &ResultEnvelope<P> {
        &self.envelope
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Counters describing cache effectiveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a live entry
    pub hits: u64,
    /// Inner calls performed by a leader
    pub misses: u64,
    /// Callers that waited on another caller's in-flight request
    pub joins: u64,
    /// Entries currently stored (live or not yet evicted)
    pub entries: usize,
}

/// Outcome of contending for a key
enum Claim<'a, P: Clone> {
    Leader(FlightGuard<'a, P>),
    Follower(watch::Receiver<Option<ResultEnvelope<P>>>),
}

/// Process-wide TTL cache of success envelopes
pub struct ResponseCache<P> {
    entries: DashMap<CacheKey, CacheEntry<P>>,
    in_flight: DashMap<CacheKey, Flight<P>>,
    default_ttl: Duration,
    max_entries: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    joins: AtomicU64,
}

impl<P: Clone> ResponseCache<P> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            default_ttl,
            max_entries: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            joins: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let cache = Self::new(config.ttl());
        match config.max_entries {
            Some(max) => cache.with_max_entries(max),
            None => cache,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns a copy of the live entry for `key`, if any
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn lookup(&self, key: &CacheKey) -> Option<ResultEnvelope<P>> {
        let now = Instant::now();

        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let mut envelope = entry.envelope.clone();
                envelope.mark_from_cache();
                return Some(envelope);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            tracing::trace!("Evicted expired cache entry for {}", key);
        }

        None
    }

    /// Stores a success envelope; failures are ignored
    pub fn store(&self, key: CacheKey, envelope: &ResultEnvelope<P>, ttl: Duration) {
        if !envelope.is_success() || ttl.is_zero() {
            return;
        }

        if let Some(max) = self.max_entries {
            if self.entries.len() >= max && !self.entries.contains_key(&key) {
                self.purge_expired();
                if self.entries.len() >= max {
                    tracing::debug!("Cache full ({} entries), not storing {}", max, key);
                    return;
                }
            }
        }

        let entry = CacheEntry {
            key: key.clone(),
            envelope: envelope.clone(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key, entry);
    }

    /// Removes every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    /// Becomes the leader for `key`, or subscribes to the current leader
    fn claim(&self, key: &CacheKey) -> Claim<'_, P> {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(flight) => Claim::Follower(flight.get().subscribe()),
            Entry::Vacant(slot) => {
                let (tx, _rx) = watch::channel(None);
                slot.insert(tx);
                Claim::Leader(FlightGuard {
                    cache: self,
                    key: key.clone(),
                    finished: false,
                })
            }
        }
    }
}

/// Leadership of one in-flight key
///
/// Dropping the guard without finishing (leader cancelled or its future
/// dropped) closes the channel, which sends waiting followers back to
/// contend for the key.
struct FlightGuard<'a, P: Clone> {
    cache: &'a ResponseCache<P>,
    key: CacheKey,
    finished: bool,
}

impl<P: Clone> FlightGuard<'_, P> {
    /// Stores the result (if cacheable) and hands it to every follower
    fn finish(mut self, envelope: &ResultEnvelope<P>, ttl: Duration) {
        self.cache.store(self.key.clone(), envelope, ttl);
        if let Some((_, flight)) = self.cache.in_flight.remove(&self.key) {
            flight.send_replace(Some(envelope.clone()));
        }
        self.finished = true;
    }
}

impl<P: Clone> Drop for FlightGuard<'_, P> {
    fn drop(&mut self) {
        if !self.finished {
            self.cache.in_flight.remove(&self.key);
        }
    }
}

/// Waits for the leader's result; `None` when the leader gave up
async fn wait_for_leader<P: Clone>(
    rx: &mut watch::Receiver<Option<ResultEnvelope<P>>>,
) -> Option<ResultEnvelope<P>> {
    loop {
        if let Some(envelope) = rx.borrow_and_update().clone() {
            return Some(envelope);
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

/// Caching decorator
pub struct Cached<S, P> {
    inner: S,
    cache: Arc<ResponseCache<P>>,
}

impl<S, P> Cached<S, P> {
    pub fn new(inner: S, cache: Arc<ResponseCache<P>>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<ResponseCache<P>> {
        &self.cache
    }
}

#[async_trait]
impl<S, P> Sender<P> for Cached<S, P>
where
    S: Sender<P>,
    P: Clone + Send + Sync + 'static,
{
    async fn send(&self, request: &RequestDescriptor, cancel: &CancellationToken) -> ResultEnvelope<P> {
        let ttl = request.cache_ttl().unwrap_or(self.cache.default_ttl);
        if ttl.is_zero() {
            return self.inner.send(request, cancel).await;
        }

        let key = request.cache_key();
        let started = Instant::now();

        loop {
            if let Some(hit) = self.cache.lookup(&key) {
                tracing::trace!("Cache hit for {}", key);
                return hit;
            }

            match self.cache.claim(&key) {
                Claim::Leader(guard) => {
                    // A previous leader may have stored between lookup and claim
                    if let Some(hit) = self.cache.lookup(&key) {
                        return hit;
                    }

                    self.cache.misses.fetch_add(1, Ordering::Relaxed);
                    let envelope = self.inner.send(request, cancel).await;
                    guard.finish(&envelope, ttl);
                    return envelope;
                }
                Claim::Follower(mut rx) => {
                    self.cache.joins.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("Joining in-flight request for {}", key);

                    let joined = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            let mut cancelled = ResultEnvelope::cancelled_before_attempt();
                            cancelled.record_elapsed_since(started);
                            return cancelled;
                        }
                        joined = wait_for_leader(&mut rx) => joined,
                    };

                    match joined {
                        Some(envelope) if !envelope.is_cancelled() => return envelope,
                        _ => continue,
                    }
                }
            }
        }
    }
}

//! In-memory order cache
//!
//! Bounded LRU keyed by `order_uid`, with optional TTL and a background
//! janitor. The cache is the read fast path only: the store stays
//! authoritative and every operation here is infallible — a miss or an
//! expired entry is a value, not an error.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use shared::models::Order;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Read side of the cache.
#[async_trait]
pub trait CacheReader: Send + Sync {
    async fn get(&self, order_uid: &str) -> Option<Arc<Order>>;
}

/// Write side of the cache.
#[async_trait]
pub trait CacheWriter: Send + Sync {
    async fn save(&self, order: Arc<Order>);
}

/// Full cache capability: reads, writes, and the janitor lifecycle.
pub trait Cache: CacheReader + CacheWriter {
    /// Spawn the periodic purge task. A zero interval disables it; only
    /// the first call per instance has any effect.
    fn start_janitor(&self, shutdown: CancellationToken, interval: Duration);
}

struct CacheEntry {
    order: Arc<Order>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
}

/// Bounded LRU cache with optional TTL.
///
/// Cloning is cheap and shares the underlying storage. Mutation paths
/// (including `get`, which promotes the entry) take the exclusive lock;
/// no I/O ever happens under it.
#[derive(Clone)]
pub struct OrderCache {
    inner: Arc<RwLock<Inner>>,
    ttl: Duration,
    janitor_started: Arc<AtomicBool>,
}

impl OrderCache {
    /// Create a cache holding at most `max_items` orders. A zero `ttl`
    /// disables expiry.
    pub fn new(max_items: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_items.max(1)).expect("capacity is at least 1");
        Self {
            inner: Arc::new(RwLock::new(Inner {
                entries: LruCache::new(capacity),
            })),
            ttl,
            janitor_started: Arc::new(AtomicBool::new(false)),
        }
    }

    fn expiry(&self, now: Instant) -> Option<Instant> {
        if self.ttl.is_zero() {
            None
        } else {
            Some(now + self.ttl)
        }
    }

    /// Insert or overwrite an order, refreshing its recency and expiry.
    ///
    /// When TTL is enabled, expired entries are purged from the tail
    /// first so a stale entry never survives an insert at capacity.
    pub async fn save(&self, order: Arc<Order>) {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        if !self.ttl.is_zero() {
            purge_expired_locked(&mut inner, now);
        }
        let key = order.order_uid.clone();
        inner.entries.put(
            key,
            CacheEntry {
                order,
                expires_at: self.expiry(now),
            },
        );
    }

    /// Look up an order, promoting it to most-recently-used on a live hit.
    /// An expired entry is removed and reported as a miss.
    pub async fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let expired = inner
            .entries
            .peek(order_uid)
            .map(|entry| entry.is_expired(now))?;
        if expired {
            inner.entries.pop(order_uid);
            return None;
        }
        inner
            .entries
            .get(order_uid)
            .map(|entry| entry.order.clone())
    }

    /// Current number of cached orders, expired entries included until the
    /// next purge.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.inner.write().await.entries.clear();
    }

    /// Remove all expired entries; returns how many were purged.
    pub async fn purge_expired(&self) -> usize {
        if self.ttl.is_zero() {
            return 0;
        }
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        purge_expired_locked(&mut inner, now)
    }

    /// Spawn the background purge task. Ticks every `interval` until the
    /// token is cancelled. Repeated calls on the same instance are ignored.
    pub fn start_janitor(&self, shutdown: CancellationToken, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        if self.janitor_started.swap(true, Ordering::SeqCst) {
            tracing::warn!("cache janitor already running, ignoring second start");
            return;
        }
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip immediate tick
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("cache janitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired().await;
                        if purged > 0 {
                            tracing::debug!(purged, "cache janitor purged expired orders");
                        }
                    }
                }
            }
        });
    }
}

/// Scan tail to head, dropping everything already expired. Keys are
/// collected first so removal never races the traversal.
fn purge_expired_locked(inner: &mut Inner, now: Instant) -> usize {
    let expired: Vec<String> = inner
        .entries
        .iter()
        .rev()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in &expired {
        inner.entries.pop(key);
    }
    expired.len()
}

#[async_trait]
impl CacheReader for OrderCache {
    async fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        OrderCache::get(self, order_uid).await
    }
}

#[async_trait]
impl CacheWriter for OrderCache {
    async fn save(&self, order: Arc<Order>) {
        OrderCache::save(self, order).await
    }
}

impl Cache for OrderCache {
    fn start_janitor(&self, shutdown: CancellationToken, interval: Duration) {
        OrderCache::start_janitor(self, shutdown, interval)
    }
}

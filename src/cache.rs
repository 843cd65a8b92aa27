//! Time-to-live memoization of endpoint responses.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::debug;

use crate::client::RowSource;
use crate::constants::cache::DEFAULT_TTL_SECS;
use crate::errors::FetchError;
use crate::query::QueryParams;
use crate::types::{CacheKey, Row};

/// Response cache settings.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Lifetime of a cached response. Zero disables caching.
    pub ttl: Duration,
    /// Optional cap on live entries; the oldest insert is evicted first.
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            max_entries: None,
        }
    }
}

/// Thread-safe response cache keyed by endpoint and sorted parameters.
///
/// Expired entries are evicted lazily when a lookup touches them.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<RwLock<ResponseCacheInner>>,
}

struct ResponseCacheInner {
    entries: IndexMap<CacheKey, CachedResponse>,
    config: CacheConfig,
    hits: u64,
    misses: u64,
}

struct CachedResponse {
    rows: Vec<Row>,
    expires_at: Instant,
}

/// Hit/miss counters for a [`ResponseCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing live.
    pub misses: u64,
    /// Entries currently stored, including expired ones not yet evicted.
    pub entries: usize,
}

/// Build the cache key for one request.
pub fn cache_key(endpoint: &str, params: &QueryParams) -> CacheKey {
    (endpoint.to_string(), params.sorted_items())
}

impl ResponseCache {
    /// Empty cache with `config`.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ResponseCacheInner {
                entries: IndexMap::new(),
                config,
                hits: 0,
                misses: 0,
            })),
        }
    }

    /// Cache with the given time-to-live and no entry cap.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(CacheConfig {
            ttl,
            max_entries: None,
        })
    }

    /// Return cached rows for `key` if present and not expired.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<Row>> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &CacheKey, now: Instant) -> Option<Vec<Row>> {
        let mut inner = self.inner.write().expect("response cache poisoned");
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                let rows = entry.rows.clone();
                inner.hits = inner.hits.saturating_add(1);
                return Some(rows);
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.shift_remove(key);
        }
        inner.misses = inner.misses.saturating_add(1);
        None
    }

    /// Store rows for `key`, replacing any previous entry.
    pub fn insert(&self, key: CacheKey, rows: Vec<Row>) {
        self.insert_at(key, rows, Instant::now());
    }

    fn insert_at(&self, key: CacheKey, rows: Vec<Row>, now: Instant) {
        let mut inner = self.inner.write().expect("response cache poisoned");
        if inner.config.ttl.is_zero() {
            return;
        }
        let expires_at = now + inner.config.ttl;
        inner.evict_expired(now);
        inner.entries.shift_remove(&key);
        inner.entries.insert(key, CachedResponse { rows, expires_at });
        inner.enforce_limit();
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("response cache poisoned");
        inner.entries.clear();
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        let inner = self.inner.read().expect("response cache poisoned");
        inner.entries.len()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read().expect("response cache poisoned");
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
        }
    }
}

impl ResponseCacheInner {
    /// Entries are kept in insertion order under one TTL, so expired ones sit at the front.
    fn evict_expired(&mut self, now: Instant) {
        while self
            .entries
            .first()
            .is_some_and(|(_, entry)| entry.expires_at <= now)
        {
            self.entries.shift_remove_index(0);
        }
    }

    fn enforce_limit(&mut self) {
        let Some(max_entries) = self.config.max_entries else {
            return;
        };
        while self.entries.len() > max_entries {
            if self.entries.shift_remove_index(0).is_none() {
                break;
            }
        }
    }
}

/// Row source that consults a [`ResponseCache`] before every request.
///
/// Only successful responses are stored; errors always reach the caller.
pub struct CachedRowSource<S> {
    inner: S,
    cache: ResponseCache,
}

impl<S: RowSource> CachedRowSource<S> {
    /// Wrap `inner` with `cache`.
    pub fn new(inner: S, cache: ResponseCache) -> Self {
        Self { inner, cache }
    }

    /// Shared cache handle.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Unwrap the underlying source.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: RowSource> RowSource for CachedRowSource<S> {
    fn get_rows(&self, endpoint: &str, params: &QueryParams) -> Result<Vec<Row>, FetchError> {
        let key = cache_key(endpoint, params);
        if let Some(rows) = self.cache.get(&key) {
            debug!(endpoint, rows = rows.len(), "response cache hit");
            return Ok(rows);
        }
        let rows = self.inner.get_rows(endpoint, params)?;
        self.cache.insert(key, rows.clone());
        Ok(rows)
    }
}

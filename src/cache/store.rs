//! In-memory response store with TTL and least-recently-touched eviction.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use super::key::CacheKey;
use crate::config::CacheConfig;
use crate::protocol::ChatRequest;
use crate::round1;

/// A cached upstream response
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Fingerprint the entry is stored under
    pub key: CacheKey,
    /// Response body as returned by the upstream
    pub payload: Value,
    /// Last successful read or write
    pub last_touched: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Response cache keyed by request fingerprint.
///
/// Entries and counters sit behind one mutex, so a lookup racing an
/// eviction always sees a consistent map and counts exactly once.
#[derive(Debug)]
pub struct ResponseCache {
    enabled: bool,
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<CacheInner>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl ResponseCache {
    /// Create a cache from configuration
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Create a cache that never stores anything
    pub fn disabled() -> Self {
        Self::new(&CacheConfig {
            enabled: false,
            ..Default::default()
        })
    }

    /// Override the entry TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Whether lookups and stores are active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Entry time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Capacity
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the cached response for `request`.
    ///
    /// A hit refreshes the entry. An expired entry is purged and reported
    /// as a miss.
    pub fn lookup(&self, request: &ChatRequest) -> Option<Value> {
        if !self.enabled {
            return None;
        }

        let key = match CacheKey::for_request(request) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!("Cache key unavailable, treating as miss: {}", e);
                self.lock().misses += 1;
                return None;
            },
        };

        let mut guard = self.lock();
        let inner = &mut *guard;
        let now = Instant::now();

        match inner.entries.get_mut(&key) {
            Some(entry) if now.duration_since(entry.last_touched) <= self.ttl => {
                entry.last_touched = now;
                inner.hits += 1;
                tracing::debug!(key = %key, "Cache hit");
                Some(entry.payload.clone())
            },
            Some(_) => {
                inner.entries.remove(&key);
                inner.misses += 1;
                tracing::debug!(key = %key, "Cache entry expired");
                None
            },
            None => {
                inner.misses += 1;
                tracing::debug!(key = %key, "Cache miss");
                None
            },
        }
    }

    /// Store `payload` as the response for `request`.
    ///
    /// Requests with a positive temperature are skipped. At capacity, a new
    /// key first evicts the least recently touched entry.
    pub fn store(&self, request: &ChatRequest, payload: Value) {
        if !self.enabled {
            return;
        }
        if !request.is_deterministic() {
            tracing::debug!("Skipping cache store for sampled request");
            return;
        }

        let key = match CacheKey::for_request(request) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!("Cache key unavailable, skipping store: {}", e);
                return;
            },
        };

        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.entries.len() >= self.max_entries && !inner.entries.contains_key(&key) {
            let oldest = inner
                .entries
                .values()
                .min_by_key(|entry| entry.last_touched)
                .map(|entry| entry.key.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                inner.evictions += 1;
                tracing::debug!(key = %oldest, "Cache eviction");
            }
        }

        tracing::debug!(key = %key, "Cache store");
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                payload,
                last_touched: Instant::now(),
            },
        );
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of stored entries (expired ones included until looked up)
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of cache statistics
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let lookups = inner.hits + inner.misses;
        let hit_rate = if lookups > 0 {
            inner.hits as f64 / lookups as f64 * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: inner.entries.len(),
            max_entries: self.max_entries,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate_pct: round1(hit_rate),
            evictions: inner.evictions,
        }
    }
}

/// Cache statistics for serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored
    pub entries: usize,
    /// Capacity
    pub max_entries: usize,
    /// Successful lookups
    pub hits: u64,
    /// Failed or expired lookups
    pub misses: u64,
    /// hits / (hits + misses), in percent
    pub hit_rate_pct: f64,
    /// Entries dropped to make room
    pub evictions: u64,
}

//! In-memory query result cache.
//!
//! Bounds query volume against the execution service.
//!
//! # Design
//!
//! - Capacity-bounded LRU; reads refresh recency
//! - Per-entry TTL chosen by data class (topology outlives live metrics)
//! - Expired entries are evicted on access; the payload is handed back once
//!   so the caller can fall back to it when the upstream fails
//! - No single-flight: concurrent misses for one key each go upstream
//!
//! Keys are content hashes of the canonical query, see [`CacheKey`].

mod key;
pub use key::{compute_hash, CacheKey};

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::catalog::DataClass;
use crate::config::CacheSettings;

/// TTLs per data class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub topology: Duration,
    pub live_metric: Duration,
}

impl TtlPolicy {
    pub fn ttl_for(&self, class: DataClass) -> Duration {
        match class {
            DataClass::Topology => self.topology,
            DataClass::LiveMetric => self.live_metric,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            topology: Duration::from_secs(300),
            live_metric: Duration::from_secs(60),
        }
    }
}

impl From<&CacheSettings> for TtlPolicy {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            topology: Duration::from_secs(settings.topology_ttl_secs),
            live_metric: Duration::from_secs(settings.metric_ttl_secs),
        }
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    /// Includes lookups that found only an expired entry.
    pub misses: u64,
    pub expirations: u64,
    /// Entries pushed out by capacity.
    pub evictions: u64,
    pub entries: usize,
}

/// Result of [`QueryCache::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Fresh(V),
    /// The entry had expired and has been removed; this is its last payload.
    Expired(V),
    Missing,
}

struct Entry<V> {
    payload: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// LRU + TTL result cache.
pub struct QueryCache<V> {
    entries: LruCache<CacheKey, Entry<V>>,
    policy: TtlPolicy,
    stats: CacheStats,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(capacity: NonZeroUsize, policy: TtlPolicy) -> Self {
        Self {
            entries: LruCache::new(capacity),
            policy,
            stats: CacheStats::default(),
        }
    }

    /// Build from settings; a zero capacity is raised to one.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.capacity).unwrap_or(NonZeroUsize::MIN);
        Self::new(capacity, TtlPolicy::from(settings))
    }

    pub fn ttl_for(&self, class: DataClass) -> Duration {
        self.policy.ttl_for(class)
    }

    /// Look up a key, distinguishing fresh, expired and absent entries.
    pub fn lookup(&mut self, key: &CacheKey) -> Lookup<V> {
        let now = Instant::now();
        let fresh = match self.entries.get(key) {
            None => {
                self.stats.misses += 1;
                tracing::debug!(%key, "cache miss");
                return Lookup::Missing;
            }
            Some(entry) if !entry.is_expired(now) => Some(entry.payload.clone()),
            Some(_) => None,
        };
        if let Some(payload) = fresh {
            self.stats.hits += 1;
            tracing::debug!(%key, "cache hit");
            return Lookup::Fresh(payload);
        }

        let expired = self.entries.pop(key);
        self.stats.misses += 1;
        self.stats.expirations += 1;
        tracing::debug!(%key, "cache entry expired");
        match expired {
            Some(entry) => Lookup::Expired(entry.payload),
            None => Lookup::Missing,
        }
    }

    /// Fresh payload for a key, if any.
    pub fn get(&mut self, key: &CacheKey) -> Option<V> {
        match self.lookup(key) {
            Lookup::Fresh(payload) => Some(payload),
            Lookup::Expired(_) | Lookup::Missing => None,
        }
    }

    /// Store a payload; replaces any entry under the same key.
    pub fn set(&mut self, key: CacheKey, payload: V, ttl: Duration) {
        let entry = Entry {
            payload,
            created_at: Instant::now(),
            ttl,
        };
        if let Some((evicted, _)) = self.entries.push(key.clone(), entry) {
            if evicted != key {
                self.stats.evictions += 1;
                tracing::debug!(key = %evicted, "cache eviction");
            }
        }
    }

    /// Store a payload with the TTL of its data class.
    pub fn set_for(&mut self, key: CacheKey, payload: V, class: DataClass) {
        let ttl = self.ttl_for(class);
        self.set(key, payload, ttl);
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.pop(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }
}

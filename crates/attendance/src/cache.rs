//! TTL cache for fetched domain values.
//!
//! Keyed by a deterministic fingerprint of (operation, parameters). Expired
//! entries are evicted eagerly at lookup time — there is no sweep thread;
//! entry counts stay bounded by courses × data classes. Counters accumulate
//! for the process lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use common::{AttendanceLedger, ContactDirectory};

use crate::parser::ParsedTab;

/// The cacheable data classes. Each carries its own TTL at `put` time.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Courses(HashMap<String, ParsedTab>),
    Ledger(AttendanceLedger),
    Contacts(ContactDirectory),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    created_at: Instant,
    expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub current_size: usize,
    /// Percentage of lookups served from cache, 0–100.
    pub hit_rate: f64,
}

/// Deterministic cache key for an operation and its parameters.
pub fn fingerprint(op: &str, params: &[&str]) -> String {
    if params.is_empty() {
        op.to_string()
    } else {
        format!("{}:{}", op, params.join(":"))
    }
}

#[derive(Debug, Default)]
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key. An expired entry counts as a miss and is removed.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        let mut expired = false;

        if let Some(entry) = self.entries.get(key) {
            if Instant::now() < entry.expires_at {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("cache hit: {}", key);
                return Some(entry.value.clone());
            }
            expired = true;
        }

        if expired {
            if let Some((_, entry)) = self.entries.remove(key) {
                debug!(
                    "cache expired: {} (lived {:?})",
                    key,
                    entry.created_at.elapsed()
                );
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value, replacing any existing entry for the key atomically.
    pub fn put(&self, key: &str, value: CachedValue, ttl: Duration) {
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
            },
        );
        debug!("cache put: {} (ttl {:?})", key, ttl);
    }

    /// Remove one key. Returns whether an entry existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!("cache invalidated: {}", key);
        }
        removed
    }

    /// Remove every key starting with `prefix`. Returns the removal count.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in keys {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        self.invalidations.fetch_add(removed as u64, Ordering::Relaxed);
        debug!("cache invalidated {} entries with prefix {}", removed, prefix);
        removed
    }

    /// Drop every entry. Returns the removal count.
    pub fn clear_all(&self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.invalidations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            current_size: self.entries.len(),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64 * 100.0
            },
        }
    }
}

//! Action Result Cache
//!
//! Memoizes the serialized output of cacheable actions, keyed on the
//! service, the action and a canonical signature of the parameters.
//!
//! Invalidation is coarse: any notification for a service drops every entry
//! belonging to that service. Each service also carries a generation
//! counter so a result computed before an invalidation is never stored
//! after it.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use crate::service::Params;

/// Whether a cached result may be shared between callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheScope {
    /// One entry per canonical parameter set.
    Shared,
    /// The caller's code is part of the key (anonymous callers share one slot).
    PerUser,
}

/// One memoized action result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: JsonValue,
    /// Service generation the value was computed under.
    pub generation: u64,
    pub stored_at: Instant,
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Counters exposed for health and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Calculate the cache hit rate.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct CacheInner {
    entries: DashMap<String, CacheEntry>,
    generations: DashMap<String, u64>,
    enabled: bool,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

/// Process-wide action cache. Cloning shares the same store.
#[derive(Debug, Clone)]
pub struct ActionCache {
    inner: Arc<CacheInner>,
}

impl Default for ActionCache {
    fn default() -> Self {
        Self::new(true, None)
    }
}

impl ActionCache {
    pub fn new(enabled: bool, ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                generations: DashMap::new(),
                enabled,
                ttl,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                invalidations: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    /// Look up a live entry.
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        let now = Instant::now();
        let lookup = self
            .inner
            .entries
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));
        let hit = match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                self.inner.entries.remove_if(key, |_, entry| entry.is_expired(now));
                None
            }
            None => None,
        };

        let counter = if hit.is_some() {
            &self.inner.hits
        } else {
            &self.inner.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        hit
    }

    /// Current generation of a service. Read it before running the handler
    /// and hand it back to [`ActionCache::put`].
    pub fn generation(&self, service: &str) -> u64 {
        self.inner
            .generations
            .get(service)
            .map(|generation| *generation)
            .unwrap_or(0)
    }

    /// Store a result computed under generation `observed`.
    ///
    /// Returns `false` (and stores nothing) if the service was invalidated
    /// in the meantime.
    pub fn put(&self, service: &str, key: String, value: JsonValue, observed: u64) -> bool {
        if !self.inner.enabled || self.generation(service) != observed {
            return false;
        }

        let now = Instant::now();
        self.inner.entries.insert(
            key.clone(),
            CacheEntry {
                key: key.clone(),
                value,
                generation: observed,
                stored_at: now,
                expires_at: self.inner.ttl.map(|ttl| now + ttl),
            },
        );

        // an invalidation may have slipped in between the check and the insert
        if self.generation(service) != observed {
            self.inner
                .entries
                .remove_if(&key, |_, entry| entry.generation == observed);
            return false;
        }
        true
    }

    /// Drop every entry of `service`; returns how many were dropped.
    pub fn invalidate_service(&self, service: &str) -> usize {
        *self
            .inner
            .generations
            .entry(service.to_string())
            .or_insert(0) += 1;

        let prefix = format!("{}:", service);
        let before = self.inner.entries.len();
        self.inner.entries.retain(|key, _| !key.starts_with(&prefix));
        let dropped = before.saturating_sub(self.inner.entries.len());

        self.inner.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(service, dropped, "action cache invalidated");
        dropped
    }

    /// Number of stored entries for `service`.
    pub fn entries_for(&self, service: &str) -> usize {
        let prefix = format!("{}:", service);
        self.inner
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .count()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            invalidations: self.inner.invalidations.load(Ordering::Relaxed),
            entries: self.inner.entries.len(),
        }
    }
}

// ============================================================================
// CANONICAL KEYS
// ============================================================================

/// Deterministic cache key for an action call.
///
/// Parameters are canonicalized first: keys sorted, scalars stringified
/// (`5` and `"5"` are the same parameter), null values dropped. `caller`
/// is mixed in for [`CacheScope::PerUser`] actions.
pub fn get_cache_key(service: &str, action: &str, params: &Params, caller: Option<&str>) -> String {
    let mut signature = canonical_params(params);
    if let Some(caller) = caller {
        let _ = write!(signature, "|user={}", caller);
    }

    let digest = Sha256::digest(signature.as_bytes());
    format!("{}:{}:{}", service, action, hex::encode(digest))
}

/// Canonical, order-independent encoding of a parameter map.
pub fn canonical_params(params: &Params) -> String {
    let sorted: BTreeMap<&String, &JsonValue> = params
        .iter()
        .filter(|(_, value)| !value.is_null())
        .collect();

    let mut out = String::from("{");
    for (index, (key, value)) in sorted.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        write_string(&mut out, key);
        out.push(':');
        write_canonical(&mut out, value);
    }
    out.push('}');
    out
}

fn write_canonical(out: &mut String, value: &JsonValue) {
    match value {
        JsonValue::Null => out.push_str("null"),
        JsonValue::Bool(b) => write_string(out, if *b { "true" } else { "false" }),
        JsonValue::Number(n) => write_string(out, &n.to_string()),
        JsonValue::String(s) => write_string(out, s),
        JsonValue::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        JsonValue::Object(map) => out.push_str(&canonical_params(map)),
    }
}

fn write_string(out: &mut String, s: &str) {
    // JSON string escaping keeps separators inside values unambiguous
    out.push_str(&JsonValue::String(s.to_string()).to_string());
}

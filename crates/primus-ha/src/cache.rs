//! Per-lock snapshot of the last observed remote state.
//!
//! The cache is the sole authority for "I am the leader right now": a fresh,
//! self-owned snapshot means the renew path may CAS without a remote read,
//! and the watch loop surrenders the moment the snapshot goes stale. Ages
//! are measured on the monotonic clock so wall-clock adjustments can never
//! shrink them.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::record::LockRecord;

/// One observation of the remote lock object.
///
/// `etag == None` means the object was observed absent (the believed-absent
/// path that acquires with `If-None-Match`).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Etag observed on the last successful read or write.
    pub etag: Option<String>,
    /// Record body read or written at that point.
    pub record: Option<LockRecord>,
    observed_at: Instant,
}

impl CacheEntry {
    /// Creates an entry observed now.
    #[must_use]
    pub fn observe(etag: Option<String>, record: Option<LockRecord>) -> Self {
        Self {
            etag,
            record,
            observed_at: Instant::now(),
        }
    }

    /// Time elapsed since this entry was observed.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.observed_at.elapsed()
    }

    /// Whether this entry is younger than the lease TTL.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() <= ttl
    }

    /// Whether the observed record names the given identity.
    #[must_use]
    pub fn owned_by(&self, identity: &str) -> bool {
        self.record.as_ref().is_some_and(|r| r.identity == identity)
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: Duration) {
        self.observed_at -= by;
    }
}

/// Atomically swapped cache cell.
///
/// Readers always see a consistent snapshot; the critical section covers
/// only the pointer swap, never remote I/O.
#[derive(Debug, Default)]
pub struct LockCache {
    cell: RwLock<Option<Arc<CacheEntry>>>,
}

impl LockCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current snapshot, if any.
    #[must_use]
    pub fn load(&self) -> Option<Arc<CacheEntry>> {
        self.cell.read().ok().and_then(|guard| guard.clone())
    }

    /// Replaces the snapshot.
    pub fn store(&self, entry: CacheEntry) {
        if let Ok(mut guard) = self.cell.write() {
            *guard = Some(Arc::new(entry));
        }
    }
}

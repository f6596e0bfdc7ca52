//! Op-recording object store with fault injection.
//!
//! Wraps [`InMemoryStore`] so that CAS semantics stay identical to the
//! reference implementation while every operation is recorded for test
//! assertions. Faults are injected per wrapper, not per inner store: two
//! `RecordingStore`s sharing one inner store model two server instances
//! with independent network paths to the same bucket.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use primus_core::error::{Error, Result};
use primus_core::store::{
    DeleteOutcome, InMemoryStore, ObjectBody, ObjectLocation, ObjectStore, PutCondition,
    PutOutcome,
};

/// Record of a store operation for test assertions.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Get operation.
    Get {
        /// Object that was read.
        object: String,
    },
    /// Put operation.
    Put {
        /// Object that was written.
        object: String,
        /// Precondition carried by the write.
        condition: PutCondition,
    },
    /// Delete operation.
    Delete {
        /// Object that was deleted.
        object: String,
        /// Etag the delete was conditioned on.
        if_match: String,
    },
}

/// In-memory object store with operation recording and fault injection.
#[derive(Clone)]
pub struct RecordingStore {
    inner: Arc<InMemoryStore>,
    ops: Arc<Mutex<Vec<StoreOp>>>,
    fail_next_gets: Arc<AtomicU32>,
    fail_next_puts: Arc<AtomicU32>,
    fail_all_gets: Arc<AtomicBool>,
    fail_all_puts: Arc<AtomicBool>,
    latency: Option<Duration>,
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingStore {
    /// Creates a store over a fresh bucket.
    #[must_use]
    pub fn new() -> Self {
        Self::over(Arc::new(InMemoryStore::new()))
    }

    /// Creates a store over an existing bucket.
    ///
    /// Use this to give several contenders independent fault injection
    /// against the same objects.
    #[must_use]
    pub fn over(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            ops: Arc::new(Mutex::new(Vec::new())),
            fail_next_gets: Arc::new(AtomicU32::new(0)),
            fail_next_puts: Arc::new(AtomicU32::new(0)),
            fail_all_gets: Arc::new(AtomicBool::new(false)),
            fail_all_puts: Arc::new(AtomicBool::new(false)),
            latency: None,
        }
    }

    /// Adds a fixed latency to every operation.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the shared bucket behind this wrapper.
    #[must_use]
    pub fn inner(&self) -> Arc<InMemoryStore> {
        Arc::clone(&self.inner)
    }

    /// Fails the next `n` reads with a transient error.
    pub fn fail_next_gets(&self, n: u32) {
        self.fail_next_gets.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` writes with a transient error.
    pub fn fail_next_puts(&self, n: u32) {
        self.fail_next_puts.store(n, Ordering::SeqCst);
    }

    /// Fails every read until cleared (simulated read partition).
    pub fn fail_all_gets(&self, fail: bool) {
        self.fail_all_gets.store(fail, Ordering::SeqCst);
    }

    /// Fails every write until cleared (simulated write partition).
    pub fn fail_all_puts(&self, fail: bool) {
        self.fail_all_puts.store(fail, Ordering::SeqCst);
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.ops.lock().expect("ops lock").clone()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.ops.lock().expect("ops lock").clear();
    }

    /// Number of recorded PUT operations (issued or rejected, not faulted).
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, StoreOp::Put { .. }))
            .count()
    }

    /// Number of recorded DELETE operations.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, StoreOp::Delete { .. }))
            .count()
    }

    /// Number of recorded GET operations.
    #[must_use]
    pub fn get_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, StoreOp::Get { .. }))
            .count()
    }

    fn record(&self, op: StoreOp) {
        self.ops.lock().expect("ops lock").push(op);
    }

    fn take_fault(counter: &AtomicU32, all: &AtomicBool) -> bool {
        if all.load(Ordering::SeqCst) {
            return true;
        }
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn maybe_delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn get(
        &self,
        location: &ObjectLocation,
        request_id: &str,
    ) -> Result<Option<ObjectBody>> {
        self.maybe_delay().await;
        if Self::take_fault(&self.fail_next_gets, &self.fail_all_gets) {
            return Err(Error::unavailable("injected 5xx on get"));
        }
        self.record(StoreOp::Get {
            object: location.object.clone(),
        });
        self.inner.get(location, request_id).await
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        data: Bytes,
        condition: PutCondition,
        request_id: &str,
    ) -> Result<PutOutcome> {
        self.maybe_delay().await;
        if Self::take_fault(&self.fail_next_puts, &self.fail_all_puts) {
            return Err(Error::unavailable("injected 5xx on put"));
        }
        self.record(StoreOp::Put {
            object: location.object.clone(),
            condition: condition.clone(),
        });
        self.inner.put(location, data, condition, request_id).await
    }

    async fn delete(
        &self,
        location: &ObjectLocation,
        if_match: &str,
        request_id: &str,
    ) -> Result<DeleteOutcome> {
        self.maybe_delay().await;
        self.record(StoreOp::Delete {
            object: location.object.clone(),
            if_match: if_match.to_string(),
        });
        self.inner.delete(location, if_match, request_id).await
    }
}

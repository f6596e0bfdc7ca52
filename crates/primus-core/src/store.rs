//! Object-store contract for conditional reads and writes.
//!
//! This module defines the storage contract every backend must implement.
//! The contract is shaped by what the lock protocol needs from a cloud
//! object store:
//! - Conditional writes with exactly one precondition per request
//! - An opaque entity tag (etag) returned by every read and write, used as
//!   the compare-and-swap token
//! - Precondition failure reported as a normal outcome, never as an error
//!
//! ## Multi-Cloud Compatibility
//!
//! The etag is an opaque `String`; backends interpret it according to their
//! own semantics (OCI/S3/Azure etags, GCS generations rendered as strings).
//! The only requirement is that every mutation of an object yields an etag
//! never seen before on that object.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

/// Fully qualified name of an object within a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    /// Store namespace (tenancy).
    pub namespace: String,
    /// Bucket name.
    pub bucket: String,
    /// Object name within the bucket.
    pub object: String,
}

impl ObjectLocation {
    /// Creates a new object location.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        bucket: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            bucket: bucket.into(),
            object: object.into(),
        }
    }
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.bucket, self.object)
    }
}

/// Body and version of an object returned by a successful read.
#[derive(Debug, Clone)]
pub struct ObjectBody {
    /// Object content.
    pub data: Bytes,
    /// Entity tag observed on this read.
    pub etag: String,
}

/// Precondition attached to a conditional write.
///
/// There is deliberately no unconditional variant: every write the lock
/// protocol issues races other contenders, and an unpreconditioned write
/// could silently overwrite a newer owner's record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutCondition {
    /// Write only if the object does not exist (`If-None-Match: *`).
    IfNoneMatch,
    /// Write only if the object's etag matches (`If-Match`).
    IfMatch(String),
}

/// Result of a conditional write.
///
/// Precondition failure is a routine outcome of the CAS protocol and is
/// never surfaced as an error.
#[derive(Debug, Clone)]
pub enum PutOutcome {
    /// Write succeeded; returns the new etag.
    Written {
        /// Entity tag of the object after this write.
        etag: String,
    },
    /// The precondition was not met; the object was left untouched.
    PreconditionFailed,
}

/// Result of a conditional delete.
#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    /// The object was removed (or was already absent).
    Deleted,
    /// The `If-Match` etag did not match; the object was left untouched.
    PreconditionFailed,
}

/// Storage contract for conditional object operations.
///
/// Implementations must be safe for concurrent use by many lock instances.
/// Every call takes a caller-generated `request_id` that backends are
/// expected to attach to the outbound request for end-to-end tracing.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Reads an object.
    ///
    /// Returns `Ok(None)` if the object does not exist; absence is a normal
    /// protocol state, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] for transport failures and server
    /// errors, [`Error::Rejected`] for other remote rejections.
    async fn get(&self, location: &ObjectLocation, request_id: &str)
    -> Result<Option<ObjectBody>>;

    /// Writes an object, guarded by exactly one precondition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] for transport failures and server
    /// errors. Precondition failure is reported via
    /// [`PutOutcome::PreconditionFailed`], never as an error.
    async fn put(
        &self,
        location: &ObjectLocation,
        data: Bytes,
        condition: PutCondition,
        request_id: &str,
    ) -> Result<PutOutcome>;

    /// Deletes an object, guarded by `If-Match`.
    ///
    /// Deleting an absent object succeeds (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] for transport failures and server
    /// errors. An etag mismatch is reported via
    /// [`DeleteOutcome::PreconditionFailed`], never as an error.
    async fn delete(
        &self,
        location: &ObjectLocation,
        if_match: &str,
        request_id: &str,
    ) -> Result<DeleteOutcome>;
}

/// In-memory object store.
///
/// Thread-safe via `RwLock`; not suitable for production. Etags are drawn
/// from a store-global counter so that no etag is ever reused, even across
/// delete/recreate cycles of the same object.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    next_etag: AtomicU64,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mint_etag(&self) -> String {
        let n = self.next_etag.fetch_add(1, Ordering::Relaxed) + 1;
        format!("\"{n:08x}\"")
    }

    fn objects(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, StoredObject>>> {
        self.objects.read().map_err(|_| Error::Internal {
            message: "store lock poisoned".into(),
        })
    }

    fn objects_mut(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, StoredObject>>> {
        self.objects.write().map_err(|_| Error::Internal {
            message: "store lock poisoned".into(),
        })
    }

    /// Writes an object directly, bypassing preconditions.
    ///
    /// Returns the freshly minted etag. Intended for test setup (seeding an
    /// incumbent, simulating an out-of-band overwrite).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn seed(&self, location: &ObjectLocation, data: Bytes) -> String {
        let etag = self.mint_etag();
        self.objects
            .write()
            .expect("store lock poisoned")
            .insert(
                location.to_string(),
                StoredObject {
                    data,
                    etag: etag.clone(),
                },
            );
        etag
    }

    /// Removes an object directly, bypassing preconditions.
    ///
    /// Intended for tests simulating external deletion.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn force_remove(&self, location: &ObjectLocation) {
        self.objects
            .write()
            .expect("store lock poisoned")
            .remove(&location.to_string());
    }

    /// Returns the current etag of an object, if present.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn etag_of(&self, location: &ObjectLocation) -> Option<String> {
        self.objects
            .read()
            .expect("store lock poisoned")
            .get(&location.to_string())
            .map(|o| o.etag.clone())
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(
        &self,
        location: &ObjectLocation,
        _request_id: &str,
    ) -> Result<Option<ObjectBody>> {
        let objects = self.objects()?;
        Ok(objects.get(&location.to_string()).map(|o| ObjectBody {
            data: o.data.clone(),
            etag: o.etag.clone(),
        }))
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        data: Bytes,
        condition: PutCondition,
        _request_id: &str,
    ) -> Result<PutOutcome> {
        let mut objects = self.objects_mut()?;
        let key = location.to_string();
        let current = objects.get(&key);

        match condition {
            PutCondition::IfNoneMatch => {
                if current.is_some() {
                    return Ok(PutOutcome::PreconditionFailed);
                }
            }
            PutCondition::IfMatch(expected) => match current {
                Some(obj) if obj.etag == expected => {}
                _ => return Ok(PutOutcome::PreconditionFailed),
            },
        }

        let etag = self.mint_etag();
        objects.insert(
            key,
            StoredObject {
                data,
                etag: etag.clone(),
            },
        );
        drop(objects);

        Ok(PutOutcome::Written { etag })
    }

    async fn delete(
        &self,
        location: &ObjectLocation,
        if_match: &str,
        _request_id: &str,
    ) -> Result<DeleteOutcome> {
        let mut objects = self.objects_mut()?;
        let key = location.to_string();

        match objects.get(&key) {
            None => Ok(DeleteOutcome::Deleted),
            Some(obj) if obj.etag == if_match => {
                objects.remove(&key);
                Ok(DeleteOutcome::Deleted)
            }
            Some(_) => Ok(DeleteOutcome::PreconditionFailed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> ObjectLocation {
        ObjectLocation::new("tenancy", "locks", "core/lock")
    }

    #[tokio::test]
    async fn get_absent_is_none() {
        let store = InMemoryStore::new();
        let body = store.get(&loc(), "rid-1").await.expect("get");
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn if_none_match_creates_once() {
        let store = InMemoryStore::new();

        let outcome = store
            .put(&loc(), Bytes::from("a"), PutCondition::IfNoneMatch, "rid-1")
            .await
            .expect("put");
        assert!(matches!(outcome, PutOutcome::Written { .. }));

        let outcome = store
            .put(&loc(), Bytes::from("b"), PutCondition::IfNoneMatch, "rid-2")
            .await
            .expect("put");
        assert!(matches!(outcome, PutOutcome::PreconditionFailed));

        let body = store.get(&loc(), "rid-3").await.expect("get").expect("body");
        assert_eq!(body.data, Bytes::from("a"));
    }

    #[tokio::test]
    async fn if_match_requires_current_etag() {
        let store = InMemoryStore::new();

        let PutOutcome::Written { etag: first } = store
            .put(&loc(), Bytes::from("v1"), PutCondition::IfNoneMatch, "rid")
            .await
            .expect("put")
        else {
            panic!("expected write");
        };

        // Matching etag succeeds and produces a new etag.
        let PutOutcome::Written { etag: second } = store
            .put(
                &loc(),
                Bytes::from("v2"),
                PutCondition::IfMatch(first.clone()),
                "rid",
            )
            .await
            .expect("put")
        else {
            panic!("expected write");
        };
        assert_ne!(first, second);

        // Stale etag fails.
        let outcome = store
            .put(&loc(), Bytes::from("v3"), PutCondition::IfMatch(first), "rid")
            .await
            .expect("put");
        assert!(matches!(outcome, PutOutcome::PreconditionFailed));
    }

    #[tokio::test]
    async fn if_match_on_absent_object_fails() {
        let store = InMemoryStore::new();
        let outcome = store
            .put(
                &loc(),
                Bytes::from("v"),
                PutCondition::IfMatch("\"00000001\"".into()),
                "rid",
            )
            .await
            .expect("put");
        assert!(matches!(outcome, PutOutcome::PreconditionFailed));
    }

    #[tokio::test]
    async fn delete_matches_etag() {
        let store = InMemoryStore::new();
        let etag = store.seed(&loc(), Bytes::from("v"));

        let outcome = store
            .delete(&loc(), "\"deadbeef\"", "rid")
            .await
            .expect("delete");
        assert!(matches!(outcome, DeleteOutcome::PreconditionFailed));
        assert!(store.etag_of(&loc()).is_some());

        let outcome = store.delete(&loc(), &etag, "rid").await.expect("delete");
        assert!(matches!(outcome, DeleteOutcome::Deleted));
        assert!(store.etag_of(&loc()).is_none());
    }

    #[tokio::test]
    async fn delete_absent_is_idempotent() {
        let store = InMemoryStore::new();
        let outcome = store
            .delete(&loc(), "\"00000001\"", "rid")
            .await
            .expect("delete");
        assert!(matches!(outcome, DeleteOutcome::Deleted));
    }

    #[tokio::test]
    async fn etags_never_repeat_across_recreate() {
        let store = InMemoryStore::new();

        let first = store.seed(&loc(), Bytes::from("gen1"));
        store.force_remove(&loc());

        let PutOutcome::Written { etag: second } = store
            .put(&loc(), Bytes::from("gen2"), PutCondition::IfNoneMatch, "rid")
            .await
            .expect("put")
        else {
            panic!("expected write");
        };

        assert_ne!(first, second);
    }
}

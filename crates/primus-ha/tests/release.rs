//! Integration tests for the release protocol.

use std::sync::Arc;
use std::time::Duration;

use primus_core::store::{ObjectLocation, ObjectStore};
use primus_ha::{HaBackend, HaConfig, StopSignal};
use primus_test_utils::{RecordingStore, StoreOp};

fn fast_config() -> HaConfig {
    HaConfig {
        renew_interval: Duration::from_millis(30),
        retry_interval: Duration::from_millis(20),
        ttl: Duration::from_millis(200),
        watch_retry_interval: Duration::from_millis(30),
        watch_retry_max: 4,
        cache_min_acceptable_age: Duration::from_millis(300),
        write_retries_on_failures: 4,
        read_timeout: Duration::from_millis(500),
        write_timeout: Duration::from_millis(500),
    }
}

fn lock_location() -> ObjectLocation {
    ObjectLocation::new("tenancy", "ha-locks", "core/lock")
}

#[tokio::test]
async fn unlock_deletes_our_record_with_its_observed_etag() {
    let store = RecordingStore::new();
    let backend = HaBackend::new(
        Arc::new(store.clone()),
        "tenancy",
        "ha-locks",
        fast_config(),
    )
    .expect("backend");
    let lock = backend.lock_with("core/lock", "10.0.0.7:8200");
    let cancel = StopSignal::new();

    lock.lock(cancel.listener()).await.expect("lock");
    let etag_before_unlock = store.inner().etag_of(&lock_location());

    lock.unlock().await.expect("unlock");

    assert!(
        store
            .inner()
            .get(&lock_location(), "test-probe")
            .await
            .expect("get")
            .is_none(),
        "record must be gone after a clean release"
    );

    let deletes: Vec<_> = store
        .operations()
        .into_iter()
        .filter_map(|op| match op {
            StoreOp::Delete { if_match, .. } => Some(if_match),
            _ => None,
        })
        .collect();
    assert_eq!(deletes.len(), 1);
    // The delete is conditioned on the etag observed by the release read,
    // never on anything older.
    assert_eq!(Some(&deletes[0]), etag_before_unlock.as_ref());
}

#[tokio::test]
async fn unlock_is_idempotent() {
    let store = RecordingStore::new();
    let backend = HaBackend::new(
        Arc::new(store.clone()),
        "tenancy",
        "ha-locks",
        fast_config(),
    )
    .expect("backend");
    let lock = backend.lock_with("core/lock", "10.0.0.7:8200");
    let cancel = StopSignal::new();

    lock.lock(cancel.listener()).await.expect("lock");

    lock.unlock().await.expect("first unlock");
    lock.unlock().await.expect("second unlock");
    lock.unlock().await.expect("third unlock");

    assert_eq!(store.delete_count(), 1, "at most one remote delete");
}

#[tokio::test]
async fn unlock_without_lock_is_a_quiet_noop() {
    let store = RecordingStore::new();
    let backend = HaBackend::new(
        Arc::new(store.clone()),
        "tenancy",
        "ha-locks",
        fast_config(),
    )
    .expect("backend");
    let lock = backend.lock_with("core/lock", "10.0.0.7:8200");

    lock.unlock().await.expect("unlock");

    assert!(store.operations().is_empty(), "no remote traffic expected");
}

#[tokio::test]
async fn delete_failure_still_releases_locally() {
    let store = RecordingStore::new();
    let backend = HaBackend::new(
        Arc::new(store.clone()),
        "tenancy",
        "ha-locks",
        fast_config(),
    )
    .expect("backend");
    let lock = backend.lock_with("core/lock", "10.0.0.7:8200");
    let cancel = StopSignal::new();

    let mut leadership = lock
        .lock(cancel.listener())
        .await
        .expect("lock")
        .expect("leads");

    // The release read fails; unlock reports the error but has already
    // released leadership locally.
    store.fail_all_gets(true);
    let err = lock.unlock().await.expect_err("cleanup read must fail");
    assert!(err.is_transient());

    tokio::time::timeout(Duration::from_secs(1), leadership.fired())
        .await
        .expect("leadership channel must close on unlock");

    // Spent instance: a second unlock is still a quiet success.
    store.fail_all_gets(false);
    lock.unlock().await.expect("second unlock");
    assert_eq!(store.delete_count(), 0);
}

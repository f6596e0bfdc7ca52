//! The lock state machine.
//!
//! A [`HaLock`] is one contender for one key. Acquisition, renewal, and
//! takeover all funnel through the same write-lock decision procedure:
//!
//! 1. A fresh, self-owned cache snapshot short-circuits straight to a
//!    CAS write with the cached etag (renewal).
//! 2. Otherwise the current record is read, and a non-absent incumbent may
//!    only be overwritten once its etag generation has gone unrenewed for
//!    `cache_min_acceptable_age` (the freshness gate).
//! 3. The write carries `If-None-Match` on the believed-absent path and
//!    `If-Match` otherwise; the store's CAS is the only tie-breaker between
//!    simultaneous contenders.
//!
//! On success two background tasks start: a renew loop that refreshes the
//! lease, and a watch loop that surrenders leadership the moment it can no
//! longer be proven. Surrender closes the leadership channel handed out by
//! [`HaLock::lock`]; that closure is the only way the consumer learns of
//! leadership loss.
//!
//! The design prefers safety over liveness: when the object store is
//! unreachable the lock gives up leadership rather than risk two leaders.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use primus_core::error::{Error, Result};
use primus_core::store::{
    DeleteOutcome, ObjectBody, ObjectLocation, ObjectStore, PutCondition, PutOutcome,
};

use crate::cache::{CacheEntry, LockCache};
use crate::config::HaConfig;
use crate::metrics;
use crate::record::LockRecord;
use crate::signal::{StopListener, StopSignal};

/// Base step of the linear backoff applied to transient write failures.
const WRITE_BACKOFF_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Held,
    Spent,
}

/// A single-use contender for one lock key.
///
/// Created by [`HaBackend::lock_with`](crate::backend::HaBackend::lock_with);
/// construction is cheap and does no I/O. Once [`HaLock::unlock`] has run,
/// the instance is spent - reacquisition takes a fresh instance with a fresh
/// identity, so a stale incumbent can never be mistaken for self.
pub struct HaLock {
    shared: Arc<LockShared>,
    state: Mutex<Lifecycle>,
}

struct LockShared {
    store: Arc<dyn ObjectStore>,
    location: ObjectLocation,
    key: String,
    value: String,
    identity: String,
    config: HaConfig,
    cache: LockCache,
    stop: StopSignal,
}

impl HaLock {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        location: ObjectLocation,
        value: impl Into<String>,
        config: HaConfig,
    ) -> Self {
        let key = location.object.clone();
        Self {
            shared: Arc::new(LockShared {
                store,
                location,
                key,
                value: value.into(),
                identity: Uuid::new_v4().to_string(),
                config,
                cache: LockCache::new(),
                stop: StopSignal::new(),
            }),
            state: Mutex::new(Lifecycle::Idle),
        }
    }

    /// The logical lock name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.shared.key
    }

    /// The identity this contender writes into the lock record.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.shared.identity
    }

    /// Blocks until the lease is acquired, the cancel signal fires, or an
    /// unrecoverable error occurs.
    ///
    /// On success returns the leadership channel: it resolves when
    /// leadership is lost, whether by surrender or by [`HaLock::unlock`].
    /// Cancellation is not an error and returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the lock is already held or the
    /// instance is spent, [`Error::Serialization`] if the record cannot be
    /// encoded, and remote errors that outlast the inner retry ceiling.
    pub async fn lock(&self, mut cancel: StopListener) -> Result<Option<StopListener>> {
        let _timer = metrics::OpTimer::start("lock");
        let mut state = self.state.lock().await;
        match *state {
            Lifecycle::Held => {
                return Err(Error::InvalidState {
                    message: "lock already held".into(),
                });
            }
            Lifecycle::Spent => {
                return Err(Error::InvalidState {
                    message: "lock instance spent; create a fresh lock".into(),
                });
            }
            Lifecycle::Idle => {}
        }

        debug!(key = %self.shared.key, identity = %self.shared.identity, "lock() called");

        if !self.attempt_lock(&mut cancel).await? {
            debug!(key = %self.shared.key, "acquisition cancelled");
            return Ok(None);
        }

        *state = Lifecycle::Held;
        metrics::inc_lock_acquired(&self.shared.key);

        let leadership = self.shared.stop.listener();
        tokio::spawn(renew_loop(
            Arc::clone(&self.shared),
            self.shared.stop.listener(),
        ));
        tokio::spawn(watch_loop(
            Arc::clone(&self.shared),
            self.shared.stop.listener(),
        ));

        Ok(Some(leadership))
    }

    /// Releases the lock.
    ///
    /// Idempotent: returns `Ok(())` when not held. Stops the background
    /// loops first, then best-effort deletes the remote record - guarded by
    /// `If-Match` so a newer owner's record is never disturbed. Local
    /// leadership is released even when the remote cleanup fails; the error
    /// is returned for observability only.
    ///
    /// # Errors
    ///
    /// Returns remote errors from the cleanup read or delete.
    pub async fn unlock(&self) -> Result<()> {
        let _timer = metrics::OpTimer::start("unlock");
        let mut state = self.state.lock().await;
        if *state != Lifecycle::Held {
            return Ok(());
        }

        debug!(key = %self.shared.key, identity = %self.shared.identity, "unlock() called");
        self.shared.stop.fire();
        *state = Lifecycle::Spent;
        drop(state);
        metrics::set_leader(&self.shared.key, false);

        self.shared.release_remote().await
    }

    /// Reads the current lock record, held or not.
    ///
    /// Returns the caller-supplied payload of whichever contender currently
    /// claims the key, or `None` when the key is unclaimed.
    ///
    /// # Errors
    ///
    /// Returns remote errors from the read.
    pub async fn value(&self) -> Result<Option<String>> {
        let _timer = metrics::OpTimer::start("value");
        let record = self.shared.fetch_record().await?;
        Ok(record.map(|(r, _)| r.value))
    }

    /// Runs the acquisition loop: one write-lock attempt per retry tick
    /// until acquired or cancelled.
    async fn attempt_lock(&self, cancel: &mut StopListener) -> Result<bool> {
        let mut ticker = time::interval_at(
            time::Instant::now() + self.shared.config.retry_interval,
            self.shared.config.retry_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.shared.write_lock().await? {
                        return Ok(true);
                    }
                }
                () = cancel.fired() => return Ok(false),
            }
        }
    }
}

impl Drop for HaLock {
    fn drop(&mut self) {
        // A dropped lock cannot renew; fire the stop signal so the loops
        // exit and leadership listeners observe the loss.
        self.shared.stop.fire();
    }
}

impl LockShared {
    /// Runs the write-lock decision procedure, shared by acquisition and
    /// renewal. Returns whether the record now names this instance.
    async fn write_lock(&self) -> Result<bool> {
        let cached = self.cache.load();
        let renewing = cached
            .as_ref()
            .is_some_and(|c| c.owned_by(&self.identity) && c.is_fresh(self.config.ttl));

        if !renewing {
            // Secondary path: observe the incumbent before daring a write.
            let current = self.fetch_record().await?;
            let (current_record, current_etag) = match current {
                Some((record, etag)) => (Some(record), Some(etag)),
                None => (None, None),
            };

            // Refresh the cache only when the etag generation changed, so
            // the observation timestamp marks when this generation was
            // first seen.
            let changed = match cached.as_ref() {
                None => true,
                Some(c) => c.etag != current_etag,
            };
            if changed {
                self.cache
                    .store(CacheEntry::observe(current_etag, current_record.clone()));
            }

            if let Some(snapshot) = self.cache.load() {
                // Freshness gate: a non-absent incumbent may only be
                // overwritten once it has gone unrenewed for the full
                // acceptable age.
                if current_record.is_some()
                    && snapshot.age() < self.config.cache_min_acceptable_age
                {
                    debug!(
                        key = %self.key,
                        age = ?snapshot.age(),
                        "incumbent observed too recently; deferring takeover"
                    );
                    return Ok(false);
                }
            }
        }

        let record = LockRecord::new(&self.key, &self.value, &self.identity);
        let body = record.encode()?;

        let condition = match self.cache.load().and_then(|c| c.etag.clone()) {
            None => PutCondition::IfNoneMatch,
            Some(etag) => PutCondition::IfMatch(etag),
        };

        let Some(etag) = self.put_with_retries(body, condition).await? else {
            return Ok(false);
        };

        self.cache
            .store(CacheEntry::observe(Some(etag), Some(record)));
        metrics::set_leader(&self.key, true);
        Ok(true)
    }

    /// Conditional PUT with linear backoff on transient failures.
    ///
    /// Returns the new etag, or `None` on precondition failure - a routine
    /// CAS outcome that is terminal for this tick but not an error.
    async fn put_with_retries(
        &self,
        body: Bytes,
        condition: PutCondition,
    ) -> Result<Option<String>> {
        let mut attempt: u32 = 1;
        loop {
            let request_id = new_request_id();
            debug!(
                key = %self.key,
                request_id = %request_id,
                attempt,
                "writing lock record"
            );

            let outcome = match time::timeout(
                self.config.write_timeout,
                self.store
                    .put(&self.location, body.clone(), condition.clone(), &request_id),
            )
            .await
            {
                Err(_) => Err(Error::unavailable("write timed out")),
                Ok(result) => result,
            };

            match outcome {
                Ok(PutOutcome::Written { etag }) => return Ok(Some(etag)),
                Ok(PutOutcome::PreconditionFailed) => {
                    debug!(key = %self.key, "lock record moved under us; not leader this tick");
                    return Ok(None);
                }
                Err(e) if e.is_transient() && attempt < self.config.write_retries_on_failures => {
                    metrics::inc_put_failed(&self.key);
                    warn!(key = %self.key, error = %e, attempt, "transient write failure; backing off");
                    time::sleep(WRITE_BACKOFF_STEP * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    metrics::inc_put_failed(&self.key);
                    return Err(e);
                }
            }
        }
    }

    /// Reads and decodes the current lock record.
    ///
    /// `Ok(None)` means no contender currently claims the key.
    async fn fetch_record(&self) -> Result<Option<(LockRecord, String)>> {
        let request_id = new_request_id();
        debug!(key = %self.key, request_id = %request_id, "reading lock record");

        let body = match time::timeout(
            self.config.read_timeout,
            self.store.get(&self.location, &request_id),
        )
        .await
        {
            Err(_) => Err(Error::unavailable("read timed out")),
            Ok(result) => result,
        };

        let body = match body {
            Ok(body) => body,
            Err(e) => {
                metrics::inc_get_failed(&self.key);
                return Err(e);
            }
        };

        match body {
            None => Ok(None),
            Some(ObjectBody { data, etag }) => {
                let record = LockRecord::decode(&data).map_err(|e| {
                    metrics::inc_get_failed(&self.key);
                    e
                })?;
                Ok(Some((record, etag)))
            }
        }
    }

    /// Best-effort removal of the remote record during release.
    ///
    /// The record is deleted only if it still names this identity, guarded
    /// by the etag observed on that very read.
    async fn release_remote(&self) -> Result<()> {
        match self.fetch_record().await? {
            Some((record, etag)) if record.identity == self.identity => {
                let request_id = new_request_id();
                debug!(key = %self.key, request_id = %request_id, "deleting lock record");

                let outcome = match time::timeout(
                    self.config.write_timeout,
                    self.store.delete(&self.location, &etag, &request_id),
                )
                .await
                {
                    Err(_) => Err(Error::unavailable("delete timed out")),
                    Ok(result) => result,
                };

                match outcome {
                    Ok(DeleteOutcome::Deleted) => Ok(()),
                    Ok(DeleteOutcome::PreconditionFailed) => {
                        debug!(key = %self.key, "lock record changed hands; leaving it");
                        Ok(())
                    }
                    Err(e) => {
                        metrics::inc_delete_failed(&self.key);
                        warn!(key = %self.key, error = %e, "failed to delete lock record");
                        Err(e)
                    }
                }
            }
            // Absent, or a new leader has already taken over: leave it be.
            _ => Ok(()),
        }
    }

    /// Flips the local belief to "not leader", exactly once.
    fn surrender(&self) {
        if self.stop.fire() {
            debug!(
                key = %self.key,
                identity = %self.identity,
                "closing the leadership channel"
            );
            metrics::set_leader(&self.key, false);
            metrics::inc_lock_surrendered(&self.key);
        }
    }
}

/// Renews the lease until the stop signal fires.
///
/// Renewal failures are logged and otherwise ignored: the watch loop is the
/// leadership authority, and a decayed lease is its call to make.
async fn renew_loop(shared: Arc<LockShared>, mut stop: StopListener) {
    let mut ticker = time::interval_at(
        time::Instant::now() + shared.config.renew_interval,
        shared.config.renew_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if stop.is_fired() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            () = stop.fired() => break,
        }

        tokio::select! {
            result = shared.write_lock() => {
                if let Err(e) = result {
                    debug!(key = %shared.key, error = %e, "lease renewal failed");
                }
            }
            () = stop.fired() => break,
        }
    }

    debug!(key = %shared.key, "renew loop stopped");
}

/// Watches the remote record and surrenders leadership when it can no
/// longer be proven ours.
///
/// The watch loop never mutates remote state; it exists to flip the local
/// belief from "leader" to "not leader" promptly and safely.
async fn watch_loop(shared: Arc<LockShared>, mut stop: StopListener) {
    let mut retries: u32 = 0;
    let mut ticker = time::interval_at(
        time::Instant::now() + shared.config.watch_retry_interval,
        shared.config.watch_retry_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if stop.is_fired() {
            debug!(key = %shared.key, "watch loop stopping");
            break;
        }

        if retries >= shared.config.watch_retry_max.saturating_sub(1) {
            debug!(
                key = %shared.key,
                "giving up the lease after repeated watch failures"
            );
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            () = stop.fired() => break,
        }

        // The renew loop has fallen behind if the snapshot is missing,
        // stale, or foreign; leadership can no longer be proven locally and
        // no remote read can fix that.
        let snapshot = shared.cache.load();
        let provable = snapshot
            .as_ref()
            .is_some_and(|c| c.owned_by(&shared.identity) && c.is_fresh(shared.config.ttl));
        if !provable {
            debug!(key = %shared.key, "cache snapshot is missing, stale, or foreign");
            break;
        }

        let fetched = tokio::select! {
            result = shared.fetch_record() => result,
            () = stop.fired() => break,
        };

        match fetched {
            Err(e) => {
                retries += 1;
                metrics::set_watch_retriable(&shared.key, true);
                debug!(key = %shared.key, error = %e, retries, "watch probe failed; retrying");
            }
            Ok(record) => {
                let ours = record
                    .as_ref()
                    .is_some_and(|(r, _)| r.identity == shared.identity);
                if !ours {
                    debug!(
                        key = %shared.key,
                        "lock record is absent or names another contender"
                    );
                    break;
                }
                retries = 0;
                metrics::set_watch_retriable(&shared.key, false);
            }
        }
    }

    shared.surrender();
}

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use primus_core::store::InMemoryStore;

    use super::*;

    fn test_config() -> HaConfig {
        HaConfig {
            renew_interval: Duration::from_millis(25),
            retry_interval: Duration::from_millis(20),
            ttl: Duration::from_millis(200),
            watch_retry_interval: Duration::from_millis(25),
            watch_retry_max: 4,
            cache_min_acceptable_age: Duration::from_millis(300),
            write_retries_on_failures: 4,
            read_timeout: Duration::from_millis(500),
            write_timeout: Duration::from_millis(500),
        }
    }

    fn test_lock(store: Arc<InMemoryStore>) -> HaLock {
        HaLock::new(
            store,
            ObjectLocation::new("tenancy", "ha-locks", "core/lock"),
            "10.0.0.7:8200",
            test_config(),
        )
    }

    #[tokio::test]
    async fn lock_fails_when_already_held() {
        let store = Arc::new(InMemoryStore::new());
        let lock = test_lock(store);

        let cancel = StopSignal::new();
        let leadership = lock.lock(cancel.listener()).await.expect("lock");
        assert!(leadership.is_some());

        let err = lock.lock(cancel.listener()).await.expect_err("second lock");
        assert!(matches!(err, Error::InvalidState { .. }));

        lock.unlock().await.expect("unlock");
    }

    #[tokio::test]
    async fn lock_fails_when_spent() {
        let store = Arc::new(InMemoryStore::new());
        let lock = test_lock(store);

        let cancel = StopSignal::new();
        lock.lock(cancel.listener()).await.expect("lock");
        lock.unlock().await.expect("unlock");

        let err = lock.lock(cancel.listener()).await.expect_err("reuse");
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[tokio::test]
    async fn cancelled_acquisition_is_not_an_error() {
        let store = Arc::new(InMemoryStore::new());

        // Seed an incumbent so acquisition cannot succeed immediately.
        let incumbent = LockRecord::new("core/lock", "other", "someone-else");
        store.seed(
            &ObjectLocation::new("tenancy", "ha-locks", "core/lock"),
            incumbent.encode().expect("encode"),
        );

        let lock = test_lock(store);
        let cancel = StopSignal::new();
        let listener = cancel.listener();

        let cancel_task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            cancel.fire();
        });

        let outcome = lock.lock(listener).await.expect("lock");
        assert!(outcome.is_none());
        cancel_task.await.expect("join");
    }

    #[tokio::test]
    async fn unchanged_incumbent_keeps_its_first_observation_instant() {
        let store = Arc::new(InMemoryStore::new());
        let location = ObjectLocation::new("tenancy", "ha-locks", "core/lock");
        let incumbent = LockRecord::new("core/lock", "other", "someone-else");
        store.seed(&location, incumbent.encode().expect("encode"));

        let lock = test_lock(Arc::clone(&store));

        // First observation of this etag generation starts the gate clock.
        assert!(!lock.shared.write_lock().await.expect("write_lock"));
        let first = lock.shared.cache.load().expect("snapshot");

        tokio::time::sleep(Duration::from_millis(50)).await;

        // Same etag generation: the snapshot keeps its original observation
        // instant, so the gate keeps aging instead of restarting.
        assert!(!lock.shared.write_lock().await.expect("write_lock"));
        let second = lock.shared.cache.load().expect("snapshot");
        assert!(
            Arc::ptr_eq(&first, &second),
            "cache must not refresh while the etag is unchanged"
        );
        assert!(second.age() >= Duration::from_millis(50));

        // A renewed record (new etag) restarts the observation clock.
        let renewed = LockRecord::new("core/lock", "other", "someone-else");
        store.seed(&location, renewed.encode().expect("encode"));
        assert!(!lock.shared.write_lock().await.expect("write_lock"));
        let third = lock.shared.cache.load().expect("snapshot");
        assert!(!Arc::ptr_eq(&second, &third));
        assert!(third.age() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn value_reports_any_claimant() {
        let store = Arc::new(InMemoryStore::new());
        let location = ObjectLocation::new("tenancy", "ha-locks", "core/lock");

        let lock = test_lock(Arc::clone(&store));
        assert_eq!(lock.value().await.expect("value"), None);

        let incumbent = LockRecord::new("core/lock", "10.9.9.9:8200", "someone-else");
        store.seed(&location, incumbent.encode().expect("encode"));

        assert_eq!(
            lock.value().await.expect("value"),
            Some("10.9.9.9:8200".to_string())
        );
    }
}

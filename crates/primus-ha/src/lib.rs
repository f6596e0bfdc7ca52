//! # primus-ha
//!
//! Leader election over object-store CAS: at most one active leader per key
//! at any real instant, even under partitions, stale caches, and 5xx bursts
//! from the store.
//!
//! The design prioritizes ensuring that there are never two leaders over
//! high availability of the leader itself: when in doubt, leadership is
//! surrendered.
//!
//! ## How It Works
//!
//! 1. Each contender holds a [`HaLock`] with a unique identity and races to
//!    write the lock record with an `If-None-Match` / `If-Match`
//!    precondition; the store's etag CAS picks exactly one winner per
//!    generation
//! 2. The winner renews the record on an interval and watches it on another;
//!    a watch that cannot prove the record is still ours closes the
//!    leadership channel
//! 3. A secondary may overwrite an incumbent record only after observing the
//!    same etag generation for `cache_min_acceptable_age` - long enough
//!    that an incumbent that stopped renewing cannot still believe it is
//!    leader
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use primus_core::store::InMemoryStore;
//! use primus_ha::{HaBackend, HaConfig, StopSignal};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let backend = HaBackend::new(store, "tenancy", "ha-locks", HaConfig::default())?;
//!
//! let lock = backend.lock_with("core/lock", "10.0.0.7:8200");
//! let cancel = StopSignal::new();
//!
//! if let Some(mut leadership) = lock.lock(cancel.listener()).await? {
//!     // We are the leader until `leadership` resolves.
//!     leadership.fired().await;
//! }
//! lock.unlock().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod backend;
pub mod cache;
pub mod config;
pub mod lock;
pub mod metrics;
pub mod record;
pub mod signal;

pub use backend::HaBackend;
pub use cache::{CacheEntry, LockCache};
pub use config::HaConfig;
pub use lock::HaLock;
pub use record::LockRecord;
pub use signal::{StopListener, StopSignal};

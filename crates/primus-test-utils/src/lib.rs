//! Shared test utilities for primus integration tests.
//!
//! This crate provides:
//! - [`RecordingStore`]: an in-memory object store that records every
//!   operation and injects faults on demand
//! - [`init_test_logging`]: opt-in log output for debugging test runs
//!
//! # Example
//!
//! ```rust,ignore
//! use primus_test_utils::RecordingStore;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = RecordingStore::new();
//!     store.fail_next_puts(3); // next three writes answer with a 5xx
//!     // ... drive the lock ...
//!     assert_eq!(store.put_count(), 4);
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::missing_panics_doc)]

pub mod storage;

pub use storage::{RecordingStore, StoreOp};

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

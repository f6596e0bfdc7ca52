//! # primus-core
//!
//! Core abstractions for the primus leader-election primitive.
//!
//! This crate provides the foundational types shared by all primus components:
//!
//! - **Object-Store Contract**: An async trait for conditional GET/PUT/DELETE
//!   against a remote object store, with entity tags as the CAS token
//! - **Error Types**: Shared error definitions with a transient/terminal
//!   classification used by every retry decision
//! - **Observability**: Structured-logging bootstrap and span helpers
//!
//! ## Crate Boundary
//!
//! `primus-core` is the only crate allowed to define shared primitives. The
//! real cloud SDK binding lives outside this workspace; anything that can
//! answer the [`store::ObjectStore`] contract can back the lock.
//!
//! ## Example
//!
//! ```rust
//! use primus_core::prelude::*;
//!
//! let location = ObjectLocation::new("tenancy-a", "ha-locks", "core/lock");
//! assert_eq!(location.to_string(), "tenancy-a/ha-locks/core/lock");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod observability;
pub mod store;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use primus_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::store::{
        DeleteOutcome, InMemoryStore, ObjectBody, ObjectLocation, ObjectStore, PutCondition,
        PutOutcome,
    };
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use observability::{LogFormat, init_logging};
pub use store::{
    DeleteOutcome, InMemoryStore, ObjectBody, ObjectLocation, ObjectStore, PutCondition, PutOutcome,
};

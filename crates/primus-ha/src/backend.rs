//! The lock factory.
//!
//! One [`HaBackend`] per process holds the shared object-store client, the
//! namespace/bucket the lock objects live in, and the tunables. Lock
//! instances are minted from it, each with a fresh identity.

use std::sync::Arc;

use primus_core::error::Result;
use primus_core::store::{ObjectLocation, ObjectStore};

use crate::config::HaConfig;
use crate::lock::HaLock;

/// Factory for [`HaLock`] instances sharing one store client and bucket.
pub struct HaBackend {
    store: Arc<dyn ObjectStore>,
    namespace: String,
    bucket: String,
    config: HaConfig,
    ha_enabled: bool,
}

impl std::fmt::Debug for HaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaBackend")
            .field("namespace", &self.namespace)
            .field("bucket", &self.bucket)
            .field("config", &self.config)
            .field("ha_enabled", &self.ha_enabled)
            .finish()
    }
}

impl HaBackend {
    /// Creates a backend over the given store client.
    ///
    /// `bucket` names the bucket holding the lock objects; each lock key
    /// becomes one object name within it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](primus_core::Error::InvalidConfig)
    /// if the tunables violate the safety relation
    /// `cache_min_acceptable_age > ttl > renew_interval`.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        namespace: impl Into<String>,
        bucket: impl Into<String>,
        config: HaConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            namespace: namespace.into(),
            bucket: bucket.into(),
            config,
            ha_enabled: true,
        })
    }

    /// Disables (or re-enables) high availability.
    ///
    /// A disabled backend still mints locks; the flag only reports the
    /// deployment's intent to the enclosing server.
    #[must_use]
    pub fn with_ha_enabled(mut self, enabled: bool) -> Self {
        self.ha_enabled = enabled;
        self
    }

    /// Whether this backend participates in leader election.
    #[must_use]
    pub fn ha_enabled(&self) -> bool {
        self.ha_enabled
    }

    /// Mints a lock instance for the given key.
    ///
    /// Cheap, does no I/O. The value travels in the lock record and is what
    /// other contenders see via [`HaLock::value`] - typically the leader's
    /// advertised address.
    #[must_use]
    pub fn lock_with(&self, key: impl Into<String>, value: impl Into<String>) -> HaLock {
        let location = ObjectLocation::new(&self.namespace, &self.bucket, key);
        HaLock::new(
            Arc::clone(&self.store),
            location,
            value,
            self.config.clone(),
        )
    }
}

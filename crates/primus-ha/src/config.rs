//! Tunables for the lock protocol.
//!
//! The defaults are safe for production. Tests shrink them to millisecond
//! scale; the safety relation is validated either way.

use std::time::Duration;

use primus_core::error::{Error, Result};

/// Time to wait between lease renewals while leader.
pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(3);

/// Time to wait between acquisition attempts while contending.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Lease lifetime. A cache snapshot older than this is stale.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15);

/// Time to wait between watch probes while leader.
pub const DEFAULT_WATCH_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Consecutive watch failures tolerated before leadership is surrendered.
pub const DEFAULT_WATCH_RETRY_MAX: u32 = 4;

/// Minimum observation age before a secondary may attempt takeover.
///
/// Strictly greater than the owner's renew interval and comparable to the
/// lease TTL: a secondary must have watched the incumbent fail to renew for
/// long enough that the incumbent itself cannot still believe it is leader.
pub const DEFAULT_CACHE_MIN_ACCEPTABLE_AGE: Duration = Duration::from_secs(45);

/// Number of attempts made on transient write failures.
pub const DEFAULT_WRITE_RETRIES_ON_FAILURES: u32 = 4;

/// Per-call deadline for object-store reads.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Per-call deadline for object-store writes.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Lock protocol tunables.
///
/// The relation `cache_min_acceptable_age > ttl > renew_interval` must hold;
/// [`HaConfig::validate`] refuses violating settings and the backend will
/// not start with them.
#[derive(Debug, Clone)]
pub struct HaConfig {
    /// Period between renew attempts while leader.
    pub renew_interval: Duration,
    /// Period between acquire attempts while contending.
    pub retry_interval: Duration,
    /// Lease lifetime; cache older than this is stale.
    pub ttl: Duration,
    /// Period between watch probes.
    pub watch_retry_interval: Duration,
    /// Consecutive watch failures tolerated before surrender.
    pub watch_retry_max: u32,
    /// Minimum observation age before a secondary may attempt takeover.
    pub cache_min_acceptable_age: Duration,
    /// Attempt ceiling for transient write failures.
    pub write_retries_on_failures: u32,
    /// Per-call deadline for reads.
    pub read_timeout: Duration,
    /// Per-call deadline for writes.
    pub write_timeout: Duration,
}

impl Default for HaConfig {
    fn default() -> Self {
        Self {
            renew_interval: DEFAULT_RENEW_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            ttl: DEFAULT_TTL,
            watch_retry_interval: DEFAULT_WATCH_RETRY_INTERVAL,
            watch_retry_max: DEFAULT_WATCH_RETRY_MAX,
            cache_min_acceptable_age: DEFAULT_CACHE_MIN_ACCEPTABLE_AGE,
            write_retries_on_failures: DEFAULT_WRITE_RETRIES_ON_FAILURES,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl HaConfig {
    /// Checks the safety relations between the tunables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if any relation is violated.
    pub fn validate(&self) -> Result<()> {
        if self.renew_interval.is_zero()
            || self.retry_interval.is_zero()
            || self.watch_retry_interval.is_zero()
        {
            return Err(Error::InvalidConfig {
                message: "intervals must be non-zero".into(),
            });
        }
        if self.watch_retry_max == 0 || self.write_retries_on_failures == 0 {
            return Err(Error::InvalidConfig {
                message: "retry ceilings must be non-zero".into(),
            });
        }
        if self.ttl <= self.renew_interval {
            return Err(Error::InvalidConfig {
                message: format!(
                    "ttl ({:?}) must exceed renew_interval ({:?})",
                    self.ttl, self.renew_interval
                ),
            });
        }
        if self.cache_min_acceptable_age <= self.ttl {
            return Err(Error::InvalidConfig {
                message: format!(
                    "cache_min_acceptable_age ({:?}) must exceed ttl ({:?})",
                    self.cache_min_acceptable_age, self.ttl
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        HaConfig::default().validate().expect("defaults");
    }

    #[test]
    fn rejects_ttl_not_above_renew_interval() {
        let config = HaConfig {
            renew_interval: Duration::from_secs(15),
            ttl: Duration::from_secs(15),
            ..HaConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_min_age_not_above_ttl() {
        let config = HaConfig {
            cache_min_acceptable_age: Duration::from_secs(15),
            ..HaConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_zero_intervals_and_ceilings() {
        let config = HaConfig {
            watch_retry_interval: Duration::ZERO,
            ..HaConfig::default()
        };
        assert!(config.validate().is_err());

        let config = HaConfig {
            write_retries_on_failures: 0,
            ..HaConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

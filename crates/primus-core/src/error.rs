//! Error types and result aliases for primus.
//!
//! Every retry decision in the lock protocol keys off the same
//! classification: transient remote failures may be retried with backoff,
//! everything else is terminal for the operation that hit it.

use std::fmt;

/// The result type used throughout primus.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in primus operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The object store could not be reached or answered with a server
    /// failure (transport error, timeout, HTTP 5xx).
    #[error("object store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The object store rejected the request outright (HTTP 4xx other than
    /// the precondition handling built into the store contract).
    #[error("object store rejected request: {message}")]
    Rejected {
        /// Description of the rejection.
        message: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// A path or object was expected to exist but was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Configured tunables violate a safety relation.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the violated relation.
        message: String,
    },

    /// The operation is not valid in the current lifecycle state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the conflict.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new unavailable error with the given message.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new unavailable error with a source cause.
    #[must_use]
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new rejected error with the given message.
    #[must_use]
    pub fn rejected(message: impl fmt::Display) -> Self {
        Self::Rejected {
            message: message.to_string(),
        }
    }

    /// Creates a new serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl fmt::Display) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }

    /// Returns whether this error is worth retrying.
    ///
    /// Only remote unavailability qualifies. Rejections, serialization
    /// failures, and configuration errors do not change on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::unavailable("502 bad gateway").is_transient());
        assert!(
            Error::unavailable_with_source("timed out", std::io::Error::other("io"))
                .is_transient()
        );

        assert!(!Error::rejected("403 forbidden").is_transient());
        assert!(!Error::serialization("bad json").is_transient());
        assert!(!Error::NotFound("lock".into()).is_transient());
        assert!(
            !Error::InvalidConfig {
                message: "ttl".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn unavailable_preserves_source() {
        let err = Error::unavailable_with_source("timed out", std::io::Error::other("reset"));
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("reset"));
    }
}

//! Observability infrastructure for primus.
//!
//! Structured logging with consistent spans. The lock protocol narrates
//! every state transition at debug level; this module provides the
//! initialization helper and the span constructor used for that narration.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `primus_ha=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for lock operations with standard fields.
///
/// # Example
///
/// ```rust
/// use primus_core::observability::lock_span;
///
/// let span = lock_span("lock", "core/lock", "b2f1c0de");
/// let _guard = span.enter();
/// // ... drive the lock operation
/// ```
#[must_use]
pub fn lock_span(operation: &str, key: &str, identity: &str) -> Span {
    tracing::info_span!(
        "ha_lock",
        op = operation,
        key = key,
        identity = identity,
    )
}

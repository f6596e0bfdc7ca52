//! Lock metrics.
//!
//! Counters for remote-call failures, gauges for leadership and watch
//! degradation, histograms for operation latency. These complement the
//! debug-level narration in the lock module.

use std::time::Instant;

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};

// ============================================================================
// Metric names
// ============================================================================

/// Leadership gauge: 1 while this instance believes it is leader.
pub const LEADER: &str = "primus_ha_leader";

/// Watch degradation gauge: 1 while the watch loop is retrying failures.
pub const WATCH_RETRIABLE: &str = "primus_ha_watch_retriable";

/// Successful acquisitions counter.
pub const LOCK_ACQUIRED: &str = "primus_ha_lock_acquired_total";

/// Leadership surrenders counter.
pub const LOCK_SURRENDERED: &str = "primus_ha_lock_surrendered_total";

/// Failed remote reads counter.
pub const GET_FAILED: &str = "primus_ha_get_failed_total";

/// Failed remote writes counter.
pub const PUT_FAILED: &str = "primus_ha_put_failed_total";

/// Failed remote deletes counter.
pub const DELETE_FAILED: &str = "primus_ha_delete_failed_total";

/// Operation duration histogram, labelled by operation.
pub const OP_DURATION: &str = "primus_ha_op_duration_seconds";

// ============================================================================
// Registration
// ============================================================================

/// Registers all lock metric descriptions.
///
/// Call once at application startup after installing the metrics recorder.
pub fn register_metrics() {
    describe_gauge!(LEADER, "1 while this instance believes it is leader");
    describe_gauge!(
        WATCH_RETRIABLE,
        "1 while the watch loop is retrying remote failures"
    );
    describe_counter!(LOCK_ACQUIRED, "Total successful lock acquisitions");
    describe_counter!(LOCK_SURRENDERED, "Total leadership surrenders");
    describe_counter!(GET_FAILED, "Total failed lock-record reads");
    describe_counter!(PUT_FAILED, "Total failed lock-record writes");
    describe_counter!(DELETE_FAILED, "Total failed lock-record deletes");
    describe_histogram!(OP_DURATION, "Duration of lock operations in seconds");
}

// ============================================================================
// Recording
// ============================================================================

/// Sets the leadership gauge for a key.
pub fn set_leader(key: &str, leader: bool) {
    gauge!(LEADER, "key" => key.to_string()).set(if leader { 1.0 } else { 0.0 });
}

/// Sets the watch degradation gauge for a key.
pub fn set_watch_retriable(key: &str, degraded: bool) {
    gauge!(WATCH_RETRIABLE, "key" => key.to_string()).set(if degraded { 1.0 } else { 0.0 });
}

/// Records a successful acquisition.
pub fn inc_lock_acquired(key: &str) {
    counter!(LOCK_ACQUIRED, "key" => key.to_string()).increment(1);
}

/// Records a leadership surrender.
pub fn inc_lock_surrendered(key: &str) {
    counter!(LOCK_SURRENDERED, "key" => key.to_string()).increment(1);
}

/// Records a failed remote read.
pub fn inc_get_failed(key: &str) {
    counter!(GET_FAILED, "key" => key.to_string()).increment(1);
}

/// Records a failed remote write.
pub fn inc_put_failed(key: &str) {
    counter!(PUT_FAILED, "key" => key.to_string()).increment(1);
}

/// Records a failed remote delete.
pub fn inc_delete_failed(key: &str) {
    counter!(DELETE_FAILED, "key" => key.to_string()).increment(1);
}

/// Records an operation's duration on drop.
///
/// Held from the top of an operation so the measurement fires on every
/// exit path, early returns and errors included.
pub struct OpTimer {
    operation: &'static str,
    started: Instant,
}

impl OpTimer {
    /// Starts timing the given operation.
    #[must_use]
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            started: Instant::now(),
        }
    }
}

impl Drop for OpTimer {
    fn drop(&mut self) {
        histogram!(OP_DURATION, "op" => self.operation)
            .record(self.started.elapsed().as_secs_f64());
    }
}

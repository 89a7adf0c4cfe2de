// Metrics for the lock protocol
// Recording goes through the `metrics` facade; without an installed recorder it is a no-op

use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

pub const ACQUIRE_TOTAL: &str = "keylock_acquire_total";
pub const ACQUIRE_WAIT_SECONDS: &str = "keylock_acquire_wait_seconds";
pub const RELEASE_TOTAL: &str = "keylock_release_total";
pub const STORE_ERRORS_TOTAL: &str = "keylock_store_errors_total";
pub const REENTRANT_ENTRIES: &str = "keylock_reentrant_entries";

/// Register metric descriptions
/// Should be called once at application startup
pub fn describe_metrics() {
    describe_counter!(
        ACQUIRE_TOTAL,
        "Lock acquisitions by result (acquired, reentrant, exhausted, cancelled)"
    );
    describe_histogram!(
        ACQUIRE_WAIT_SECONDS,
        "Time spent in the acquire retry loop in seconds"
    );
    describe_counter!(
        RELEASE_TOTAL,
        "Lock releases by result (released, still_held, mismatch, without_hold)"
    );
    describe_counter!(
        STORE_ERRORS_TOTAL,
        "Store failures by operation"
    );
    describe_gauge!(
        REENTRANT_ENTRIES,
        "Number of (context, key) entries held by this process"
    );
}

/// Record an acquisition result
pub fn record_acquire(result: &'static str) {
    counter!(ACQUIRE_TOTAL, "result" => result).increment(1);
}

/// Record time spent acquiring from the store
pub fn record_acquire_wait(started: Instant) {
    histogram!(ACQUIRE_WAIT_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Record a release result
pub fn record_release(result: &'static str) {
    counter!(RELEASE_TOTAL, "result" => result).increment(1);
}

/// Record a store failure
pub fn record_store_error(operation: &'static str) {
    counter!(STORE_ERRORS_TOTAL, "op" => operation).increment(1);
}

/// Update the reentrant entry gauge
pub fn set_reentrant_entries(count: usize) {
    gauge!(REENTRANT_ENTRIES).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_acquire("acquired");
        record_acquire_wait(Instant::now());
        record_release("released");
        record_store_error("acquire_if_absent");
        set_reentrant_entries(3);
    }
}

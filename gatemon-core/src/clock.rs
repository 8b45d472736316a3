//! Millisecond wall-clock source.
//!
//! Every timestamp in the harness (monitor rows, injection intervals,
//! cadence arithmetic) comes from this one function, so the monitor and
//! the campaign process agree on a time base without any shared state.

use chrono::Utc;

/// Current wall-clock time in integer milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

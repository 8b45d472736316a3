//! Fault primitives.
//!
//! An injector perturbs the host for a bounded duration and records the
//! interval it was active. `inject()` starts the fault in isolated workers
//! and returns immediately; the campaign loop never waits on a fault.
//! Workers are torn down at the duration boundary or on `force_stop()`.

pub mod cpu;
pub mod deadlock;
pub mod disk;
pub mod http;
pub mod memory;
pub mod process;
pub mod redis;
pub mod spec;
pub mod spin;
pub mod worker;

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::clock::now_ms;

pub use spec::{InjectorRecord, build_injectors, load_spec};

/// One completed activation, in wall-clock milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

/// A bounded synthetic fault.
#[async_trait]
pub trait Injector: Send + Sync {
    /// Stable identifier encoding the variant and its parameters,
    /// e.g. `[]CPUStressInjection(d1000)`.
    fn name(&self) -> String;

    /// True while an activation is in flight.
    fn running(&self) -> bool;

    /// Start the fault and return immediately. A call while already
    /// running is a no-op (the campaign's mutual exclusion prevents it).
    async fn inject(&self);

    /// Best-effort termination of all workers; closes the current interval.
    async fn force_stop(&self);

    /// Completed intervals, in activation order.
    fn intervals(&self) -> Vec<Interval>;
}

/// Shared activation state: the liveness flag, the interval log, and the
/// cancellation handle of the activation in flight.
pub(crate) struct InjectorState {
    running: AtomicBool,
    intervals: Mutex<Vec<Interval>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl InjectorState {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            intervals: Mutex::new(Vec::new()),
            cancel: Mutex::new(None),
        }
    }

    /// Transition `idle → running`. Returns the activation's cancellation
    /// token, or `None` when an activation is already in flight.
    pub(crate) fn try_begin(&self) -> Option<CancellationToken> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let token = CancellationToken::new();
        if let Ok(mut slot) = self.cancel.lock() {
            *slot = Some(token.clone());
        }
        Some(token)
    }

    /// Transition `running → done`: append the interval and go idle.
    pub(crate) fn finish(&self, start: i64) {
        self.finish_with_end(start, now_ms());
    }

    /// Like [`finish`](Self::finish) with an explicit end, for bodies that
    /// do cleanup work after the fault window closes.
    pub(crate) fn finish_with_end(&self, start: i64, end: i64) {
        if let Ok(mut intervals) = self.intervals.lock() {
            intervals.push(Interval { start, end });
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Go idle without recording an interval (the fault never ran).
    pub(crate) fn abort(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub(crate) fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn intervals(&self) -> Vec<Interval> {
        self.intervals
            .lock()
            .map(|intervals| intervals.clone())
            .unwrap_or_default()
    }

    /// Cancel the in-flight activation and wait (bounded) for the body to
    /// observe it and close its interval.
    pub(crate) async fn force_stop(&self) {
        let token = self
            .cancel
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(token) = token {
            token.cancel();
        }
        let deadline = now_ms() + 1000;
        while self.running() && now_ms() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_is_exclusive_until_finish() {
        let state = InjectorState::new();
        let token = state.try_begin();
        assert!(token.is_some());
        assert!(state.running());
        assert!(state.try_begin().is_none());

        state.finish(now_ms() - 5);
        assert!(!state.running());
        assert!(state.try_begin().is_some());
    }

    #[test]
    fn finish_appends_one_interval() {
        let state = InjectorState::new();
        let _token = state.try_begin();
        let start = now_ms() - 50;
        state.finish(start);

        let intervals = state.intervals();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start, start);
        assert!(intervals[0].end >= start);
    }

    #[test]
    fn abort_records_nothing() {
        let state = InjectorState::new();
        let _token = state.try_begin();
        state.abort();
        assert!(!state.running());
        assert!(state.intervals().is_empty());
    }

    #[tokio::test]
    async fn force_stop_cancels_the_activation_token() {
        let state = InjectorState::new();
        let token = state.try_begin().unwrap();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });
        // The body finishes as soon as it observes the cancellation.
        state.finish(now_ms());
        state.force_stop().await;
        handle.await.unwrap();
    }
}

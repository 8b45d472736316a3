//! Memory pressure fault: grow a buffer block by block.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::now_ms;
use crate::inject::{Injector, InjectorState, Interval};

pub const DEFAULT_ITEMS_FOR_LOOP: u64 = 1_234_567;

/// Appends fixed-size blocks to a growing buffer, yielding ~1 ms between
/// blocks, until the duration elapses. Runs in a single worker thread so
/// the allocation pressure lands on the campaign process.
#[derive(Clone)]
pub struct MemoryInjector {
    tag: String,
    duration_ms: i64,
    items_for_loop: u64,
    state: Arc<InjectorState>,
}

impl std::fmt::Debug for MemoryInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryInjector").field("name", &self.name()).finish()
    }
}

impl MemoryInjector {
    pub fn new(tag: impl Into<String>, duration_ms: i64, items_for_loop: u64) -> Self {
        Self {
            tag: tag.into(),
            duration_ms,
            items_for_loop,
            state: Arc::new(InjectorState::new()),
        }
    }
}

#[async_trait]
impl Injector for MemoryInjector {
    fn name(&self) -> String {
        format!(
            "[{}]MemoryUsageInjection-{}i-(d{})",
            self.tag, self.items_for_loop, self.duration_ms
        )
    }

    fn running(&self) -> bool {
        self.state.running()
    }

    async fn inject(&self) {
        let Some(cancel) = self.state.try_begin() else {
            return;
        };
        let state = Arc::clone(&self.state);
        let duration_ms = self.duration_ms;
        let items = self.items_for_loop as usize;
        tokio::task::spawn_blocking(move || {
            let start = now_ms();
            let mut hoard: Vec<Vec<i64>> = Vec::new();
            loop {
                hoard.push(vec![999i64; items]);
                if now_ms() - start > duration_ms || cancel.is_cancelled() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            drop(hoard);
            state.finish(start);
        });
    }

    async fn force_stop(&self) {
        self.state.force_stop().await;
    }

    fn intervals(&self) -> Vec<Interval> {
        self.state.intervals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_fault_is_duration_bounded() {
        // Small blocks keep the test lightweight.
        let injector = MemoryInjector::new("", 50, 1024);
        injector.inject().await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!injector.running());
        let intervals = injector.intervals();
        assert_eq!(intervals.len(), 1);
        assert!(intervals[0].end - intervals[0].start >= 50);
    }

    #[test]
    fn name_encodes_block_size() {
        let injector = MemoryInjector::new("", 1000, DEFAULT_ITEMS_FOR_LOOP);
        assert_eq!(injector.name(), "[]MemoryUsageInjection-1234567i-(d1000)");
    }
}

//! Spin fault: one tight loop on the campaign's own CPU.

use std::sync::Arc;

use async_trait::async_trait;

use crate::clock::now_ms;
use crate::inject::{Injector, InjectorState, Interval};

#[derive(Clone)]
pub struct SpinInjector {
    tag: String,
    duration_ms: i64,
    state: Arc<InjectorState>,
}

impl std::fmt::Debug for SpinInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinInjector").field("name", &self.name()).finish()
    }
}

impl SpinInjector {
    pub fn new(tag: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            tag: tag.into(),
            duration_ms,
            state: Arc::new(InjectorState::new()),
        }
    }
}

#[async_trait]
impl Injector for SpinInjector {
    fn name(&self) -> String {
        format!("[{}]SpinInjection(d{})", self.tag, self.duration_ms)
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
        tokio::task::spawn_blocking(move || {
            let start = now_ms();
            while now_ms() - start < duration_ms && !cancel.is_cancelled() {
                // Busy wait; that is the fault.
            }
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

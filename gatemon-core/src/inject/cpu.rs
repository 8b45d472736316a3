//! CPU stress fault: one busy worker process per logical CPU.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::clock::now_ms;
use crate::inject::worker::worker_command;
use crate::inject::{Injector, InjectorState, Interval};

/// Fans out one `stress cpu-burn` process per logical CPU so the host
/// scheduler is actually contended, then reaps the pool at the duration
/// boundary.
#[derive(Clone)]
pub struct CpuStressInjector {
    tag: String,
    duration_ms: i64,
    state: Arc<InjectorState>,
}

impl std::fmt::Debug for CpuStressInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuStressInjector").field("name", &self.name()).finish()
    }
}

impl CpuStressInjector {
    pub fn new(tag: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            tag: tag.into(),
            duration_ms,
            state: Arc::new(InjectorState::new()),
        }
    }
}

pub(crate) async fn kill_pool(children: &mut Vec<Child>) {
    for child in children.iter_mut() {
        let _ = child.start_kill();
    }
    for child in children.iter_mut() {
        let _ = child.wait().await;
    }
    children.clear();
}

/// Sleep out the duration (or the cancellation), then reap the pool and
/// close the interval. Shared by every process-pool injector.
pub(crate) async fn run_pool(
    state: Arc<InjectorState>,
    cancel: CancellationToken,
    start: i64,
    duration_ms: i64,
    mut children: Vec<Child>,
) {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(duration_ms.max(0) as u64)) => {}
        _ = cancel.cancelled() => {
            debug!("worker pool force-stopped");
        }
    }
    kill_pool(&mut children).await;
    state.finish(start);
}

#[async_trait]
impl Injector for CpuStressInjector {
    fn name(&self) -> String {
        format!("[{}]CPUStressInjection(d{})", self.tag, self.duration_ms)
    }

    fn running(&self) -> bool {
        self.state.running()
    }

    async fn inject(&self) {
        let Some(cancel) = self.state.try_begin() else {
            return;
        };
        let start = now_ms();
        let mut children = Vec::new();
        for _ in 0..num_cpus::get() {
            let spawned = worker_command()
                .and_then(|mut command| command.arg("cpu-burn").spawn());
            match spawned {
                Ok(child) => children.push(child),
                Err(err) => {
                    error!("failed to spawn cpu-burn worker: {err}");
                    kill_pool(&mut children).await;
                    self.state.abort();
                    return;
                }
            }
        }
        let state = Arc::clone(&self.state);
        let duration_ms = self.duration_ms;
        tokio::spawn(run_pool(state, cancel, start, duration_ms, children));
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

    #[test]
    fn name_encodes_variant_and_duration() {
        let injector = CpuStressInjector::new("", 1000);
        assert_eq!(injector.name(), "[]CPUStressInjection(d1000)");
    }
}

//! Deadlock fault: groups of workers blocking on opposite-order locks.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::clock::now_ms;
use crate::inject::cpu::{kill_pool, run_pool};
use crate::inject::worker::worker_command;
use crate::inject::{Injector, InjectorState, Interval};

pub const DEFAULT_N_THREADS: usize = 2;
pub const DEFAULT_N_LOCKS: usize = 1;

/// Teardown latency reserve: the pool is reaped this much before the
/// nominal duration, since deadlocked workers only die by SIGKILL.
const TEARDOWN_RESERVE_MS: i64 = 20;

/// `n_locks` independent groups, each a child process whose `n_threads`
/// workers take two locks in opposite orders until they mutually block.
#[derive(Clone)]
pub struct DeadlockInjector {
    tag: String,
    duration_ms: i64,
    n_threads: usize,
    n_locks: usize,
    state: Arc<InjectorState>,
}

impl std::fmt::Debug for DeadlockInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlockInjector").field("name", &self.name()).finish()
    }
}

impl DeadlockInjector {
    pub fn new(
        tag: impl Into<String>,
        duration_ms: i64,
        n_threads: usize,
        n_locks: usize,
    ) -> Self {
        Self {
            tag: tag.into(),
            duration_ms,
            // Fewer than two threads cannot deadlock.
            n_threads: n_threads.max(2),
            n_locks,
            state: Arc::new(InjectorState::new()),
        }
    }
}

#[async_trait]
impl Injector for DeadlockInjector {
    fn name(&self) -> String {
        format!(
            "[{}]DeadlockInjection-{}t-{}l-(d{})",
            self.tag, self.n_threads, self.n_locks, self.duration_ms
        )
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
        for _ in 0..self.n_locks {
            let spawned = worker_command().and_then(|mut command| {
                command
                    .arg("deadlock")
                    .arg("--threads")
                    .arg(self.n_threads.to_string())
                    .spawn()
            });
            match spawned {
                Ok(child) => children.push(child),
                Err(err) => {
                    error!("failed to spawn deadlock group: {err}");
                    kill_pool(&mut children).await;
                    self.state.abort();
                    return;
                }
            }
        }
        let state = Arc::clone(&self.state);
        let budget = (self.duration_ms - TEARDOWN_RESERVE_MS).max(0);
        tokio::spawn(run_pool(state, cancel, start, budget, children));
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
    fn name_encodes_group_shape() {
        let injector = DeadlockInjector::new("", 2000, 4, 3);
        assert_eq!(injector.name(), "[]DeadlockInjection-4t-3l-(d2000)");
    }

    #[test]
    fn thread_count_floors_at_two() {
        let injector = DeadlockInjector::new("", 1000, 1, 1);
        assert_eq!(injector.name(), "[]DeadlockInjection-2t-1l-(d1000)");
    }
}

//! HTTP read fault: parallel GET cyclers over a site list.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::clock::now_ms;
use crate::inject::cpu::{kill_pool, run_pool};
use crate::inject::worker::worker_command;
use crate::inject::{Injector, InjectorState, Interval};

pub const DEFAULT_PARALLEL_READS: usize = 1;

pub fn default_sites() -> Vec<String> {
    vec!["www.google.com".to_string()]
}

/// `parallel_reads` worker processes, each cycling through the URL list
/// with blocking GETs and discarding the responses. Fetch failures are
/// no-ops; the network load is the fault.
#[derive(Clone)]
pub struct HttpReadInjector {
    tag: String,
    duration_ms: i64,
    parallel_reads: usize,
    sites: Vec<String>,
    state: Arc<InjectorState>,
}

impl std::fmt::Debug for HttpReadInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReadInjector").field("name", &self.name()).finish()
    }
}

impl HttpReadInjector {
    pub fn new(
        tag: impl Into<String>,
        duration_ms: i64,
        parallel_reads: usize,
        sites: Vec<String>,
    ) -> Self {
        Self {
            tag: tag.into(),
            duration_ms,
            parallel_reads,
            sites,
            state: Arc::new(InjectorState::new()),
        }
    }
}

#[async_trait]
impl Injector for HttpReadInjector {
    fn name(&self) -> String {
        format!(
            "[{}]HTTPReadInjection-{}r-(d{})",
            self.tag, self.parallel_reads, self.duration_ms
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
        for _ in 0..self.parallel_reads {
            let spawned = worker_command().and_then(|mut command| {
                command.arg("http");
                for url in &self.sites {
                    command.arg("--url").arg(url);
                }
                command.spawn()
            });
            match spawned {
                Ok(child) => children.push(child),
                Err(err) => {
                    error!("failed to spawn http read worker: {err}");
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

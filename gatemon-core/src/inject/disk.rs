//! Disk stress fault: parallel write/readback/delete churn in a scratch dir.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::clock::now_ms;
use crate::inject::cpu::kill_pool;
use crate::inject::worker::worker_command;
use crate::inject::{Injector, InjectorState, Interval};

pub const DEFAULT_N_WORKERS: usize = 10;
pub const DEFAULT_N_BLOCKS: usize = 10;

/// `n_workers` child processes, each looping write/readback/delete of
/// `n_blocks` MiB files. Every activation gets its own temporary scratch
/// directory, removed wholesale when the pool is reaped, so workers killed
/// mid-write leak nothing.
#[derive(Clone)]
pub struct DiskStressInjector {
    tag: String,
    duration_ms: i64,
    n_workers: usize,
    n_blocks: usize,
    scratch_root: Option<PathBuf>,
    state: Arc<InjectorState>,
}

impl std::fmt::Debug for DiskStressInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskStressInjector").field("name", &self.name()).finish()
    }
}

impl DiskStressInjector {
    pub fn new(
        tag: impl Into<String>,
        duration_ms: i64,
        n_workers: usize,
        n_blocks: usize,
        scratch_root: Option<PathBuf>,
    ) -> Self {
        Self {
            tag: tag.into(),
            duration_ms,
            n_workers,
            n_blocks,
            scratch_root,
            state: Arc::new(InjectorState::new()),
        }
    }

    fn scratch_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("gatemon-disk-");
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }
}

#[async_trait]
impl Injector for DiskStressInjector {
    fn name(&self) -> String {
        format!(
            "[{}]DiskStressInjection-{}w-{}b-(d{})",
            self.tag, self.n_workers, self.n_blocks, self.duration_ms
        )
    }

    fn running(&self) -> bool {
        self.state.running()
    }

    async fn inject(&self) {
        let Some(cancel) = self.state.try_begin() else {
            return;
        };
        let scratch = match self.scratch_dir() {
            Ok(scratch) => scratch,
            Err(err) => {
                error!("failed to create disk stress scratch dir: {err}");
                self.state.abort();
                return;
            }
        };
        let start = now_ms();
        let mut children = Vec::new();
        for _ in 0..self.n_workers {
            let spawned = worker_command().and_then(|mut command| {
                command
                    .arg("disk")
                    .arg("--dir")
                    .arg(scratch.path())
                    .arg("--blocks")
                    .arg(self.n_blocks.to_string())
                    .spawn()
            });
            match spawned {
                Ok(child) => children.push(child),
                Err(err) => {
                    error!("failed to spawn disk stress worker: {err}");
                    kill_pool(&mut children).await;
                    self.state.abort();
                    return;
                }
            }
        }
        let state = Arc::clone(&self.state);
        let duration_ms = self.duration_ms;
        tokio::spawn(run_disk_pool(
            state, cancel, start, duration_ms, children, scratch,
        ));
    }

    async fn force_stop(&self) {
        self.state.force_stop().await;
    }

    fn intervals(&self) -> Vec<Interval> {
        self.state.intervals()
    }
}

async fn run_disk_pool(
    state: Arc<InjectorState>,
    cancel: CancellationToken,
    start: i64,
    duration_ms: i64,
    mut children: Vec<tokio::process::Child>,
    scratch: tempfile::TempDir,
) {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(duration_ms.max(0) as u64)) => {}
        _ = cancel.cancelled() => {}
    }
    kill_pool(&mut children).await;
    // Workers are dead; removing the scratch dir sweeps their leftovers.
    drop(scratch);
    state.finish(start);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_encodes_worker_and_block_counts() {
        let injector = DiskStressInjector::new("", 1000, 10, 10, None);
        assert_eq!(injector.name(), "[]DiskStressInjection-10w-10b-(d1000)");
    }

    #[test]
    fn scratch_dir_honors_the_configured_root() {
        let root = tempfile::tempdir().expect("tmpdir");
        let injector =
            DiskStressInjector::new("", 1000, 1, 1, Some(root.path().to_path_buf()));
        let scratch = injector.scratch_dir().unwrap();
        assert!(scratch.path().starts_with(root.path()));
    }
}

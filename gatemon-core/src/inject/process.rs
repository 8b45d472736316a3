//! Process-hang fault: SIGSTOP a target service for the duration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::clock::now_ms;
use crate::inject::{Injector, InjectorState, Interval};

pub const DEFAULT_PROCESS_NAME: &str = "arancino";

/// Stops every PID whose exact name matches the target, waits out the
/// duration, then resumes them. An absent target consumes the duration
/// slot without recording an interval, so the campaign gate still
/// advances.
#[derive(Clone)]
pub struct ProcessHangInjector {
    tag: String,
    duration_ms: i64,
    process_name: String,
    state: Arc<InjectorState>,
}

impl std::fmt::Debug for ProcessHangInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHangInjector").field("name", &self.name()).finish()
    }
}

impl ProcessHangInjector {
    pub fn new(
        tag: impl Into<String>,
        duration_ms: i64,
        process_name: impl Into<String>,
    ) -> Self {
        Self {
            tag: tag.into(),
            duration_ms,
            process_name: process_name.into(),
            state: Arc::new(InjectorState::new()),
        }
    }
}

async fn lookup_pids(process_name: &str) -> Vec<i32> {
    let output = Command::new("pgrep").arg("-x").arg(process_name).output().await;
    match output {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn signal_all(pids: &[i32], signal: Signal) {
    for pid in pids {
        if let Err(err) = kill(Pid::from_raw(*pid), signal) {
            warn!("could not send {signal:?} to pid {pid}: {err}");
        }
    }
}

#[async_trait]
impl Injector for ProcessHangInjector {
    fn name(&self) -> String {
        format!(
            "[{}]StopProcessInjection-{}-(d{})",
            self.tag, self.process_name, self.duration_ms
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
        let process_name = self.process_name.clone();
        tokio::spawn(async move {
            let pids = lookup_pids(&process_name).await;
            let sleep = tokio::time::sleep(Duration::from_millis(duration_ms.max(0) as u64));
            if pids.is_empty() {
                debug!("process '{process_name}' not running, idling out the slot");
                tokio::select! {
                    _ = sleep => {}
                    _ = cancel.cancelled() => {}
                }
                state.abort();
                return;
            }
            let start = now_ms();
            signal_all(&pids, Signal::SIGSTOP);
            tokio::select! {
                _ = sleep => {}
                _ = cancel.cancelled() => {}
            }
            signal_all(&pids, Signal::SIGCONT);
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

    #[test]
    fn name_encodes_the_target_process() {
        let injector = ProcessHangInjector::new("", 1000, DEFAULT_PROCESS_NAME);
        assert_eq!(injector.name(), "[]StopProcessInjection-arancino-(d1000)");
    }

    #[tokio::test]
    async fn absent_target_records_no_interval() {
        let injector =
            ProcessHangInjector::new("", 40, "definitely-not-running-xyz");
        injector.inject().await;
        assert!(injector.running());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!injector.running());
        assert!(injector.intervals().is_empty());
    }
}

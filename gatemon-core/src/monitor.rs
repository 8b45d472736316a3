//! Fixed-cadence sampling loop.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::clock::now_ms;
use crate::error::Result;
use crate::probe::ProbeRegistry;
use crate::sample::Sample;
use crate::sink::CsvSink;

/// What to do when a tick overruns its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlinePolicy {
    /// Report the miss and stop the loop. This is the policy of the
    /// campaign-coupled entry point, where a drifting monitor would skew
    /// the labeled dataset.
    Strict,
    /// Report the miss and keep sampling with an inflated interval.
    Lenient,
}

/// Outcome of one monitor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSummary {
    pub rows: u64,
    pub deadline_misses: u64,
}

/// Pulls one sample per tick from the registry and spills the in-memory
/// buffer to the sink on the batching policy.
#[derive(Debug)]
pub struct MonitorLoop {
    tick_ms: i64,
    total_ticks: u64,
    batch_size: usize,
    policy: DeadlinePolicy,
}

impl MonitorLoop {
    pub fn new(tick_ms: i64, total_ticks: u64, batch_size: usize, policy: DeadlinePolicy) -> Self {
        Self {
            tick_ms,
            total_ticks,
            batch_size: batch_size.max(1),
            policy,
        }
    }

    /// Run the loop to completion (or to the first deadline miss under the
    /// strict policy), flushing whatever remains buffered on the way out.
    pub async fn run(&self, registry: &ProbeRegistry, sink: &mut CsvSink) -> Result<MonitorSummary> {
        info!(
            "monitor running: {} ticks of {} ms, spilling every {} rows to {}",
            self.total_ticks,
            self.tick_ms,
            self.batch_size,
            sink.path().display()
        );
        let mut buffer: Vec<Sample> = Vec::with_capacity(self.batch_size);
        let mut summary = MonitorSummary {
            rows: 0,
            deadline_misses: 0,
        };
        for _ in 0..self.total_ticks {
            let tick_start = now_ms();
            buffer.push(registry.collect().await);
            summary.rows += 1;
            if buffer.len() % self.batch_size == self.batch_size - 1 {
                self.spill(sink, &mut buffer);
            }
            let elapsed = now_ms() - tick_start;
            if elapsed < self.tick_ms {
                debug!("read: time of {elapsed} ms");
                tokio::time::sleep(Duration::from_millis((self.tick_ms - elapsed) as u64)).await;
            } else {
                summary.deadline_misses += 1;
                warn!(
                    "sampling took {elapsed} ms, desired interval is {} ms",
                    self.tick_ms
                );
                if self.policy == DeadlinePolicy::Strict {
                    break;
                }
            }
        }
        if !buffer.is_empty() {
            self.spill(sink, &mut buffer);
        }
        Ok(summary)
    }

    /// Flush the buffer; on failure keep the rows and retry next time.
    fn spill(&self, sink: &mut CsvSink, buffer: &mut Vec<Sample>) {
        match sink.append(buffer) {
            Ok(()) => buffer.clear(),
            Err(err) => {
                error!(
                    "could not spill {} rows to {}: {err}",
                    buffer.len(),
                    sink.path().display()
                );
            }
        }
    }
}

//! Probe catalog, availability filtering, and per-tick sample composition.

use tracing::{debug, info, warn};

use crate::clock::now_ms;
use crate::config::HarnessConfig;
use crate::probe::Probe;
use crate::probe::file::{NetDevProbe, ThermalProbe};
use crate::probe::redis::{RedisDataProbe, RedisInfoProbe};
use crate::probe::shell::{IostatProbe, ShellKvProbe};
use crate::probe::system::SystemProbe;
use crate::sample::{Sample, TIMESTAMP_FIELD};

struct ActiveProbe {
    probe: Box<dyn Probe>,
    indicators: Vec<String>,
}

/// The set of probes that survived the startup availability check.
pub struct ProbeRegistry {
    probes: Vec<ActiveProbe>,
}

impl std::fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeRegistry")
            .field("active", &self.descriptions())
            .finish()
    }
}

impl ProbeRegistry {
    /// Build the full candidate catalog and keep what this host can serve.
    pub async fn discover(config: &HarnessConfig) -> Self {
        let mut candidates: Vec<Box<dyn Probe>> = vec![
            Box::new(SystemProbe::new()),
            Box::new(ShellKvProbe::meminfo()),
            Box::new(ShellKvProbe::vmstat()),
            Box::new(IostatProbe::new()),
            Box::new(ThermalProbe::new(config.thermal_path.clone())),
            Box::new(NetDevProbe::new()),
        ];
        match RedisDataProbe::connect(&config.redis_url).await {
            Ok(probe) => candidates.push(Box::new(probe)),
            Err(err) => warn!("redis data probe unavailable: {err}"),
        }
        match RedisInfoProbe::connect(&config.redis_url).await {
            Ok(probe) => candidates.push(Box::new(probe)),
            Err(err) => warn!("redis info probe unavailable: {err}"),
        }
        Self::from_candidates(candidates).await
    }

    /// Availability-check an explicit candidate list.
    ///
    /// One probing read per candidate; survivors keep the keys of that read
    /// as their declared indicator set for the rest of the run.
    pub async fn from_candidates(candidates: Vec<Box<dyn Probe>>) -> Self {
        let defined = candidates.len();
        let mut probes = Vec::with_capacity(defined);
        for probe in candidates {
            match probe.read().await {
                Some(sample) => {
                    let indicators: Vec<String> =
                        sample.keys().map(str::to_string).collect();
                    probes.push(ActiveProbe { probe, indicators });
                }
                None => {
                    warn!("probe {} is not available on this host", probe.describe());
                }
            }
        }
        info!("{} of {} probes are ready to be used", probes.len(), defined);
        Self { probes }
    }

    /// Compose one sample: `timestamp` plus the union of all probe reads.
    ///
    /// Never fails; a probe that cannot read this tick contributes nothing.
    pub async fn collect(&self) -> Sample {
        let mut row = Sample::new();
        row.insert(TIMESTAMP_FIELD, now_ms());
        for active in &self.probes {
            match active.probe.read().await {
                Some(data) => row.extend(data),
                None => debug!(
                    "probe {} read failed, dropped for this tick",
                    active.probe.describe()
                ),
            }
        }
        row
    }

    /// Fixed column set for the run: `timestamp` plus the union of the
    /// declared indicator lists, in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec![TIMESTAMP_FIELD.to_string()];
        for active in &self.probes {
            for indicator in &active.indicators {
                if !columns.contains(indicator) {
                    columns.push(indicator.clone());
                }
            }
        }
        columns
    }

    /// Per-probe description lines with indicator counts.
    pub fn descriptions(&self) -> Vec<String> {
        self.probes
            .iter()
            .map(|active| {
                format!("{} ({})", active.probe.describe(), active.indicators.len())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubProbe {
        tag: &'static str,
        failing: Arc<AtomicBool>,
    }

    impl StubProbe {
        fn new(tag: &'static str, available: bool) -> Self {
            Self {
                tag,
                failing: Arc::new(AtomicBool::new(!available)),
            }
        }

        fn failing_handle(&self) -> Arc<AtomicBool> {
            Arc::clone(&self.failing)
        }
    }

    #[async_trait]
    impl Probe for StubProbe {
        fn describe(&self) -> String {
            format!("Stub-{}", self.tag)
        }

        fn tag(&self) -> &str {
            self.tag
        }

        async fn read(&self) -> Option<Sample> {
            if self.failing.load(Ordering::Relaxed) {
                return None;
            }
            let mut sample = Sample::new();
            sample.insert(format!("{}.value", self.tag), 1i64);
            Some(sample)
        }
    }

    #[tokio::test]
    async fn unavailable_probes_are_dropped_at_startup() {
        let registry = ProbeRegistry::from_candidates(vec![
            Box::new(StubProbe::new("up", true)),
            Box::new(StubProbe::new("down", false)),
        ])
        .await;
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.descriptions(), vec!["Stub-up (1)"]);
    }

    #[tokio::test]
    async fn collect_merges_reads_under_a_timestamp() {
        let registry = ProbeRegistry::from_candidates(vec![
            Box::new(StubProbe::new("a", true)),
            Box::new(StubProbe::new("b", true)),
        ])
        .await;
        let row = registry.collect().await;
        assert!(row.timestamp().is_some());
        let keys: Vec<&str> = row.keys().collect();
        assert_eq!(keys, vec!["timestamp", "a.value", "b.value"]);
    }

    #[tokio::test]
    async fn transient_failure_drops_contribution_for_one_tick() {
        let flaky = StubProbe::new("flaky", true);
        let failing = flaky.failing_handle();
        let registry = ProbeRegistry::from_candidates(vec![
            Box::new(StubProbe::new("steady", true)),
            Box::new(flaky),
        ])
        .await;
        assert_eq!(registry.len(), 2);

        failing.store(true, Ordering::Relaxed);
        let row = registry.collect().await;
        assert!(row.get("steady.value").is_some());
        assert!(row.get("flaky.value").is_none());

        // The probe stays eligible and contributes again once it recovers.
        failing.store(false, Ordering::Relaxed);
        let row = registry.collect().await;
        assert!(row.get("flaky.value").is_some());

        // Columns stay declared even across failed reads.
        assert_eq!(
            registry.columns(),
            vec!["timestamp", "steady.value", "flaky.value"]
        );
    }
}

//! Randomized injection campaign.
//!
//! The campaign runs in its own OS process (a re-execution of the harness
//! binary) so the CPU, memory, and disk load of the injectors is accounted
//! to a different process than the monitor and therefore shows up in the
//! sampled indicators. The parent only starts the child, asks it to stop,
//! and harvests the injection log from disk after it exits.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::process::Child;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use crate::clock::now_ms;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::inject::spec::{build_injectors, default_injectors, load_spec};
use crate::inject::Injector;

/// One completed injection, as written to the injection log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionRecord {
    pub start: i64,
    pub end: i64,
    pub inj_name: String,
}

/// Scheduling parameters of one campaign.
#[derive(Debug, Clone, Copy)]
pub struct CampaignConfig {
    pub tick_ms: i64,
    pub total_ticks: u64,
    pub duration_ms: i64,
    pub error_rate: f64,
    pub cooldown_ms: i64,
}

impl From<&HarnessConfig> for CampaignConfig {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            tick_ms: config.tick_ms,
            total_ticks: config.total_ticks,
            duration_ms: config.duration_ms,
            error_rate: config.error_rate,
            cooldown_ms: config.cooldown_ms,
        }
    }
}

/// Write the injection log: header always, one row per completed interval.
pub fn write_injection_log(path: &Path, records: &[InjectionRecord]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "start,end,inj_name")?;
    for record in records {
        writeln!(out, "{},{},{}", record.start, record.end, record.inj_name)?;
    }
    out.flush()?;
    Ok(())
}

/// Read an injection log back; malformed rows are skipped with a warning.
pub fn read_injection_log(path: &Path) -> Result<Vec<InjectionRecord>> {
    let text = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in text.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.splitn(3, ',').collect();
        let parsed = match fields.as_slice() {
            [start, end, name] => start
                .trim()
                .parse::<i64>()
                .ok()
                .zip(end.trim().parse::<i64>().ok())
                .map(|(start, end)| InjectionRecord {
                    start,
                    end,
                    inj_name: name.trim().to_string(),
                }),
            _ => None,
        };
        match parsed {
            Some(record) => records.push(record),
            None => warn!("skipping malformed injection row: {line}"),
        }
    }
    Ok(records)
}

/// Owns the injector set and drives the campaign, either in-process (the
/// campaign child) or through a child process (the monitor side).
pub struct InjectionManager {
    injectors: Vec<Arc<dyn Injector>>,
    child: Option<Child>,
}

impl std::fmt::Debug for InjectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionManager")
            .field("injectors", &self.injector_names())
            .finish()
    }
}

impl InjectionManager {
    pub fn new(injectors: Vec<Arc<dyn Injector>>) -> Self {
        Self {
            injectors,
            child: None,
        }
    }

    /// The built-in injector set (Memory, CPU, Disk, Spin, RedisGet).
    pub fn with_defaults(config: &HarnessConfig) -> Self {
        Self::new(default_injectors(config))
    }

    /// Injectors from a declarative spec: inline JSON or a file path.
    pub fn from_spec(input: &str, config: &HarnessConfig) -> Result<Self> {
        let records = load_spec(input)?;
        Ok(Self::new(build_injectors(&records, config)))
    }

    /// Build from the harness configuration: the configured spec file when
    /// present, the built-in set otherwise.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        match &config.injector_spec {
            Some(path) => Self::from_spec(&path.to_string_lossy(), config),
            None => Ok(Self::with_defaults(config)),
        }
    }

    pub fn injector_names(&self) -> Vec<String> {
        self.injectors.iter().map(|injector| injector.name()).collect()
    }

    pub fn has_injectors(&self) -> bool {
        !self.injectors.is_empty()
    }

    /// Drive the campaign loop in this process and write the injection log
    /// on the way out. This is the body of the re-exec'd campaign child;
    /// SIGTERM force-stops the active injector and ends the loop early.
    pub async fn run_campaign(
        &self,
        config: &CampaignConfig,
        log_path: &Path,
    ) -> Result<()> {
        let mut terminate = signal(SignalKind::terminate())?;
        let mut rng = StdRng::from_os_rng();
        let mut active: Option<Arc<dyn Injector>> = None;
        let mut cooldown_left: i64 = 0;

        if self.injectors.is_empty() {
            warn!("no injectors were set for this campaign");
        } else {
            info!(
                "campaign running: {} ticks of {} ms, error rate {}",
                config.total_ticks, config.tick_ms, config.error_rate
            );
            let mut interrupted = false;
            for tick in 0..config.total_ticks {
                let tick_start = now_ms();
                let remaining_ms =
                    (config.total_ticks - tick - 1) as i64 * config.tick_ms;
                // No active injection, no cooldown, room before the end of
                // the campaign, and the probability gate fires.
                if active.is_none()
                    && cooldown_left == 0
                    && remaining_ms >= config.duration_ms
                    && rng.random::<f64>() < config.error_rate
                {
                    if let Some(choice) = self.pick_idle(&mut rng) {
                        info!("injecting with '{}'", choice.name());
                        choice.inject().await;
                        cooldown_left = config.duration_ms + config.cooldown_ms;
                        active = Some(choice);
                    }
                }
                let elapsed = now_ms() - tick_start;
                if elapsed < config.tick_ms {
                    let pause = Duration::from_millis((config.tick_ms - elapsed) as u64);
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = terminate.recv() => { interrupted = true; }
                    }
                }
                if interrupted {
                    warn!("campaign terminated early, stopping the active injector");
                    if let Some(injector) = &active {
                        injector.force_stop().await;
                    }
                    break;
                }
                cooldown_left = (cooldown_left - config.tick_ms).max(0);
                if cooldown_left <= config.cooldown_ms {
                    // The duration portion has elapsed; the slot frees up
                    // once the cooldown itself runs out.
                    active = None;
                }
            }
        }

        let records = self.collect_local();
        write_injection_log(log_path, &records)?;
        info!(
            "campaign wrote {} injection records to {}",
            records.len(),
            log_path.display()
        );
        Ok(())
    }

    /// Draw uniformly until an idle injector turns up, bounded so a full
    /// set of running injectors (impossible under mutual exclusion) cannot
    /// spin the loop forever.
    fn pick_idle(&self, rng: &mut StdRng) -> Option<Arc<dyn Injector>> {
        let bound = self.injectors.len() * 4;
        for _ in 0..bound {
            let index = rng.random_range(0..self.injectors.len());
            let injector = &self.injectors[index];
            if !injector.running() {
                return Some(Arc::clone(injector));
            }
        }
        warn!("no idle injector found after {bound} draws, skipping this tick");
        None
    }

    /// Merge the interval logs of all injectors, each tagged with its
    /// injector's name.
    pub fn collect_local(&self) -> Vec<InjectionRecord> {
        let mut records = Vec::new();
        for injector in &self.injectors {
            let intervals = injector.intervals();
            if !intervals.is_empty() {
                debug!(
                    "injections with '{}': {}",
                    injector.name(),
                    intervals.len()
                );
            }
            for interval in intervals {
                records.push(InjectionRecord {
                    start: interval.start,
                    end: interval.end,
                    inj_name: injector.name(),
                });
            }
        }
        records
    }

    /// Launch the campaign in a separate OS process.
    ///
    /// The child re-executes this binary's `campaign` subcommand with the
    /// scheduling knobs on the command line and writes the injection log at
    /// `log_path` before exiting.
    pub fn start(&mut self, config: &HarnessConfig, log_path: &Path) -> Result<()> {
        if self.child.is_some() {
            return Err(HarnessError::Campaign(
                "campaign already started".to_string(),
            ));
        }
        let exe = std::env::current_exe()?;
        let mut command = tokio::process::Command::new(exe);
        command
            .arg("campaign")
            .arg("--tick-ms")
            .arg(config.tick_ms.to_string())
            .arg("--total-ticks")
            .arg(config.total_ticks.to_string())
            .arg("--duration-ms")
            .arg(config.duration_ms.to_string())
            .arg("--error-rate")
            .arg(config.error_rate.to_string())
            .arg("--cooldown-ms")
            .arg(config.cooldown_ms.to_string())
            .arg("--redis-url")
            .arg(&config.redis_url)
            .arg("--out")
            .arg(log_path);
        if let Some(spec) = &config.injector_spec {
            command.arg("--spec").arg(spec);
        }
        if let Some(scratch) = &config.scratch_dir {
            command.arg("--scratch-dir").arg(scratch);
        }
        command.kill_on_drop(true);
        let child = command.spawn()?;
        info!(
            "injection campaign started in process {}",
            child.id().unwrap_or_default()
        );
        self.child = Some(child);
        Ok(())
    }

    /// True while the campaign child has not exited.
    pub fn running(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Ask the campaign child to stop (SIGTERM; the child force-stops its
    /// active injector and writes the log before exiting).
    pub fn force_close(&self) {
        if let Some(pid) = self.child.as_ref().and_then(|child| child.id()) {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
        }
    }

    /// Block until the campaign process is gone (force-closing as needed),
    /// then harvest the injection log from disk.
    pub async fn collect(&mut self, log_path: &Path) -> Result<Vec<InjectionRecord>> {
        while self.running() {
            warn!("injection campaign is still running, trying to force-close");
            self.force_close();
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.wait().await;
        }
        read_injection_log(log_path)
    }
}

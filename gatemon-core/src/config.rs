//! Harness configuration.
//!
//! Defaults, an optional TOML file, and `GATEMON_*` environment variables
//! are layered in that order. The result is a plain value passed into the
//! constructors that need it; there is no process-wide configuration state.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{HarnessError, Result};

/// Control surface of the harness.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Monitor cadence in milliseconds.
    pub tick_ms: i64,
    /// Number of ticks for both the monitor and the campaign, so the two
    /// finish together.
    pub total_ticks: u64,
    /// Rows buffered in memory before each sink append.
    pub batch_size: usize,
    /// Duration of one injection in milliseconds; overrides any per-record
    /// duration in the injector spec.
    pub duration_ms: i64,
    /// Probability per tick of initiating an injection when eligible.
    pub error_rate: f64,
    /// Minimum silence after a completed injection before another may be
    /// scheduled, in milliseconds.
    pub cooldown_ms: i64,
    /// Path to a declarative injector spec; absent means the built-in set.
    pub injector_spec: Option<PathBuf>,
    /// Connection URL of the auxiliary key-value store.
    pub redis_url: String,
    /// Thermal zone pseudo-file sampled by the thermal probe.
    pub thermal_path: PathBuf,
    /// Root for the disk stressor's per-activation scratch directories;
    /// absent means the system temp dir.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            total_ticks: 15,
            batch_size: 10,
            duration_ms: 1000,
            error_rate: 0.05,
            cooldown_ms: 1000,
            injector_spec: None,
            redis_url: "redis://127.0.0.1/".to_string(),
            thermal_path: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            scratch_dir: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from an optional TOML file and the environment.
    ///
    /// Without an explicit path, `gatemon.toml` in the working directory is
    /// used when present. `GATEMON_*` variables override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name("gatemon").required(false)),
        };
        builder = builder.add_source(Environment::with_prefix("GATEMON"));
        let config: HarnessConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.error_rate) {
            return Err(HarnessError::InvalidConfig(format!(
                "error_rate must be within [0, 1], got {}",
                self.error_rate
            )));
        }
        if self.tick_ms <= 0 {
            return Err(HarnessError::InvalidConfig(format!(
                "tick_ms must be positive, got {}",
                self.tick_ms
            )));
        }
        if self.duration_ms <= 0 {
            return Err(HarnessError::InvalidConfig(format!(
                "duration_ms must be positive, got {}",
                self.duration_ms
            )));
        }
        if self.cooldown_ms < 0 {
            return Err(HarnessError::InvalidConfig(format!(
                "cooldown_ms must not be negative, got {}",
                self.cooldown_ms
            )));
        }
        if self.batch_size == 0 {
            return Err(HarnessError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

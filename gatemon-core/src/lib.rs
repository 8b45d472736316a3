//! Core library for the Gatemon harness.
//!
//! Gatemon samples operating-system indicators (CPU, memory, disk, network,
//! thermal, and auxiliary redis state) into a timestamped CSV log while an
//! independently scheduled campaign injects synthetic faults against the
//! same host. The two streams share nothing but the wall clock; a merge
//! step joins them by timestamp into a labeled dataset.
//!
//! The three load-bearing subsystems:
//!
//! - [`probe`]: pluggable indicator sources plus the [`probe::ProbeRegistry`]
//!   that filters them by availability and composes one sample per tick;
//! - [`monitor`]: the fixed-cadence sampling loop feeding the [`sink`];
//! - [`inject`] and [`campaign`]: the fault primitives and the randomized
//!   campaign that schedules them in a separate OS process, so the
//!   injected load is visible to the monitor through the kernel.

pub mod campaign;
pub mod clock;
pub mod config;
pub mod error;
pub mod inject;
pub mod merge;
pub mod monitor;
pub mod probe;
pub mod sample;
pub mod sink;

pub use campaign::{CampaignConfig, InjectionManager, InjectionRecord};
pub use clock::now_ms;
pub use config::HarnessConfig;
pub use error::{HarnessError, Result};
pub use inject::{Injector, Interval};
pub use merge::{MergeOptions, merge_files};
pub use monitor::{DeadlinePolicy, MonitorLoop, MonitorSummary};
pub use probe::{Probe, ProbeRegistry};
pub use sample::{Sample, TIMESTAMP_FIELD, Value};
pub use sink::CsvSink;

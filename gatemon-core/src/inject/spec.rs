//! Declarative injector specs.
//!
//! A spec is a JSON array of records, each with a `type` token plus
//! optional parameters. The campaign's global duration always overrides
//! per-record durations, so one knob stretches every fault in a run.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::inject::Injector;
use crate::inject::cpu::CpuStressInjector;
use crate::inject::deadlock::{DEFAULT_N_LOCKS, DEFAULT_N_THREADS, DeadlockInjector};
use crate::inject::disk::{DEFAULT_N_BLOCKS, DEFAULT_N_WORKERS, DiskStressInjector};
use crate::inject::http::{DEFAULT_PARALLEL_READS, HttpReadInjector, default_sites};
use crate::inject::memory::{DEFAULT_ITEMS_FOR_LOOP, MemoryInjector};
use crate::inject::process::{DEFAULT_PROCESS_NAME, ProcessHangInjector};
use crate::inject::redis::{DEFAULT_GET_WORKERS, RedisGetInjector, RedisSetInjector};
use crate::inject::spin::SpinInjector;

/// One record of the declarative spec.
#[derive(Debug, Clone, Deserialize)]
pub struct InjectorRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub tag: String,
    /// Accepted for compatibility; the campaign's global duration wins.
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub items_for_loop: Option<u64>,
    #[serde(default)]
    pub n_workers: Option<usize>,
    #[serde(default)]
    pub n_blocks: Option<usize>,
    #[serde(default)]
    pub n_threads: Option<usize>,
    #[serde(default)]
    pub n_locks: Option<usize>,
    #[serde(default)]
    pub parallel_reads: Option<usize>,
    #[serde(default)]
    pub sites_urls: Option<Vec<String>>,
    #[serde(default)]
    pub sites_csv: Option<PathBuf>,
    #[serde(default)]
    pub process_name: Option<String>,
}

/// Parse a spec from inline JSON text or from a path to a JSON file.
pub fn load_spec(input: &str) -> Result<Vec<InjectorRecord>> {
    match serde_json::from_str(input) {
        Ok(records) => Ok(records),
        Err(parse_err) => {
            let path = std::path::Path::new(input.trim());
            if path.exists() {
                let text = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&text)?)
            } else {
                Err(HarnessError::InvalidSpec(format!(
                    "not valid JSON and not an existing file: {parse_err}"
                )))
            }
        }
    }
}

/// The built-in set used when no spec is configured.
pub fn default_injectors(config: &HarnessConfig) -> Vec<Arc<dyn Injector>> {
    let duration = config.duration_ms;
    vec![
        Arc::new(MemoryInjector::new("", duration, DEFAULT_ITEMS_FOR_LOOP)),
        Arc::new(CpuStressInjector::new("", duration)),
        Arc::new(DiskStressInjector::new(
            "",
            duration,
            DEFAULT_N_WORKERS,
            DEFAULT_N_BLOCKS,
            config.scratch_dir.clone(),
        )),
        Arc::new(SpinInjector::new("", duration)),
        Arc::new(RedisGetInjector::new(
            "",
            duration,
            DEFAULT_GET_WORKERS,
            config.redis_url.clone(),
        )),
    ]
}

/// Instantiate the recognized records; unknown types are skipped with a
/// warning.
pub fn build_injectors(
    records: &[InjectorRecord],
    config: &HarnessConfig,
) -> Vec<Arc<dyn Injector>> {
    let mut injectors: Vec<Arc<dyn Injector>> = Vec::with_capacity(records.len());
    for record in records {
        match build_one(record, config) {
            Some(injector) => {
                info!("loaded injector {}", injector.name());
                injectors.push(injector);
            }
            None => warn!("unknown injector type '{}', skipping", record.kind),
        }
    }
    injectors
}

fn build_one(record: &InjectorRecord, config: &HarnessConfig) -> Option<Arc<dyn Injector>> {
    let tag = record.tag.clone();
    let duration = config.duration_ms;
    let injector: Arc<dyn Injector> = match record.kind.as_str() {
        "Memory" | "RAM" | "MemoryUsage" | "Mem" | "MemoryStress" => Arc::new(
            MemoryInjector::new(
                tag,
                duration,
                record.items_for_loop.unwrap_or(DEFAULT_ITEMS_FOR_LOOP),
            ),
        ),
        "Disk" | "SSD" | "DiskMemoryUsage" | "DiskStress" => Arc::new(
            DiskStressInjector::new(
                tag,
                duration,
                record.n_workers.unwrap_or(DEFAULT_N_WORKERS),
                record.n_blocks.unwrap_or(DEFAULT_N_BLOCKS),
                config.scratch_dir.clone(),
            ),
        ),
        "CPU" | "Proc" | "CPUUsage" | "CPUStress" => {
            Arc::new(CpuStressInjector::new(tag, duration))
        }
        "Deadlock" | "Dl" | "Dead" => Arc::new(DeadlockInjector::new(
            tag,
            duration,
            record.n_threads.unwrap_or(DEFAULT_N_THREADS),
            record.n_locks.unwrap_or(DEFAULT_N_LOCKS),
        )),
        "HTTP" | "HTTPRead" | "NetRead" | "WebRead" | "SiteRead" => {
            Arc::new(HttpReadInjector::new(
                tag,
                duration,
                record.parallel_reads.unwrap_or(DEFAULT_PARALLEL_READS),
                resolve_sites(record),
            ))
        }
        "Redis" | "RedisGet" | "redis" | "redisget" | "Redis-Get" => {
            Arc::new(RedisGetInjector::new(
                tag,
                duration,
                record.n_workers.unwrap_or(DEFAULT_GET_WORKERS),
                config.redis_url.clone(),
            ))
        }
        "RedisMem" | "RedisSet" | "redismem" | "redisset" | "Redis-Set" | "Redis-Mem" => {
            Arc::new(RedisSetInjector::new(tag, duration, config.redis_url.clone()))
        }
        "StopProcess" | "Process" => Arc::new(ProcessHangInjector::new(
            tag,
            duration,
            record
                .process_name
                .clone()
                .unwrap_or_else(|| DEFAULT_PROCESS_NAME.to_string()),
        )),
        _ => return None,
    };
    Some(injector)
}

fn resolve_sites(record: &InjectorRecord) -> Vec<String> {
    if let Some(path) = &record.sites_csv {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let sites: Vec<String> = text
                    .split([',', '\n', '\r'])
                    .map(str::trim)
                    .filter(|site| !site.is_empty())
                    .map(str::to_string)
                    .collect();
                if !sites.is_empty() {
                    return sites;
                }
                warn!("site list {} is empty, falling back", path.display());
            }
            Err(err) => {
                warn!("could not read site list {}: {err}", path.display());
            }
        }
    }
    record.sites_urls.clone().unwrap_or_else(default_sites)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HarnessConfig {
        HarnessConfig {
            duration_ms: 750,
            ..HarnessConfig::default()
        }
    }

    #[test]
    fn inline_json_parses_into_records() {
        let records =
            load_spec(r#"[{"type": "CPUStress"}, {"type": "Mem", "items_for_loop": 10}]"#)
                .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, "CPUStress");
        assert_eq!(records[1].items_for_loop, Some(10));
    }

    #[test]
    fn file_paths_are_accepted_too() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("spec.json");
        std::fs::write(&path, r#"[{"type": "Deadlock", "n_threads": 4}]"#).unwrap();

        let records = load_spec(path.to_str().unwrap()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].n_threads, Some(4));
    }

    #[test]
    fn garbage_input_is_rejected() {
        assert!(load_spec("not json, not a file").is_err());
    }

    #[test]
    fn aliases_map_to_their_variants() {
        let records = load_spec(
            r#"[
                {"type": "RAM"},
                {"type": "SSD"},
                {"type": "Proc"},
                {"type": "Dl"},
                {"type": "WebRead"},
                {"type": "redisget"},
                {"type": "Redis-Mem"},
                {"type": "Process"}
            ]"#,
        )
        .unwrap();
        let injectors = build_injectors(&records, &test_config());
        let names: Vec<String> = injectors.iter().map(|injector| injector.name()).collect();
        assert_eq!(names.len(), 8);
        assert!(names[0].contains("MemoryUsageInjection"));
        assert!(names[1].contains("DiskStressInjection"));
        assert!(names[2].contains("CPUStressInjection"));
        assert!(names[3].contains("DeadlockInjection"));
        assert!(names[4].contains("HTTPReadInjection"));
        assert!(names[5].contains("RedisStressInjection"));
        assert!(names[6].contains("RedisMemoryInjection"));
        assert!(names[7].contains("StopProcessInjection"));
    }

    #[test]
    fn unknown_types_are_skipped() {
        let records = load_spec(
            r#"[{"type": "CPUStress"}, {"type": "Quantum"}, {"type": "Spin"}]"#,
        )
        .unwrap();
        let injectors = build_injectors(&records, &test_config());
        assert_eq!(injectors.len(), 1);
    }

    #[test]
    fn global_duration_overrides_per_record_duration() {
        let records =
            load_spec(r#"[{"type": "CPUStress", "duration_ms": 99999}]"#).unwrap();
        let injectors = build_injectors(&records, &test_config());
        assert_eq!(injectors[0].name(), "[]CPUStressInjection(d750)");
    }

    #[test]
    fn tags_flow_into_names() {
        let records = load_spec(r#"[{"type": "CPUStress", "tag": "burst"}]"#).unwrap();
        let injectors = build_injectors(&records, &test_config());
        assert_eq!(injectors[0].name(), "[burst]CPUStressInjection(d750)");
    }

    #[test]
    fn default_set_matches_the_builtin_catalog() {
        let injectors = default_injectors(&test_config());
        let names: Vec<String> = injectors.iter().map(|injector| injector.name()).collect();
        assert!(names[0].contains("MemoryUsageInjection"));
        assert!(names[1].contains("CPUStressInjection"));
        assert!(names[2].contains("DiskStressInjection"));
        assert!(names[3].contains("SpinInjection"));
        assert!(names[4].contains("RedisStressInjection"));
    }

    #[test]
    fn sites_csv_splits_on_commas_and_newlines() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("sites.csv");
        std::fs::write(&path, "example.org, example.com\nexample.net\n").unwrap();

        let record = InjectorRecord {
            kind: "HTTP".to_string(),
            tag: String::new(),
            duration_ms: None,
            items_for_loop: None,
            n_workers: None,
            n_blocks: None,
            n_threads: None,
            n_locks: None,
            parallel_reads: None,
            sites_urls: None,
            sites_csv: Some(path),
            process_name: None,
        };
        assert_eq!(
            resolve_sites(&record),
            vec!["example.org", "example.com", "example.net"]
        );
    }
}

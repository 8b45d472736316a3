//! Dataset labeling: join monitor rows with injection intervals.
//!
//! For every monitor row, the label is the `inj_name` of the unique
//! injection interval containing the row's timestamp (bounds inclusive),
//! or the literal `normal`. Intervals never overlap within a campaign, so
//! the label is unambiguous.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::campaign::{InjectionRecord, read_injection_log};
use crate::error::{HarnessError, Result};

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Preferred name of the timestamp column; `_timestamp`, `timestamp`,
    /// and `time` are tried as fallbacks, in that order.
    pub timestamp_tag: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            timestamp_tag: "timestamp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub rows: u64,
    pub injections: usize,
}

fn timestamp_index(header: &[&str], tag: &str) -> Option<usize> {
    [tag, "_timestamp", "timestamp", "time"]
        .iter()
        .find_map(|candidate| header.iter().position(|column| column == candidate))
}

fn label_for(injections: &[InjectionRecord], cursor: &mut usize, timestamp: i64) -> String {
    if injections.is_empty() {
        return "normal".to_string();
    }
    while *cursor < injections.len() - 1 && timestamp > injections[*cursor].end {
        *cursor += 1;
    }
    let current = &injections[*cursor];
    if current.start <= timestamp && timestamp <= current.end {
        current.inj_name.clone()
    } else {
        "normal".to_string()
    }
}

/// Produce the labeled copy of a monitor file.
pub fn merge_files(
    monitor_path: &Path,
    injections_path: &Path,
    output_path: &Path,
    options: &MergeOptions,
) -> Result<MergeSummary> {
    let mut injections = read_injection_log(injections_path)?;
    injections.sort_by_key(|record| record.start);
    info!("{} injections were retrieved", injections.len());

    let mut reader = BufReader::new(File::open(monitor_path)?).lines();
    let header_line = reader.next().transpose()?.ok_or_else(|| {
        HarnessError::MalformedData(format!("{} is empty", monitor_path.display()))
    })?;
    let header: Vec<&str> = header_line.split(',').collect();
    let timestamp_column =
        timestamp_index(&header, &options.timestamp_tag).ok_or_else(|| {
            HarnessError::MalformedData(format!(
                "no timestamp column in {}",
                monitor_path.display()
            ))
        })?;

    let mut out = BufWriter::new(File::create(output_path)?);
    writeln!(out, "{header_line},label")?;

    let mut summary = MergeSummary {
        rows: 0,
        injections: injections.len(),
    };
    let mut cursor = 0usize;
    for line in reader {
        let line = line?;
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() <= timestamp_column {
            continue;
        }
        let raw = fields[timestamp_column].trim();
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
            warn!("skipping row with non-numeric timestamp: {raw:?}");
            continue;
        }
        let Ok(timestamp) = raw.parse::<i64>() else {
            continue;
        };
        let label = label_for(&injections, &mut cursor, timestamp);
        writeln!(out, "{line},{label}")?;
        summary.rows += 1;
    }
    out.flush()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::write_injection_log;

    fn write_monitor(path: &Path, text: &str) {
        std::fs::write(path, text).unwrap();
    }

    fn run_merge(
        monitor: &str,
        injections: &[InjectionRecord],
    ) -> (Vec<String>, MergeSummary) {
        let dir = tempfile::tempdir().expect("tmpdir");
        let monitor_path = dir.path().join("monitor.csv");
        let injections_path = dir.path().join("injections.csv");
        let output_path = dir.path().join("labeled.csv");
        write_monitor(&monitor_path, monitor);
        write_injection_log(&injections_path, injections).unwrap();

        let summary = merge_files(
            &monitor_path,
            &injections_path,
            &output_path,
            &MergeOptions::default(),
        )
        .unwrap();
        let lines = std::fs::read_to_string(&output_path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        (lines, summary)
    }

    fn injection(start: i64, end: i64, name: &str) -> InjectionRecord {
        InjectionRecord {
            start,
            end,
            inj_name: name.to_string(),
        }
    }

    #[test]
    fn rows_outside_intervals_are_normal() {
        let (lines, summary) = run_merge(
            "timestamp,cpu\n1000,10\n2000,20\n",
            &[injection(5000, 6000, "[]SpinInjection(d1000)")],
        );
        assert_eq!(lines[0], "timestamp,cpu,label");
        assert_eq!(lines[1], "1000,10,normal");
        assert_eq!(lines[2], "2000,20,normal");
        assert_eq!(summary.rows, 2);
    }

    #[test]
    fn rows_inside_intervals_take_the_injector_name() {
        let (lines, _) = run_merge(
            "timestamp,cpu\n1000,10\n1500,99\n3000,20\n",
            &[injection(1200, 2000, "[]CPUStressInjection(d1000)")],
        );
        assert_eq!(lines[1], "1000,10,normal");
        assert_eq!(lines[2], "1500,99,[]CPUStressInjection(d1000)");
        assert_eq!(lines[3], "3000,20,normal");
    }

    #[test]
    fn interval_bounds_are_inclusive() {
        let (lines, _) = run_merge(
            "timestamp,cpu\n9000,1\n10000,2\n10001,3\n",
            &[injection(9000, 10000, "[]SpinInjection(d1000)")],
        );
        assert_eq!(lines[1], "9000,1,[]SpinInjection(d1000)");
        assert_eq!(lines[2], "10000,2,[]SpinInjection(d1000)");
        assert_eq!(lines[3], "10001,3,normal");
    }

    #[test]
    fn cursor_advances_across_sorted_intervals() {
        let (lines, _) = run_merge(
            "timestamp,cpu\n1000,1\n2500,2\n4500,3\n6000,4\n",
            &[
                injection(2000, 3000, "first"),
                injection(4000, 5000, "second"),
            ],
        );
        assert_eq!(lines[1], "1000,1,normal");
        assert_eq!(lines[2], "2500,2,first");
        assert_eq!(lines[3], "4500,3,second");
        assert_eq!(lines[4], "6000,4,normal");
    }

    #[test]
    fn unsorted_injection_files_are_sorted_before_labeling() {
        let (lines, _) = run_merge(
            "timestamp,cpu\n2500,1\n4500,2\n",
            &[
                injection(4000, 5000, "late"),
                injection(2000, 3000, "early"),
            ],
        );
        assert_eq!(lines[1], "2500,1,early");
        assert_eq!(lines[2], "4500,2,late");
    }

    #[test]
    fn empty_injection_log_labels_everything_normal() {
        let (lines, summary) = run_merge("timestamp,cpu\n1000,10\n", &[]);
        assert_eq!(lines[1], "1000,10,normal");
        assert_eq!(summary.injections, 0);
    }

    #[test]
    fn non_numeric_timestamps_are_dropped() {
        let (lines, summary) = run_merge(
            "timestamp,cpu\n1000,10\nnot-a-time,20\n2000,30\n",
            &[],
        );
        assert_eq!(lines.len(), 3);
        assert_eq!(summary.rows, 2);
    }

    #[test]
    fn alternative_timestamp_tags_are_tried_in_order() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let monitor_path = dir.path().join("monitor.csv");
        let injections_path = dir.path().join("injections.csv");
        let output_path = dir.path().join("labeled.csv");
        write_monitor(&monitor_path, "cpu,_timestamp\n10,1000\n");
        write_injection_log(&injections_path, &[]).unwrap();

        let summary = merge_files(
            &monitor_path,
            &injections_path,
            &output_path,
            &MergeOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.rows, 1);
    }

    #[test]
    fn missing_timestamp_column_is_an_error() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let monitor_path = dir.path().join("monitor.csv");
        let injections_path = dir.path().join("injections.csv");
        let output_path = dir.path().join("labeled.csv");
        write_monitor(&monitor_path, "cpu,mem\n10,20\n");
        write_injection_log(&injections_path, &[]).unwrap();

        let result = merge_files(
            &monitor_path,
            &injections_path,
            &output_path,
            &MergeOptions::default(),
        );
        assert!(result.is_err());
    }
}

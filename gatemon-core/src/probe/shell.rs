//! Shell-backed probes: key-value command output and the iostat table.

use async_trait::async_trait;
use tokio::process::Command;

use crate::probe::Probe;
use crate::sample::Sample;

async fn run_command(command: &str, args: &[String]) -> Option<String> {
    let output = Command::new(command).args(args).output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

/// How a key-value line is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvSeparator {
    /// Split on the first `:`, as in `MemTotal:        16334208 kB`.
    Colon,
    /// Split on the first whitespace run, as in `pgpgin 123456`.
    Whitespace,
}

/// Runs a command and parses its stdout as key-value lines.
///
/// Multi-token values keep only their first token, so `16334208 kB`
/// becomes `16334208`.
#[derive(Debug)]
pub struct ShellKvProbe {
    command: String,
    args: Vec<String>,
    tag: String,
    label: String,
    separator: KvSeparator,
}

impl ShellKvProbe {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        tag: impl Into<String>,
        label: impl Into<String>,
        separator: KvSeparator,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            tag: tag.into(),
            label: label.into(),
            separator,
        }
    }

    pub fn meminfo() -> Self {
        Self::new(
            "cat",
            vec!["/proc/meminfo".to_string()],
            "meminfo",
            "MemInfo",
            KvSeparator::Colon,
        )
    }

    pub fn vmstat() -> Self {
        Self::new(
            "cat",
            vec!["/proc/vmstat".to_string()],
            "vmstat",
            "VMStat",
            KvSeparator::Whitespace,
        )
    }
}

pub(crate) fn parse_kv(text: &str, separator: KvSeparator) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let (key, value) = match separator {
            KvSeparator::Colon => {
                let Some((key, value)) = line.split_once(':') else {
                    continue;
                };
                (key.trim(), value.trim())
            }
            KvSeparator::Whitespace => {
                let mut tokens = line.split_whitespace();
                let (Some(key), Some(value)) = (tokens.next(), tokens.next()) else {
                    continue;
                };
                (key, value)
            }
        };
        if key.is_empty() {
            continue;
        }
        // Keep only the first token of multi-token values.
        let value = value.split(' ').next().unwrap_or_default().trim();
        pairs.push((key.to_string(), value.to_string()));
    }
    pairs
}

#[async_trait]
impl Probe for ShellKvProbe {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    async fn read(&self) -> Option<Sample> {
        let text = run_command(&self.command, &self.args).await?;
        let mut sample = Sample::new();
        for (key, value) in parse_kv(&text, self.separator) {
            sample.insert(format!("{}.{key}", self.tag), value);
        }
        Some(sample)
    }
}

/// CPU-activity table from `iostat`.
///
/// Scans for the `avg-cpu` sentinel header, strips `%`, and zips the header
/// with the next non-empty line. A missing sentinel yields an empty sample,
/// which downstream code treats the same as a missing contribution.
#[derive(Debug)]
pub struct IostatProbe {
    command: String,
    tag: String,
}

impl IostatProbe {
    pub fn new() -> Self {
        Self {
            command: "iostat".to_string(),
            tag: "iostat".to_string(),
        }
    }
}

impl Default for IostatProbe {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn parse_avg_cpu(text: &str) -> Vec<(String, String)> {
    let mut header: Option<Vec<String>> = None;
    for line in text.lines() {
        if let Some(fields) = &header {
            if line.trim().is_empty() {
                continue;
            }
            let values = line.split_whitespace();
            return fields
                .iter()
                .cloned()
                .zip(values.map(str::to_string))
                .collect();
        }
        if line.starts_with("avg-cpu") {
            header = Some(
                line.replace('%', "")
                    .split_whitespace()
                    .skip(1)
                    .map(str::to_string)
                    .collect(),
            );
        }
    }
    Vec::new()
}

#[async_trait]
impl Probe for IostatProbe {
    fn describe(&self) -> String {
        "IOStat".to_string()
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    async fn read(&self) -> Option<Sample> {
        let text = run_command(&self.command, &[]).await?;
        let mut sample = Sample::new();
        for (key, value) in parse_avg_cpu(&text) {
            sample.insert(format!("{}.{key}", self.tag), value);
        }
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colon_lines_trim_and_keep_first_value_token() {
        let text = "MemTotal:       16334208 kB\nMemFree:         1076132 kB\n\nBogus line\n";
        let pairs = parse_kv(text, KvSeparator::Colon);
        assert_eq!(
            pairs,
            vec![
                ("MemTotal".to_string(), "16334208".to_string()),
                ("MemFree".to_string(), "1076132".to_string()),
            ]
        );
    }

    #[test]
    fn whitespace_lines_take_first_two_tokens() {
        let text = "nr_free_pages 269041\npgpgin 12345678\nsingleton\n";
        let pairs = parse_kv(text, KvSeparator::Whitespace);
        assert_eq!(
            pairs,
            vec![
                ("nr_free_pages".to_string(), "269041".to_string()),
                ("pgpgin".to_string(), "12345678".to_string()),
            ]
        );
    }

    #[test]
    fn avg_cpu_header_zips_with_next_value_row() {
        let text = "Linux 6.1.0 (gateway) \t07/30/26 \t_aarch64_\t(4 CPU)\n\
                    \n\
                    avg-cpu:  %user   %nice %system %iowait  %steal   %idle\n\
                    \x20          4.57    0.01    1.70    0.15    0.00   93.57\n\
                    \n\
                    Device             tps    kB_read/s\n";
        let pairs = parse_avg_cpu(text);
        assert_eq!(
            pairs,
            vec![
                ("user".to_string(), "4.57".to_string()),
                ("nice".to_string(), "0.01".to_string()),
                ("system".to_string(), "1.70".to_string()),
                ("iowait".to_string(), "0.15".to_string()),
                ("steal".to_string(), "0.00".to_string()),
                ("idle".to_string(), "93.57".to_string()),
            ]
        );
    }

    #[test]
    fn missing_sentinel_yields_empty_mapping() {
        let text = "Device             tps    kB_read/s\nsda               1.94        39.80\n";
        assert!(parse_avg_cpu(text).is_empty());
    }

    #[tokio::test]
    async fn failed_command_is_a_transient_failure() {
        let probe = ShellKvProbe::new(
            "cat",
            vec!["/definitely/not/a/real/file".to_string()],
            "ghost",
            "Ghost",
            KvSeparator::Colon,
        );
        assert!(probe.read().await.is_none());
    }
}

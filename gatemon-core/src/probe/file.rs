//! Pseudo-file probes: thermal zone scalar and the `/proc/net/dev` table.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::probe::Probe;
use crate::sample::Sample;

/// Single-integer pseudo-file, e.g. a thermal zone in millidegrees.
#[derive(Debug)]
pub struct ThermalProbe {
    path: PathBuf,
    tag: String,
}

impl ThermalProbe {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            tag: "temperature".to_string(),
        }
    }
}

#[async_trait]
impl Probe for ThermalProbe {
    fn describe(&self) -> String {
        "Temperature".to_string()
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    async fn read(&self) -> Option<Sample> {
        let text = tokio::fs::read_to_string(&self.path).await.ok()?;
        let value: i64 = text.trim().parse().ok()?;
        let mut sample = Sample::new();
        sample.insert(format!("{}.temperature", self.tag), value);
        Some(sample)
    }
}

/// Per-interface counters of each direction, in `/proc/net/dev` order.
const COUNTER_SCHEMA: [&str; 16] = [
    "rec.bytes",
    "rec.pkts",
    "rec.errs",
    "rec.drop",
    "rec.fifo",
    "rec.frame",
    "rec.compressed",
    "rec.multicast",
    "sent.bytes",
    "sent.pkts",
    "sent.errs",
    "sent.drop",
    "sent.fifo",
    "sent.frame",
    "sent.compressed",
    "sent.multicast",
];

/// Multi-row pseudo-file probe for `/proc/net/dev`.
///
/// Skips the two header lines; each remaining row maps its interface name
/// to the fixed 16-counter schema, keys shaped `eth0.rec.bytes`.
#[derive(Debug)]
pub struct NetDevProbe {
    path: PathBuf,
    tag: String,
}

impl NetDevProbe {
    pub fn new() -> Self {
        Self::with_path(PathBuf::from("/proc/net/dev"))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            tag: "netinfo".to_string(),
        }
    }
}

impl Default for NetDevProbe {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn parse_netdev(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in text.lines().skip(2) {
        if line.trim().is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < COUNTER_SCHEMA.len() + 1 {
            continue;
        }
        let interface = tokens[0].trim_end_matches(':');
        for (i, field) in COUNTER_SCHEMA.iter().enumerate() {
            pairs.push((format!("{interface}.{field}"), tokens[i + 1].to_string()));
        }
    }
    pairs
}

#[async_trait]
impl Probe for NetDevProbe {
    fn describe(&self) -> String {
        "NetDev".to_string()
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    async fn read(&self) -> Option<Sample> {
        let text = tokio::fs::read_to_string(&self.path).await.ok()?;
        let mut sample = Sample::new();
        for (key, value) in parse_netdev(&text) {
            sample.insert(key, value);
        }
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETDEV_FIXTURE: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  829318    8120    0    0    0     0          0         0   829318    8120    0    0    0     0       0          0
  eth0: 4783250   32180    1    2    0     0          0        17  1018470    9211    0    0    0     0       0          0
";

    #[test]
    fn netdev_rows_map_to_fixed_schema() {
        let pairs = parse_netdev(NETDEV_FIXTURE);
        assert_eq!(pairs.len(), 32);
        assert_eq!(pairs[0], ("lo.rec.bytes".to_string(), "829318".to_string()));
        assert_eq!(
            pairs[16],
            ("eth0.rec.bytes".to_string(), "4783250".to_string())
        );
        assert_eq!(
            pairs[23],
            ("eth0.rec.multicast".to_string(), "17".to_string())
        );
        assert_eq!(
            pairs[24],
            ("eth0.sent.bytes".to_string(), "1018470".to_string())
        );
    }

    #[test]
    fn short_rows_are_skipped() {
        let text = "h1\nh2\n  eth0: 1 2 3\n";
        assert!(parse_netdev(text).is_empty());
    }

    #[tokio::test]
    async fn thermal_probe_parses_an_integer() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("temp");
        std::fs::write(&path, "48750\n").unwrap();

        let probe = ThermalProbe::new(path);
        let sample = probe.read().await.unwrap();
        assert_eq!(
            sample.get("temperature.temperature"),
            Some(&crate::sample::Value::Int(48750))
        );
    }

    #[tokio::test]
    async fn unreadable_thermal_file_is_transient() {
        let probe = ThermalProbe::new(PathBuf::from("/no/such/zone"));
        assert!(probe.read().await.is_none());
    }

    #[tokio::test]
    async fn netdev_probe_reads_fixture_file() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("dev");
        std::fs::write(&path, NETDEV_FIXTURE).unwrap();

        let probe = NetDevProbe::with_path(path);
        let sample = probe.read().await.unwrap();
        assert_eq!(sample.len(), 32);
        assert!(sample.get("eth0.sent.pkts").is_some());
    }
}

//! Auxiliary key-value store probes.
//!
//! Both probes connect at construction; a failed connection drops the
//! probe from the registry for the whole run.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::Result;
use crate::probe::Probe;
use crate::sample::Sample;

async fn connect(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url)?;
    Ok(ConnectionManager::new(client).await?)
}

/// Reads the gateway's sensor keys (`T`, `H`, `P`).
#[derive(Clone)]
pub struct RedisDataProbe {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisDataProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisDataProbe").finish()
    }
}

impl RedisDataProbe {
    pub async fn connect(url: &str) -> Result<Self> {
        Ok(Self {
            conn: connect(url).await?,
        })
    }
}

#[async_trait]
impl Probe for RedisDataProbe {
    fn describe(&self) -> String {
        "RedisData".to_string()
    }

    fn tag(&self) -> &str {
        "redis"
    }

    async fn read(&self) -> Option<Sample> {
        let mut conn = self.conn.clone();
        let mut sample = Sample::new();
        for key in ["T", "H", "P"] {
            let value: Option<String> = conn.get(key).await.ok()?;
            // A missing key is an empty field, not a failed read.
            sample.insert(format!("redis.{key}"), value.unwrap_or_default());
        }
        Some(sample)
    }
}

/// Server-side store state from `INFO`, filtered to the allocation and
/// activity fields, plus the live key count.
#[derive(Clone)]
pub struct RedisInfoProbe {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisInfoProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisInfoProbe").finish()
    }
}

impl RedisInfoProbe {
    pub async fn connect(url: &str) -> Result<Self> {
        Ok(Self {
            conn: connect(url).await?,
        })
    }
}

pub(crate) fn parse_info_fields(info: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in info.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.starts_with("used_") || key.starts_with("active_") {
            pairs.push((format!("redis_{key}"), value.trim().to_string()));
        }
    }
    pairs
}

#[async_trait]
impl Probe for RedisInfoProbe {
    fn describe(&self) -> String {
        "RedisInfo".to_string()
    }

    fn tag(&self) -> &str {
        "redis"
    }

    async fn read(&self) -> Option<Sample> {
        let mut conn = self.conn.clone();
        let info: String = redis::cmd("INFO").query_async(&mut conn).await.ok()?;
        let mut sample = Sample::new();
        for (key, value) in parse_info_fields(&info) {
            sample.insert(key, value);
        }
        let keys: Vec<String> = conn.keys("*").await.ok()?;
        sample.insert("redis_active_keys", keys.len());
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_filter_keeps_used_and_active_fields() {
        let info = "\
# Memory\r\n\
used_memory:1014336\r\n\
used_memory_peak:1185792\r\n\
maxmemory:0\r\n\
active_defrag_running:0\r\n\
mem_fragmentation_ratio:4.78\r\n";
        let pairs = parse_info_fields(info);
        assert_eq!(
            pairs,
            vec![
                ("redis_used_memory".to_string(), "1014336".to_string()),
                ("redis_used_memory_peak".to_string(), "1185792".to_string()),
                (
                    "redis_active_defrag_running".to_string(),
                    "0".to_string()
                ),
            ]
        );
    }

    #[test]
    fn info_sections_and_blank_lines_are_ignored() {
        let info = "# Server\r\n\r\nredis_version:7.0.0\r\n";
        assert!(parse_info_fields(info).is_empty());
    }
}

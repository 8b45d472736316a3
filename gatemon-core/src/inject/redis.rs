//! Key-value store stressors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{error, warn};

use crate::clock::now_ms;
use crate::inject::{Injector, InjectorState, Interval};

pub const DEFAULT_GET_WORKERS: usize = 2;

/// Prefix of every key the SET stressor writes; cleanup deletes `PREFIX*`.
pub const STRESS_KEY_PREFIX: &str = "gatemon_stress_";

async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    let client = redis::Client::open(url)?;
    ConnectionManager::new(client).await
}

/// Read-side stress: `n_workers` tasks issuing tight GETs of the gateway's
/// sensor keys for the whole duration.
#[derive(Clone)]
pub struct RedisGetInjector {
    tag: String,
    duration_ms: i64,
    n_workers: usize,
    url: String,
    state: Arc<InjectorState>,
}

impl std::fmt::Debug for RedisGetInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisGetInjector").field("name", &self.name()).finish()
    }
}

impl RedisGetInjector {
    pub fn new(
        tag: impl Into<String>,
        duration_ms: i64,
        n_workers: usize,
        url: impl Into<String>,
    ) -> Self {
        Self {
            tag: tag.into(),
            duration_ms,
            n_workers,
            url: url.into(),
            state: Arc::new(InjectorState::new()),
        }
    }
}

#[async_trait]
impl Injector for RedisGetInjector {
    fn name(&self) -> String {
        format!(
            "[{}]RedisStressInjection-{}w-(d{})",
            self.tag, self.n_workers, self.duration_ms
        )
    }

    fn running(&self) -> bool {
        self.state.running()
    }

    async fn inject(&self) {
        let Some(cancel) = self.state.try_begin() else {
            return;
        };
        let conn = match connect(&self.url).await {
            Ok(conn) => conn,
            Err(err) => {
                error!("redis get stress could not connect: {err}");
                self.state.abort();
                return;
            }
        };
        let start = now_ms();
        let duration_ms = self.duration_ms;
        for _ in 0..self.n_workers {
            let mut conn = conn.clone();
            let worker_cancel = cancel.child_token();
            tokio::spawn(async move {
                loop {
                    if worker_cancel.is_cancelled() || now_ms() - start >= duration_ms {
                        break;
                    }
                    for key in ["T", "H", "P"] {
                        // Errors are part of the stress; keep hammering.
                        let _: redis::RedisResult<Option<String>> = conn.get(key).await;
                    }
                }
            });
        }
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(duration_ms.max(0) as u64)) => {}
                _ = cancel.cancelled() => {}
            }
            cancel.cancel();
            state.finish(start);
        });
    }

    async fn force_stop(&self) {
        self.state.force_stop().await;
    }

    fn intervals(&self) -> Vec<Interval> {
        self.state.intervals()
    }
}

/// Write-side stress: one task SETs an ever-growing key set under
/// [`STRESS_KEY_PREFIX`], then deletes the whole prefix on completion.
/// Cleanup is mandatory; the interval closes at the end of the SET phase.
#[derive(Clone)]
pub struct RedisSetInjector {
    tag: String,
    duration_ms: i64,
    url: String,
    state: Arc<InjectorState>,
}

impl std::fmt::Debug for RedisSetInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSetInjector").field("name", &self.name()).finish()
    }
}

impl RedisSetInjector {
    pub fn new(tag: impl Into<String>, duration_ms: i64, url: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            duration_ms,
            url: url.into(),
            state: Arc::new(InjectorState::new()),
        }
    }
}

async fn delete_prefix(conn: &mut ConnectionManager) {
    let pattern = format!("{STRESS_KEY_PREFIX}*");
    let keys: Vec<String> = match conn.keys(&pattern).await {
        Ok(keys) => keys,
        Err(err) => {
            warn!("redis set stress cleanup could not list {pattern}: {err}");
            return;
        }
    };
    if keys.is_empty() {
        return;
    }
    if let Err(err) = conn.del::<_, ()>(keys).await {
        warn!("redis set stress cleanup failed: {err}");
    }
}

#[async_trait]
impl Injector for RedisSetInjector {
    fn name(&self) -> String {
        format!("[{}]RedisMemoryInjection(d{})", self.tag, self.duration_ms)
    }

    fn running(&self) -> bool {
        self.state.running()
    }

    async fn inject(&self) {
        let Some(cancel) = self.state.try_begin() else {
            return;
        };
        let mut conn = match connect(&self.url).await {
            Ok(conn) => conn,
            Err(err) => {
                error!("redis set stress could not connect: {err}");
                self.state.abort();
                return;
            }
        };
        let state = Arc::clone(&self.state);
        let duration_ms = self.duration_ms;
        tokio::spawn(async move {
            let start = now_ms();
            let mut serial: u64 = 0;
            loop {
                if cancel.is_cancelled() || now_ms() - start >= duration_ms {
                    break;
                }
                let key = format!("{STRESS_KEY_PREFIX}{serial}");
                let _: redis::RedisResult<()> = conn.set(key, "x").await;
                serial += 1;
            }
            let end = now_ms();
            delete_prefix(&mut conn).await;
            state.finish_with_end(start, end);
        });
    }

    async fn force_stop(&self) {
        self.state.force_stop().await;
    }

    fn intervals(&self) -> Vec<Interval> {
        self.state.intervals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_encode_variant_and_parameters() {
        let get = RedisGetInjector::new("", 1000, 2, "redis://127.0.0.1/");
        assert_eq!(get.name(), "[]RedisStressInjection-2w-(d1000)");
        let set = RedisSetInjector::new("kv", 500, "redis://127.0.0.1/");
        assert_eq!(set.name(), "[kv]RedisMemoryInjection(d500)");
    }
}

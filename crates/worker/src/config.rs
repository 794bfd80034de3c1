// Worker configuration from environment variables

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use cadence_engine::{EngineConfig, HttpEndpoints, SchedulerConfig};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9400";

/// Connections kept beyond one per concurrent execution
const SPARE_CONNECTIONS: u32 = 4;

/// Configuration for the worker process
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub engine: EngineConfig,
    pub scheduler: SchedulerConfig,
    pub endpoints: HttpEndpoints,

    /// Browser origins allowed to call the API; empty disables CORS
    pub cors_origins: Vec<String>,
}

impl WorkerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key lookup (extracted for testing)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url =
            lookup("DATABASE_URL").context("DATABASE_URL environment variable required")?;

        let bind_addr = lookup("CADENCE_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("CADENCE_BIND_ADDR must be a socket address")?;

        let defaults = SchedulerConfig::default();
        let interval_secs = parse_or(
            &lookup,
            "CADENCE_RESUME_INTERVAL_SECS",
            defaults.interval.as_secs(),
        )?;
        let batch_size = parse_or(&lookup, "CADENCE_RESUME_BATCH_SIZE", defaults.batch_size)?;
        let shutdown_timeout_secs = parse_or(
            &lookup,
            "CADENCE_SHUTDOWN_TIMEOUT_SECS",
            defaults.shutdown_timeout.as_secs(),
        )?;
        let max_concurrent = parse_or(
            &lookup,
            "CADENCE_MAX_CONCURRENT_EXECUTIONS",
            EngineConfig::default().max_concurrent_executions,
        )?;

        // Empty values count as unset
        let endpoint = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url,
            bind_addr,
            engine: EngineConfig::new().with_max_concurrent_executions(max_concurrent),
            scheduler: SchedulerConfig::new()
                .with_interval(Duration::from_secs(interval_secs))
                .with_batch_size(batch_size)
                .with_shutdown_timeout(Duration::from_secs(shutdown_timeout_secs)),
            endpoints: HttpEndpoints {
                messaging: endpoint("CADENCE_MESSAGING_URL"),
                generation: endpoint("CADENCE_GENERATION_URL"),
                actor: endpoint("CADENCE_ACTOR_URL"),
                sync: endpoint("CADENCE_SYNC_URL"),
            },
            cors_origins: lookup("CADENCE_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

impl WorkerConfig {
    /// Database pool size: one connection per concurrent execution plus spares
    pub fn pool_size(&self) -> u32 {
        u32::try_from(self.engine.max_concurrent_executions)
            .unwrap_or(u32::MAX)
            .saturating_add(SPARE_CONNECTIONS)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, value)),
        None => Ok(default),
    }
}

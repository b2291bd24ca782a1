//! Environment-driven worker process configuration.

use std::time::Duration as StdDuration;

use anyhow::Context;
use chrono::Duration;
use tracing::warn;

/// Everything the worker process needs, read once at startup. Client handles
/// built from this are constructed explicitly and injected; there are no
/// process-wide singletons.
#[derive(Debug, Clone)]
pub struct WorkerProcessConfig {
    pub database_url: String,
    pub redis_url: String,
    /// Override for the queue list key; `None` uses the transport default.
    pub queue_key: Option<String>,

    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,

    /// Root directory of the local object store.
    pub storage_root: String,

    /// Concurrent worker tasks in this process.
    pub worker_count: usize,
    pub poll_timeout: StdDuration,
    pub handler_timeout: StdDuration,

    pub sweep_interval: StdDuration,
    pub sweep_pending_after: Duration,
    pub sweep_processing_after: Duration,
}

impl WorkerProcessConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL must be set")?;

        let llm_api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .unwrap_or_else(|_| {
                warn!("LLM_API_KEY not set; model calls will be rejected by the provider");
                String::new()
            });

        Ok(Self {
            database_url,
            redis_url,
            queue_key: std::env::var("JOB_QUEUE_KEY").ok(),
            llm_base_url: env_or("LLM_BASE_URL", "https://api.openai.com/v1"),
            llm_api_key,
            llm_model: env_or("LLM_MODEL", "gpt-4o-mini"),
            storage_root: env_or("STORAGE_ROOT", "./storage"),
            worker_count: env_parsed("WORKER_COUNT", 2)?,
            poll_timeout: StdDuration::from_secs(env_parsed("POLL_TIMEOUT_SECS", 5)?),
            handler_timeout: StdDuration::from_secs(env_parsed("HANDLER_TIMEOUT_SECS", 120)?),
            sweep_interval: StdDuration::from_secs(env_parsed("SWEEP_INTERVAL_SECS", 60)?),
            sweep_pending_after: Duration::seconds(env_parsed("SWEEP_PENDING_AFTER_SECS", 300)?),
            sweep_processing_after: Duration::seconds(env_parsed(
                "SWEEP_PROCESSING_AFTER_SECS",
                1_800,
            )?),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} is not a valid value: {raw}")),
        Err(_) => Ok(default),
    }
}

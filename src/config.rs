//! Layered configuration.
//!
//! Each value is looked up in order: command-line flag, `TASKLENS_*`
//! environment variable, `settings` table, built-in default.

use crate::error::{Result, TaskLensError};
use crate::query::HistoryPolicy;
use crate::queue::WorkerOptions;
use crate::settings::config_get;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_PREFIX: &str = "TASKLENS_";
pub const DB_ENV_VAR: &str = "TASKLENS_DB";

pub const DEFAULT_PROCESSING_TIMEOUT_SECS: u64 = 900;

/// Keys understood by the application
pub const KNOWN_KEYS: &[&str] = &[
    "llm.endpoint",
    "llm.api_key",
    "llm.model",
    "worker.concurrency",
    "worker.stalled_interval_ms",
    "worker.lock_duration_ms",
    "worker.max_stalled_count",
    "worker.poll_interval_ms",
    "analysis.processing_timeout_secs",
    "query.history_limit",
];

/// `llm.api_key` -> `TASKLENS_LLM_API_KEY`
pub fn env_var_for(key: &str) -> String {
    format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase().replace('.', "_"))
}

/// Environment first, then the settings table. Empty values count as unset.
pub async fn lookup(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    if let Ok(val) = std::env::var(env_var_for(key)) {
        if !val.trim().is_empty() {
            return Ok(Some(val));
        }
    }

    Ok(config_get(pool, key)
        .await?
        .filter(|v| !v.trim().is_empty()))
}

async fn lookup_parsed<T>(pool: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(pool, key).await? {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            TaskLensError::InvalidInput(format!("Invalid value '{}' for {}: {}", raw, key, e))
        }),
        None => Ok(None),
    }
}

/// Values given on the command line; `None` defers to the lower layers
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub concurrency: Option<usize>,
    pub processing_timeout_secs: Option<u64>,
    pub history_limit: Option<usize>,
}

/// Everything the background pipeline and the query path need
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub worker: WorkerOptions,
    /// Tasks stuck in PROCESSING longer than this are marked ERROR
    pub processing_timeout: Duration,
    pub history: HistoryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker: WorkerOptions::default(),
            processing_timeout: Duration::from_secs(DEFAULT_PROCESSING_TIMEOUT_SECS),
            history: HistoryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub async fn resolve(pool: &SqlitePool, overrides: &ConfigOverrides) -> Result<Self> {
        let defaults = Self::default();
        let mut worker = defaults.worker;

        if let Some(n) = overrides
            .concurrency
            .or(lookup_parsed(pool, "worker.concurrency").await?)
        {
            if n == 0 {
                return Err(TaskLensError::InvalidInput(
                    "worker.concurrency must be at least 1".to_string(),
                ));
            }
            worker.concurrency = n;
        }
        if let Some(ms) = lookup_parsed::<u64>(pool, "worker.stalled_interval_ms").await? {
            worker.stalled_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = lookup_parsed::<u64>(pool, "worker.lock_duration_ms").await? {
            worker.lock_duration = Duration::from_millis(ms.max(1));
        }
        if let Some(n) = lookup_parsed::<i64>(pool, "worker.max_stalled_count").await? {
            worker.max_stalled_count = n.max(0);
        }
        if let Some(ms) = lookup_parsed::<u64>(pool, "worker.poll_interval_ms").await? {
            worker.poll_interval = Duration::from_millis(ms.max(1));
        }

        let processing_timeout = match overrides.processing_timeout_secs.or(lookup_parsed(
            pool,
            "analysis.processing_timeout_secs",
        )
        .await?)
        {
            Some(secs) => Duration::from_secs(secs),
            None => defaults.processing_timeout,
        };

        let history = match overrides
            .history_limit
            .or(lookup_parsed(pool, "query.history_limit").await?)
        {
            Some(limit) => HistoryPolicy::from_limit(limit),
            None => defaults.history,
        };

        Ok(Self {
            worker,
            processing_timeout,
            history,
        })
    }
}

/// Database location: `--db`, then `TASKLENS_DB`, then
/// `<data dir>/tasklens/tasklens.db`
pub fn resolve_db_path(cli: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli {
        return Ok(path);
    }

    if let Ok(path) = std::env::var(DB_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    let data_dir = dirs::data_dir().ok_or_else(|| {
        TaskLensError::InvalidInput(format!(
            "Cannot determine a data directory; pass --db or set {}",
            DB_ENV_VAR
        ))
    })?;
    Ok(data_dir.join("tasklens").join("tasklens.db"))
}

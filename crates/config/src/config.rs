use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use query_structs::ModelKind;

/// Upper bound for task time limits and the purge interval.
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Minimum rows required before a training run fits a model
    pub min_training_samples: usize,

    /// Days of history read for training
    pub lookback_days: u32,

    /// Algorithm used when a training request does not name one
    pub model_type: ModelKind,

    /// Directory where trained model bundles are written
    pub model_dir: Option<PathBuf>,

    /// Number of jobs processed concurrently
    pub worker_concurrency: usize,

    /// Cooperative deadline checked between pipeline stages
    pub task_soft_time_limit: Duration,

    /// Deadline after which a job task is dropped
    pub task_time_limit: Duration,

    /// Jobs older than this are purged
    pub job_max_age_hours: u64,

    /// Interval between purge sweeps
    pub job_purge_interval: Duration,

    /// Maximum database connections
    pub db_pool_size: u32,

    /// Default tracing filter
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `DATABASE_URL`: `PostgreSQL` connection string
    ///
    /// Optional environment variables:
    /// - `MIN_TRAINING_SAMPLES` (default: `100`)
    /// - `LOOKBACK_DAYS` (default: `90`)
    /// - `MODEL_TYPE`: `linear`, `tree` or `forest` (default: `linear`)
    /// - `MODEL_DIR`: model bundle directory (default: unset, bundles are not written)
    /// - `WORKER_CONCURRENCY` (default: `2`)
    /// - `TASK_SOFT_TIME_LIMIT` in seconds (default: `540`)
    /// - `TASK_TIME_LIMIT` in seconds, at most one week (default: `600`)
    /// - `JOB_MAX_AGE_HOURS` (default: `24`)
    /// - `JOB_PURGE_INTERVAL_SECS`, at most one week (default: `3600`)
    /// - `DB_POOL_SIZE` (default: `10`)
    /// - `LOG_LEVEL` (default: `info`)
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or a
    /// value cannot be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing, a value cannot be
    /// parsed, or the limits are inconsistent.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .context("DATABASE_URL environment variable not set")?;

        let model_type = match lookup("MODEL_TYPE") {
            Some(raw) => raw
                .parse::<ModelKind>()
                .with_context(|| format!("Invalid MODEL_TYPE: {raw}"))?,
            None => ModelKind::default(),
        };

        let config = Self {
            database_url,
            min_training_samples: parse_or(&lookup, "MIN_TRAINING_SAMPLES", 100)?,
            lookback_days: parse_or(&lookup, "LOOKBACK_DAYS", 90)?,
            model_type,
            model_dir: lookup("MODEL_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            worker_concurrency: parse_or(&lookup, "WORKER_CONCURRENCY", 2)?,
            task_soft_time_limit: Duration::from_secs(parse_or(
                &lookup,
                "TASK_SOFT_TIME_LIMIT",
                540,
            )?),
            task_time_limit: Duration::from_secs(parse_or(&lookup, "TASK_TIME_LIMIT", 600)?),
            job_max_age_hours: parse_or(&lookup, "JOB_MAX_AGE_HOURS", 24)?,
            job_purge_interval: Duration::from_secs(parse_or(
                &lookup,
                "JOB_PURGE_INTERVAL_SECS",
                3600,
            )?),
            db_pool_size: parse_or(&lookup, "DB_POOL_SIZE", 10)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.worker_concurrency == 0 {
            bail!("WORKER_CONCURRENCY must be at least 1");
        }
        if self.db_pool_size == 0 {
            bail!("DB_POOL_SIZE must be at least 1");
        }
        if self.job_purge_interval.is_zero() {
            bail!("JOB_PURGE_INTERVAL_SECS must be at least 1");
        }
        for (key, value) in [
            ("TASK_TIME_LIMIT", self.task_time_limit),
            ("JOB_PURGE_INTERVAL_SECS", self.job_purge_interval),
        ] {
            if value > MAX_DURATION {
                bail!(
                    "{key} ({}s) exceeds the maximum of {}s",
                    value.as_secs(),
                    MAX_DURATION.as_secs()
                );
            }
        }
        if self.task_soft_time_limit > self.task_time_limit {
            bail!(
                "TASK_SOFT_TIME_LIMIT ({}s) exceeds TASK_TIME_LIMIT ({}s)",
                self.task_soft_time_limit.as_secs(),
                self.task_time_limit.as_secs()
            );
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key}: {raw}")),
        None => Ok(default),
    }
}

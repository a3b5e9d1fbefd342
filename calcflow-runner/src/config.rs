//! Runner configuration
//!
//! Defines all configurable parameters for the runner including
//! polling intervals, concurrency and the database location.

use std::time::Duration;

/// Runner configuration
///
/// Intervals are configurable to allow tuning for different deployments
/// (a local scheduler answers in milliseconds, a busy HPC queue in hours).
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite URL of the calcjob store (e.g., "sqlite://calcflow.db")
    pub database_url: String,

    /// Max calcjobs driven concurrently
    pub max_parallel_jobs: usize,

    /// How often `run_forever` looks for unfinished calcjobs
    pub poll_interval: Duration,

    /// How often a running remote job is asked for its state
    pub job_poll_interval: Duration,

    /// Maximum time to wait for a remote job to finish, unbounded if absent
    pub job_timeout: Option<Duration>,

    /// Maximum directory listings issued while walking a remote folder
    pub max_listing_calls: usize,

    /// Maximum calcjobs picked up per cycle, unbounded if absent
    pub batch_limit: Option<usize>,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(database_url: String) -> Self {
        Self {
            database_url,
            max_parallel_jobs: 4,
            poll_interval: Duration::from_secs(5),
            job_poll_interval: Duration::from_secs(1),
            job_timeout: None,
            max_listing_calls: 1000,
            batch_limit: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - CALCFLOW_DATABASE_URL (optional, default: sqlite://calcflow.db)
    /// - CALCFLOW_MAX_PARALLEL_JOBS (optional, default: 4)
    /// - CALCFLOW_POLL_INTERVAL (optional, seconds, default: 5)
    /// - CALCFLOW_JOB_POLL_INTERVAL (optional, seconds, default: 1)
    /// - CALCFLOW_JOB_TIMEOUT (optional, seconds, default: none)
    /// - CALCFLOW_MAX_LISTING_CALLS (optional, default: 1000)
    /// - CALCFLOW_BATCH_LIMIT (optional, default: none)
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("CALCFLOW_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://calcflow.db".to_string());

        let defaults = Self::new(database_url);

        let max_parallel_jobs = env_parse::<usize>("CALCFLOW_MAX_PARALLEL_JOBS")?
            .unwrap_or(defaults.max_parallel_jobs);

        let poll_interval = env_parse::<u64>("CALCFLOW_POLL_INTERVAL")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let job_poll_interval = env_parse::<u64>("CALCFLOW_JOB_POLL_INTERVAL")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.job_poll_interval);

        let job_timeout = env_parse::<u64>("CALCFLOW_JOB_TIMEOUT")?.map(Duration::from_secs);

        let max_listing_calls = env_parse::<usize>("CALCFLOW_MAX_LISTING_CALLS")?
            .unwrap_or(defaults.max_listing_calls);

        let batch_limit = env_parse::<usize>("CALCFLOW_BATCH_LIMIT")?;

        Ok(Self {
            max_parallel_jobs,
            poll_interval,
            job_poll_interval,
            job_timeout,
            max_listing_calls,
            batch_limit,
            ..defaults
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("database_url cannot be empty");
        }

        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.job_poll_interval.is_zero() {
            anyhow::bail!("job_poll_interval must be greater than 0");
        }

        if self.job_timeout.is_some_and(|t| t.is_zero()) {
            anyhow::bail!("job_timeout must be greater than 0 when set");
        }

        if self.max_listing_calls == 0 {
            anyhow::bail!("max_listing_calls must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("sqlite://calcflow.db".to_string())
    }
}

/// Parses an optional variable; a set but malformed value is an error
fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has invalid value {:?}: {}", name, raw, e)),
        Err(_) => Ok(None),
    }
}

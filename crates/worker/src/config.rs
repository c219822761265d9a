//! Per-binary configuration loaded from environment variables.
//!
//! Each worker process documents its variables in its binary's module
//! header; the shared ones are:
//!
//! | Variable         | Required | Default     |
//! |------------------|----------|-------------|
//! | `REDIS_URL`      | yes      | --          |
//! | `JOB_KEY_PREFIX` | no       | `bassline:` |
//! | `JOB_TTL_SECS`   | no       | `1800`      |
//! | `LOCK_TTL_SECS`  | no       | `600`       |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} has invalid value \"{value}\"")]
    Invalid { name: &'static str, value: String },
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn secs_or(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    parsed_or(name, default).map(Duration::from_secs)
}

/// Fetch-stage worker configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub redis_url: String,
    pub key_prefix: String,
    /// Queue this worker consumes.
    pub fetch_queue: String,
    /// Queue the next stage consumes.
    pub submit_queue: String,
    pub job_ttl: Duration,
    pub lock_ttl: Duration,
    /// Upper bound on one blocking pop; also the shutdown latency bound.
    pub dequeue_timeout: Duration,
    /// Directory for fetched input artifacts.
    pub output_dir: PathBuf,
}

impl FetchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            redis_url: required("REDIS_URL")?,
            key_prefix: var_or("JOB_KEY_PREFIX", "bassline:"),
            fetch_queue: var_or("FETCH_QUEUE", "fetch"),
            submit_queue: var_or("SUBMIT_QUEUE", "submit"),
            job_ttl: secs_or("JOB_TTL_SECS", 30 * 60)?,
            lock_ttl: secs_or("LOCK_TTL_SECS", 10 * 60)?,
            dequeue_timeout: secs_or("DEQUEUE_TIMEOUT_SECS", 3)?,
            output_dir: PathBuf::from(var_or("OUTPUT_DIR", "./data/input")),
        })
    }
}

/// Submit-stage worker configuration.
#[derive(Debug, Clone)]
pub struct SubmitConfig {
    pub redis_url: String,
    pub key_prefix: String,
    pub submit_queue: String,
    pub job_ttl: Duration,
    pub lock_ttl: Duration,
    pub dequeue_timeout: Duration,
    pub ml_base_url: String,
    /// Per-request timeout for the synchronous process call.
    pub ml_timeout: Duration,
}

impl SubmitConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            redis_url: required("REDIS_URL")?,
            key_prefix: var_or("JOB_KEY_PREFIX", "bassline:"),
            submit_queue: var_or("SUBMIT_QUEUE", "submit"),
            job_ttl: secs_or("JOB_TTL_SECS", 30 * 60)?,
            lock_ttl: secs_or("LOCK_TTL_SECS", 10 * 60)?,
            dequeue_timeout: secs_or("DEQUEUE_TIMEOUT_SECS", 3)?,
            ml_base_url: required("ML_BASE_URL")?,
            ml_timeout: secs_or("ML_TIMEOUT_SECS", 120)?,
        })
    }
}

/// Reconciliation worker configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub redis_url: String,
    pub key_prefix: String,
    /// How many submitted-set members one cycle examines at most.
    pub sample_size: usize,
    /// Sleep between cycles.
    pub poll_interval: Duration,
    /// A job left `Submitted` longer than this is failed with a timeout
    /// reason, measured from its `updated_at`.
    pub submitted_timeout: Duration,
    pub job_ttl: Duration,
    pub lock_ttl: Duration,
    /// Cap on concurrent status queries within one cycle.
    pub max_concurrent_checks: usize,
    pub ml_base_url: String,
    pub ml_timeout: Duration,
}

impl ReconcileConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            redis_url: required("REDIS_URL")?,
            key_prefix: var_or("JOB_KEY_PREFIX", "bassline:"),
            sample_size: parsed_or("SAMPLE_SIZE", 20)?,
            poll_interval: secs_or("POLL_INTERVAL_SECS", 2)?,
            submitted_timeout: secs_or("SUBMITTED_TIMEOUT_SECS", 30 * 60)?,
            job_ttl: secs_or("JOB_TTL_SECS", 30 * 60)?,
            lock_ttl: secs_or("LOCK_TTL_SECS", 600)?,
            max_concurrent_checks: parsed_or("MAX_CONCURRENT_STATUS_CHECKS", 10)?,
            ml_base_url: required("ML_BASE_URL")?,
            ml_timeout: secs_or("ML_TIMEOUT_SECS", 10)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use serde::Deserialize;
use std::time::Duration;

use crate::models::job::RetryPolicy;
use crate::services::processor::ReadinessPolicy;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for job queue, progress pub/sub, cache and rate limiting
    pub redis_url: String,

    /// Key namespace for queue structures
    #[serde(default = "default_queue_prefix")]
    pub queue_prefix: String,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Retry budget per job, including the first run
    #[serde(default = "default_job_max_attempts")]
    pub job_max_attempts: u32,

    /// Base of the doubling retry backoff
    #[serde(default = "default_job_backoff_base_ms")]
    pub job_backoff_base_ms: u64,

    /// Seconds a leased job stays invisible before it is redelivered
    #[serde(default = "default_lease_timeout_secs")]
    pub lease_timeout_secs: u64,

    /// Idle sleep between polls of an empty queue
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Re-queue delay for a competitor benchmark whose inputs are not ready
    #[serde(default = "default_dependency_retry_delay_ms")]
    pub dependency_retry_delay_ms: u64,

    /// Not-ready re-queues allowed before the benchmark fails
    #[serde(default = "default_max_dependency_deferrals")]
    pub max_dependency_deferrals: u32,

    #[serde(default = "default_rate_limit_scans_per_hour")]
    pub rate_limit_scans_per_hour: u64,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Nominatim place lookup endpoint
    #[serde(default = "default_nominatim_base_url")]
    pub nominatim_base_url: String,

    /// PageSpeed Insights API key. Without it, Core Web Vitals are skipped.
    #[serde(default)]
    pub pagespeed_api_key: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_queue_prefix() -> String {
    "grader".to_string()
}

fn default_worker_concurrency() -> usize {
    5
}

fn default_job_max_attempts() -> u32 {
    3
}

fn default_job_backoff_base_ms() -> u64 {
    2000
}

fn default_lease_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_dependency_retry_delay_ms() -> u64 {
    5000
}

fn default_max_dependency_deferrals() -> u32 {
    60
}

fn default_rate_limit_scans_per_hour() -> u64 {
    5
}

fn default_rate_limit_window_secs() -> u64 {
    3600
}

fn default_nominatim_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.job_max_attempts.max(1),
            base_delay_ms: self.job_backoff_base_ms,
        }
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            retry_delay: Duration::from_millis(self.dependency_retry_delay_ms),
            max_deferrals: self.max_dependency_deferrals,
        }
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// PageSpeed key, ignoring an empty value.
    pub fn pagespeed_key(&self) -> Option<String> {
        self.pagespeed_api_key.clone().filter(|k| !k.trim().is_empty())
    }
}

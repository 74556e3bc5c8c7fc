//! Client and cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// API client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL for the API.
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries for read requests on transient failure.
    #[serde(default = "default_query_retries")]
    pub query_retries: u32,

    /// Retries for write requests on transient failure.
    #[serde(default = "default_mutation_retries")]
    pub mutation_retries: u32,

    /// Fixed delay between retries in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_api_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_query_retries() -> u32 {
    2
}

fn default_mutation_retries() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            timeout_ms: default_timeout_ms(),
            query_retries: default_query_retries(),
            mutation_retries: default_mutation_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `FAMCOIN_API_URL` | API base URL |
    /// | `FAMCOIN_TIMEOUT_MS` | Request timeout in milliseconds |
    /// | `FAMCOIN_QUERY_RETRIES` | Retries for reads |
    /// | `FAMCOIN_MUTATION_RETRIES` | Retries for writes |
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("FAMCOIN_API_URL").unwrap_or_else(|_| default_api_url()),
            timeout_ms: env_parse("FAMCOIN_TIMEOUT_MS").unwrap_or_else(default_timeout_ms),
            query_retries: env_parse("FAMCOIN_QUERY_RETRIES").unwrap_or_else(default_query_retries),
            mutation_retries: env_parse("FAMCOIN_MUTATION_RETRIES")
                .unwrap_or_else(default_mutation_retries),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    /// Set the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set read and write retry counts.
    pub fn with_retries(mut self, query_retries: u32, mutation_retries: u32) -> Self {
        self.query_retries = query_retries;
        self.mutation_retries = mutation_retries;
        self
    }

    /// Set the delay between retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Floor for polling; zero or tiny intervals are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Query cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness window in milliseconds.
    #[serde(default = "default_stale_time_ms")]
    pub stale_time_ms: u64,

    /// Eviction window for unobserved entries in milliseconds.
    #[serde(default = "default_gc_time_ms")]
    pub gc_time_ms: u64,

    /// Polling interval for task and pending-redemption lists in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_stale_time_ms() -> u64 {
    5 * 60 * 1_000
}

fn default_gc_time_ms() -> u64 {
    30 * 60 * 1_000
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: default_stale_time_ms(),
            gc_time_ms: default_gc_time_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl CacheConfig {
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time_ms = stale_time.as_millis() as u64;
        self
    }

    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time_ms = gc_time.as_millis() as u64;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_millis(self.gc_time_ms)
    }

    /// Polling interval, never below [`MIN_POLL_INTERVAL`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(MIN_POLL_INTERVAL)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

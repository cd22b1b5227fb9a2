use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Tidepool
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub sinks: SinkConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Dispatch behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of work items in flight at once
    #[serde(rename = "max-concurrency")]
    pub max_concurrency: u32,

    /// Minimum spacing between two dispatches (milliseconds)
    #[serde(rename = "request-interval")]
    pub request_interval: u64,

    /// Whether repeated fingerprints are rejected at submission
    pub distinct: bool,

    /// Begin in the paused state
    #[serde(rename = "start-paused")]
    pub start_paused: bool,

    /// Dispatch loop resolution (milliseconds)
    pub tick: u64,

    /// Number of history entries kept; 0 keeps everything
    #[serde(rename = "history-limit")]
    pub history_limit: usize,
}

impl SchedulerConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 12,
            request_interval: 0,
            distinct: true,
            start_paused: false,
            tick: 50,
            history_limit: 1000,
        }
    }
}

/// Defaults applied to newly built work items
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Per-transfer timeout (milliseconds)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,

    /// Cool-down before a timed out item is dispatched again (milliseconds)
    #[serde(rename = "timeout-wait")]
    pub timeout_wait: u64,

    /// How many times a timed out item is retried before it is abandoned
    #[serde(rename = "timeout-retries")]
    pub timeout_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            request_timeout: 10_000,
            timeout_wait: 15_000,
            timeout_retries: 3,
        }
    }
}

/// Sink worker configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// What a sink worker does after a failed save
    #[serde(rename = "error-policy")]
    pub error_policy: SinkErrorPolicy,
}

/// Behavior of a sink worker after `save` fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkErrorPolicy {
    /// Log the failure and keep processing later artifacts
    #[default]
    Continue,
    /// Log the failure and stop the worker
    Stop,
}

/// Settings for the built-in HTTP fetcher
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Status codes answered with a generic retry instead of a fatal outcome
    #[serde(rename = "retry-statuses")]
    pub retry_statuses: Vec<u16>,

    /// Cool-down attached to status-driven retries (milliseconds)
    #[serde(rename = "retry-wait")]
    pub retry_wait: u64,

    /// TCP connect timeout (milliseconds)
    #[serde(rename = "connect-timeout")]
    pub connect_timeout: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("tidepool/{}", env!("CARGO_PKG_VERSION")),
            retry_statuses: vec![429, 503],
            retry_wait: 5_000,
            connect_timeout: 10_000,
        }
    }
}

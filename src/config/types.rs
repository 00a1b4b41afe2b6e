use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::device::LineConfig;

/// Root configuration container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Serial line settings applied at attach time.
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Retry and timing policy of the supervising loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Soft faults tolerated before the session gives up (default: 10).
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// Poll timeout in milliseconds once the first soft fault was seen (default: 100).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Wait of the final pump after detaching, in milliseconds (default: 1000).
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

/// Diagnostic output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter when neither `RUST_LOG` nor `--log-level` is set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Verbosity of the USB device driver.
    #[serde(default = "default_device_level")]
    pub device_level: String,
}

fn default_retry_budget() -> u32 {
    10
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_drain_timeout_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_device_level() -> String {
    "warn".to_string()
}

impl SessionConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            backoff_ms: default_backoff_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            device_level: default_device_level(),
        }
    }
}

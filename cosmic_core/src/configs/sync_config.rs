use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::backoff::BackoffPolicy;
use crate::core::connection::ConnectionConfig;
use crate::core::processor::ProcessorConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Options recognized by the synchronization core. All are optional in the
/// source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ratio: f64,
    pub batch_window_ms: u64,
    pub stale_timeout_ms: u64,
    pub ring_buffer_size: usize,
    pub latency_smoothing_factor: f64,
    /// Interval of periodic full-update requests while connected; 0 disables.
    pub refresh_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ratio: 0.2,
            batch_window_ms: 100,
            stale_timeout_ms: 60_000,
            ring_buffer_size: 100,
            latency_smoothing_factor: 0.2,
            refresh_interval_ms: 0,
        }
    }
}

impl SyncConfig {
    /// Parses a JSON5 document and validates it.
    pub fn from_json5_str(text: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig =
            json5::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON5 file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json5_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.into(),
            })
        }

        if self.base_delay_ms == 0 {
            return invalid("baseDelayMs", "must be greater than 0");
        }
        if self.max_delay_ms < self.base_delay_ms {
            return invalid(
                "maxDelayMs",
                format!("{} is below baseDelayMs {}", self.max_delay_ms, self.base_delay_ms),
            );
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return invalid("jitterRatio", format!("{} is outside [0, 1]", self.jitter_ratio));
        }
        if !(self.latency_smoothing_factor > 0.0 && self.latency_smoothing_factor <= 1.0) {
            return invalid(
                "latencySmoothingFactor",
                format!("{} is outside (0, 1]", self.latency_smoothing_factor),
            );
        }
        if self.batch_window_ms == 0 {
            return invalid("batchWindowMs", "must be greater than 0");
        }
        if self.stale_timeout_ms == 0 {
            return invalid("staleTimeoutMs", "must be greater than 0");
        }
        if self.ring_buffer_size == 0 {
            return invalid("ringBufferSize", "must be greater than 0");
        }
        Ok(())
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter_ratio: self.jitter_ratio,
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            backoff: self.backoff_policy(),
            latency_smoothing: self.latency_smoothing_factor,
        }
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            batch_window: Duration::from_millis(self.batch_window_ms),
            stale_timeout: Duration::from_millis(self.stale_timeout_ms),
        }
    }

    /// `None` when periodic refresh is off.
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_ms > 0).then(|| Duration::from_millis(self.refresh_interval_ms))
    }
}

impl fmt::Display for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyncConfig
    Backoff: {}ms..{}ms (jitter {}),
    Batch window: {}ms,
    Stale timeout: {}ms,
    Ring buffer: {},
    Latency smoothing: {},
    Refresh interval: {}ms",
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_ratio,
            self.batch_window_ms,
            self.stale_timeout_ms,
            self.ring_buffer_size,
            self.latency_smoothing_factor,
            self.refresh_interval_ms
        )
    }
}

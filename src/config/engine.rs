//! Reconstruction engine and reporting configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-connection buffer capacity in bytes
fn default_buffer_capacity() -> usize {
    4096
}

/// Default session retention in seconds
fn default_retention_secs() -> u64 {
    300
}

/// Default reaper period in seconds
fn default_reap_interval_secs() -> u64 {
    30
}

/// Default global report cooldown in seconds
fn default_report_cooldown_secs() -> u64 {
    60
}

/// Reconstruction engine configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Per-connection buffer capacity in bytes
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Sessions older than this many seconds are reaped
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Seconds between reaper sweeps
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// Minimum seconds between two audit reports, across all sessions
    #[serde(default = "default_report_cooldown_secs")]
    pub report_cooldown_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            buffer_capacity: default_buffer_capacity(),
            retention_secs: default_retention_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            report_cooldown_secs: default_report_cooldown_secs(),
        }
    }
}

impl EngineConfig {
    /// Session retention window
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Reaper period
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    /// Report cooldown window
    pub fn report_cooldown(&self) -> Duration {
        Duration::from_secs(self.report_cooldown_secs)
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_capacity == 0 {
            return Err("engine.buffer_capacity must be greater than 0".to_string());
        }
        if self.retention_secs == 0 {
            return Err("engine.retention_secs must be greater than 0".to_string());
        }
        if self.reap_interval_secs == 0 {
            return Err("engine.reap_interval_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Output format of audit reports
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// One `tracing` event per report, rendered by the log subscriber
    #[default]
    #[serde(rename = "text")]
    Text,
    /// One JSON object per line on stdout
    #[serde(rename = "json")]
    Json,
}

/// Audit report configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ReportConfig {
    /// Output format
    #[serde(default)]
    pub format: ReportFormat,

    /// Replace passwords with a SHA-256 fingerprint
    #[serde(default)]
    pub redact_passwords: bool,
}

//! Monitor configuration types
//!
//! Defines the root configuration structure for the sockswatch monitor.

use super::{CaptureConfig, EngineConfig, ReportConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default status report interval in seconds
fn default_status_interval() -> u64 {
    30
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Frame capture configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Reconstruction engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Audit report configuration
    #[serde(default)]
    pub report: ReportConfig,

    /// Status reporter configuration
    #[serde(default)]
    pub status: StatusConfig,
}

impl Config {
    /// Validate every section
    pub fn validate(&self) -> Result<(), String> {
        self.capture.validate()?;
        self.engine.validate()?;
        self.status.validate()?;
        Ok(())
    }
}

/// Periodic status reporter configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusConfig {
    /// Seconds between status log lines
    #[serde(default = "default_status_interval")]
    pub interval_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        StatusConfig {
            interval_secs: default_status_interval(),
        }
    }
}

impl StatusConfig {
    /// Status report period
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate the status configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("status.interval_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

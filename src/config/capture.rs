//! Capture configuration types
//!
//! Defines where frames are read from and which ports are treated as
//! candidate SOCKS5 proxies.

use crate::capture::{PortSet, DEFAULT_CACHE_CAPACITY, DEFAULT_PROXY_PORTS};
use serde::{Deserialize, Serialize};

/// Default candidate proxy ports
fn default_ports() -> Vec<u16> {
    DEFAULT_PROXY_PORTS.to_vec()
}

/// Default auth event channel capacity
fn default_event_capacity() -> usize {
    256
}

/// Default fragment channel capacity
fn default_fragment_capacity() -> usize {
    1024
}

/// Default capture-side cache capacity
fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

/// Capture configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptureConfig {
    /// Interface to bind the raw socket to (all interfaces when absent)
    #[serde(default)]
    pub interface: Option<String>,

    /// Candidate proxy ports
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,

    /// Process id stamped into auth events
    #[serde(default)]
    pub pid: u32,

    /// Auth event channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Fragment channel capacity
    #[serde(default = "default_fragment_capacity")]
    pub fragment_capacity: usize,

    /// Capture-side session cache capacity
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interface: None,
            ports: default_ports(),
            pid: 0,
            event_capacity: default_event_capacity(),
            fragment_capacity: default_fragment_capacity(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl CaptureConfig {
    /// Build the classifier port set
    pub fn port_set(&self) -> PortSet {
        PortSet::new(self.ports.iter().copied())
    }

    /// Validate the capture configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.ports.is_empty() {
            return Err("capture.ports must list at least one port".to_string());
        }
        if self.ports.contains(&0) {
            return Err("capture.ports cannot contain port 0".to_string());
        }
        if self.event_capacity == 0 {
            return Err("capture.event_capacity must be greater than 0".to_string());
        }
        if self.fragment_capacity == 0 {
            return Err("capture.fragment_capacity must be greater than 0".to_string());
        }
        if self.cache_capacity == 0 {
            return Err("capture.cache_capacity must be greater than 0".to_string());
        }
        Ok(())
    }
}

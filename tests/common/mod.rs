//! Test utilities for Sockswatch
//!
//! This module provides frame builders, SOCKS5 message builders and an
//! engine harness used across integration tests.

#![allow(dead_code)]

use sockswatch::capture::{event_channel, lossy_channel, Capture, EventReceiver};
use sockswatch::clock::ManualClock;
use sockswatch::config::{Config, EngineConfig, ReportConfig};
use sockswatch::engine::{Engine, MemorySink};
use sockswatch::flow::{ConnectionKey, Fragment};
use sockswatch::stats::MonitorStats;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Client address used by the builders
pub const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

/// Proxy address used by the builders
pub const PROXY_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

/// Connection key for a client port talking to a proxy port
pub fn connection(client_port: u16, proxy_port: u16) -> ConnectionKey {
    ConnectionKey::new(CLIENT_IP, client_port, PROXY_IP, proxy_port)
}

/// Build an Ethernet/IPv4/TCP frame carrying `payload`
pub fn tcp_frame(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut frame = vec![0u8; 12];
    frame.extend_from_slice(&0x0800u16.to_be_bytes());

    let total_len = (20 + 20 + payload.len()) as u16;
    frame.extend_from_slice(&[0x45, 0x00]);
    frame.extend_from_slice(&total_len.to_be_bytes());
    frame.extend_from_slice(&[0x12, 0x34, 0x40, 0x00, 64, 6, 0, 0]);
    frame.extend_from_slice(&src.octets());
    frame.extend_from_slice(&dst.octets());

    frame.extend_from_slice(&src_port.to_be_bytes());
    frame.extend_from_slice(&dst_port.to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0]);
    frame.extend_from_slice(&[0x50, 0x18, 0xff, 0xff, 0, 0, 0, 0]);
    frame.extend_from_slice(payload);
    frame
}

/// Frame sent by the client of `key` to its proxy
pub fn client_frame(key: &ConnectionKey, payload: &[u8]) -> Vec<u8> {
    tcp_frame(key.src, key.src_port, key.dst, key.dst_port, payload)
}

/// Frame sent by the proxy of `key` back to its client
pub fn proxy_frame(key: &ConnectionKey, payload: &[u8]) -> Vec<u8> {
    tcp_frame(key.dst, key.dst_port, key.src, key.src_port, payload)
}

/// SOCKS5 message builders
pub mod socks5_mock {
    use sockswatch::socks::*;

    /// Method offer listing only username/password
    pub fn method_offer_password() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_PASSWORD]
    }

    /// Proxy choosing username/password
    pub fn method_selection_password() -> Vec<u8> {
        vec![SOCKS5_VERSION, SOCKS5_AUTH_METHOD_PASSWORD]
    }

    /// Username/password sub-negotiation request
    pub fn auth_request(username: &str, password: &str) -> Vec<u8> {
        let mut req = vec![SOCKS5_AUTH_VERSION, username.len() as u8];
        req.extend_from_slice(username.as_bytes());
        req.push(password.len() as u8);
        req.extend_from_slice(password.as_bytes());
        req
    }

    /// CONNECT request to an IPv4 address
    pub fn connect_ipv4(ip: [u8; 4], port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
        ];
        cmd.extend_from_slice(&ip);
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }

    /// CONNECT request to a domain
    pub fn connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }

    /// CONNECT reply with an IPv4 bind address
    pub fn connect_reply(code: u8) -> Vec<u8> {
        vec![
            SOCKS5_VERSION,
            code,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
            0,
            0,
            0,
            0,
            0,
            0,
        ]
    }
}

/// Test configuration builder
pub struct TestConfigBuilder {
    config: Config,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            config: Config::default(),
        }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set candidate proxy ports
    pub fn ports(mut self, ports: &[u16]) -> Self {
        self.config.capture.ports = ports.to_vec();
        self
    }

    /// Set the report cooldown
    pub fn cooldown_secs(mut self, secs: u64) -> Self {
        self.config.engine.report_cooldown_secs = secs;
        self
    }

    /// Set the per-connection buffer capacity
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.engine.buffer_capacity = capacity;
        self
    }

    /// Set the fragment channel capacity
    pub fn fragment_capacity(mut self, capacity: usize) -> Self {
        self.config.capture.fragment_capacity = capacity;
        self
    }

    /// Enable password redaction
    pub fn redact(mut self, redact: bool) -> Self {
        self.config.report.redact_passwords = redact;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}

/// Engine wired to a manual clock and an in-memory sink
pub struct Harness {
    pub engine: Arc<Engine>,
    pub clock: ManualClock,
    pub sink: MemorySink,
    pub stats: Arc<MonitorStats>,
}

impl Harness {
    /// Build a harness from engine and report settings
    pub fn new(engine: &EngineConfig, report: &ReportConfig) -> Self {
        let clock = ManualClock::new();
        let sink = MemorySink::new();
        let stats = Arc::new(MonitorStats::new());
        let engine = Arc::new(Engine::new(
            engine,
            report,
            Arc::new(sink.clone()),
            Arc::new(clock.clone()),
            stats.clone(),
        ));
        Harness {
            engine,
            clock,
            sink,
            stats,
        }
    }

    /// Build a harness from a full configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.engine, &config.report)
    }

    /// Feed a client→proxy payload
    pub fn client(&self, key: ConnectionKey, payload: impl Into<Vec<u8>>) {
        self.engine
            .ingest_fragment(&Fragment::to_proxy(key, payload.into()));
    }

    /// Feed a proxy→client payload
    pub fn proxy(&self, key: ConnectionKey, payload: impl Into<Vec<u8>>) {
        self.engine
            .ingest_fragment(&Fragment::from_proxy(key, payload.into()));
    }
}

/// Capture processor with the receiving ends of its channels
pub struct CaptureRig {
    pub capture: Capture,
    pub events: EventReceiver,
    pub fragments: mpsc::Receiver<Fragment>,
    pub stats: Arc<MonitorStats>,
}

impl CaptureRig {
    /// Build a capture processor for `config`
    pub fn new(config: &Config) -> Self {
        let stats = Arc::new(MonitorStats::new());
        let (event_tx, events) = event_channel(config.capture.event_capacity);
        let (fragment_tx, fragments) = lossy_channel(config.capture.fragment_capacity);
        let capture = Capture::new(&config.capture, event_tx, fragment_tx, stats.clone());
        CaptureRig {
            capture,
            events,
            fragments,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = TestConfigBuilder::new()
            .ports(&[3128])
            .cooldown_secs(0)
            .buffer_capacity(64)
            .redact(true)
            .build();

        assert_eq!(config.capture.ports, vec![3128]);
        assert_eq!(config.engine.report_cooldown_secs, 0);
        assert_eq!(config.engine.buffer_capacity, 64);
        assert!(config.report.redact_passwords);
    }

    #[test]
    fn test_auth_request_layout() {
        let req = socks5_mock::auth_request("bob", "xyz");
        assert_eq!(req, b"\x01\x03bob\x03xyz");
    }

    #[test]
    fn test_tcp_frame_length() {
        let frame = tcp_frame(CLIENT_IP, 40000, PROXY_IP, 1080, b"abc");
        assert_eq!(frame.len(), 14 + 20 + 20 + 3);
    }
}

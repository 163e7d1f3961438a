//! SOCKS5 type definitions
//!
//! Defines the values recovered from an observed SOCKS5 exchange.

use super::consts::*;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Target address of a SOCKS5 CONNECT request
///
/// IPv6 targets are recorded as present with their port, but the address
/// itself is not rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// IPv4 literal with port
    Ipv4(SocketAddrV4),
    /// Domain name with port
    Domain(String, u16),
    /// IPv6 literal (address not decoded) with port
    Ipv6(u16),
}

impl TargetAddr {
    /// Create a new TargetAddr from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ipv4(SocketAddrV4::new(ip, port))
    }

    /// Create a new TargetAddr from a domain name and port
    pub fn domain(domain: impl Into<String>, port: u16) -> Self {
        TargetAddr::Domain(domain.into(), port)
    }

    /// Get the host part as text
    pub fn host(&self) -> String {
        match self {
            TargetAddr::Ipv4(addr) => addr.ip().to_string(),
            TargetAddr::Domain(domain, _) => domain.clone(),
            TargetAddr::Ipv6(_) => "<ipv6>".to_string(),
        }
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ipv4(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
            TargetAddr::Ipv6(port) => *port,
        }
    }

    /// Get the address type byte for SOCKS5 protocol
    pub fn addr_type(&self) -> u8 {
        match self {
            TargetAddr::Ipv4(_) => SOCKS5_ADDR_TYPE_IPV4,
            TargetAddr::Domain(_, _) => SOCKS5_ADDR_TYPE_DOMAIN,
            TargetAddr::Ipv6(_) => SOCKS5_ADDR_TYPE_IPV6,
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ipv4(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
            TargetAddr::Ipv6(port) => write!(f, "[ipv6]:{}", port),
        }
    }
}

impl Serialize for TargetAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A username/password pair recovered from an RFC 1929 sub-negotiation
///
/// Both halves are held in one value so a half-extracted pair can never be
/// stored on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username, lossily decoded
    pub username: String,
    /// Password, lossily decoded
    pub password: String,
}

impl Credentials {
    /// Build credentials from raw captured bytes
    ///
    /// Returns `None` if either half is empty.
    pub fn from_bytes(username: &[u8], password: &[u8]) -> Option<Self> {
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Credentials {
            username: String::from_utf8_lossy(username).into_owned(),
            password: String::from_utf8_lossy(password).into_owned(),
        })
    }
}

//! Connection identity shared by the capture and reconstruction layers
//!
//! Both layers key a SOCKS5 session by the full client→proxy 4-tuple. The
//! capture side additionally derives a compact `u64` key that leaves out the
//! destination address; see [`ConnectionKey::capture_key`].

use bytes::Bytes;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Direction of a captured payload relative to the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to proxy (requests, credentials)
    ClientToProxy,
    /// Proxy to client (method selection, connect replies)
    ProxyToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToProxy => write!(f, "client->proxy"),
            Direction::ProxyToClient => write!(f, "proxy->client"),
        }
    }
}

/// Identifier of one observed SOCKS5 connection
///
/// Always oriented client→proxy: `src` is the client, `dst` the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    /// Client address
    pub src: Ipv4Addr,
    /// Client port
    pub src_port: u16,
    /// Proxy address
    pub dst: Ipv4Addr,
    /// Proxy port
    pub dst_port: u16,
}

impl ConnectionKey {
    /// Create a key from a client→proxy tuple
    pub fn new(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16) -> Self {
        ConnectionKey {
            src,
            src_port,
            dst,
            dst_port,
        }
    }

    /// Create a key from a packet tuple, folding proxy→client packets onto
    /// the client→proxy orientation
    pub fn oriented(
        direction: Direction,
        src: Ipv4Addr,
        src_port: u16,
        dst: Ipv4Addr,
        dst_port: u16,
    ) -> Self {
        match direction {
            Direction::ClientToProxy => ConnectionKey::new(src, src_port, dst, dst_port),
            Direction::ProxyToClient => ConnectionKey::new(dst, dst_port, src, src_port),
        }
    }

    /// Proxy endpoint of the connection
    pub fn proxy(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.dst, self.dst_port)
    }

    /// Client endpoint of the connection
    pub fn client(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.src, self.src_port)
    }

    /// Compact key used by the bounded capture-side cache
    ///
    /// `(src_ip << 32) | (src_port << 16) | dst_port`. The proxy address is
    /// not part of it, so two proxies on the same port seen from the same
    /// client socket collide in the capture cache. The reconstruction engine
    /// never uses this key.
    pub fn capture_key(&self) -> u64 {
        (u64::from(u32::from(self.src)) << 32)
            | (u64::from(self.src_port) << 16)
            | u64::from(self.dst_port)
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}->{}:{}",
            self.src, self.src_port, self.dst, self.dst_port
        )
    }
}

/// One captured TCP payload handed to the reconstruction engine
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Connection the payload belongs to
    pub key: ConnectionKey,
    /// Direction the payload travelled in
    pub direction: Direction,
    /// Payload bytes
    pub payload: Bytes,
}

impl Fragment {
    /// Create a client→proxy fragment
    pub fn to_proxy(key: ConnectionKey, payload: impl Into<Bytes>) -> Self {
        Fragment {
            key,
            direction: Direction::ClientToProxy,
            payload: payload.into(),
        }
    }

    /// Create a proxy→client fragment
    pub fn from_proxy(key: ConnectionKey, payload: impl Into<Bytes>) -> Self {
        Fragment {
            key,
            direction: Direction::ProxyToClient,
            payload: payload.into(),
        }
    }
}

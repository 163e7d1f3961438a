//! Inline frame classifier
//!
//! Walks Ethernet II, IPv4 and TCP headers of one captured frame and decides
//! whether its payload belongs to a watched proxy port. Every byte access goes
//! through [`FrameReader`], which checks the read against the validated end of
//! the frame before touching it. The classifier never allocates and its work
//! is bounded by the header stack, not by payload content.

use crate::error::FrameError;
use crate::flow::{ConnectionKey, Direction};
use crate::socks::MIN_AUTH_FRAME_LEN;
use std::net::Ipv4Addr;

/// Ethernet II header length
pub const ETH_HEADER_LEN: usize = 14;
/// EtherType for IPv4
pub const ETH_P_IP: u16 = 0x0800;
/// Minimum IPv4 header length
pub const IPV4_MIN_HEADER_LEN: usize = 20;
/// Minimum TCP header length
pub const TCP_MIN_HEADER_LEN: usize = 20;
/// IP protocol number for TCP
pub const IPPROTO_TCP: u8 = 6;

/// Default candidate proxy ports
pub const DEFAULT_PROXY_PORTS: [u16; 8] = [1080, 1081, 7890, 7891, 8080, 8081, 9050, 9051];

/// Bounds-checked view over one captured frame
///
/// All reads take an absolute offset and fail with
/// [`FrameError::OutOfBounds`] instead of reading past `end`.
#[derive(Debug, Clone, Copy)]
pub struct FrameReader<'a> {
    frame: &'a [u8],
    end: usize,
}

impl<'a> FrameReader<'a> {
    /// Create a reader over the whole frame
    pub fn new(frame: &'a [u8]) -> Self {
        FrameReader {
            frame,
            end: frame.len(),
        }
    }

    /// Validated end of the readable region
    pub fn end(&self) -> usize {
        self.end
    }

    /// Shrink the readable region, e.g. to drop link-layer padding
    ///
    /// The end never grows past the current one.
    pub fn truncate(&mut self, end: usize) {
        self.end = self.end.min(end);
    }

    /// Check that `len` bytes starting at `offset` are readable
    pub fn check(&self, offset: usize, len: usize) -> Result<(), FrameError> {
        match offset.checked_add(len) {
            Some(stop) if stop <= self.end => Ok(()),
            _ => Err(FrameError::OutOfBounds {
                offset,
                len,
                end: self.end,
            }),
        }
    }

    /// Read one byte
    pub fn byte(&self, offset: usize) -> Result<u8, FrameError> {
        self.check(offset, 1)?;
        self.frame
            .get(offset)
            .copied()
            .ok_or(FrameError::OutOfBounds {
                offset,
                len: 1,
                end: self.end,
            })
    }

    /// Read a big-endian u16
    pub fn be_u16(&self, offset: usize) -> Result<u16, FrameError> {
        let bytes = self.slice(offset, 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a big-endian u32
    pub fn be_u32(&self, offset: usize) -> Result<u32, FrameError> {
        let bytes = self.slice(offset, 4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Borrow `len` bytes starting at `offset`
    pub fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], FrameError> {
        self.check(offset, len)?;
        self.frame
            .get(offset..offset + len)
            .ok_or(FrameError::OutOfBounds {
                offset,
                len,
                end: self.end,
            })
    }

    /// Borrow everything from `offset` to the validated end
    pub fn tail(&self, offset: usize) -> Result<&'a [u8], FrameError> {
        let len = self.end.checked_sub(offset).ok_or(FrameError::OutOfBounds {
            offset,
            len: 0,
            end: self.end,
        })?;
        self.slice(offset, len)
    }
}

/// Set of candidate proxy ports consulted by the classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSet {
    ports: Vec<u16>,
}

impl PortSet {
    /// Create a port set, dropping duplicates
    pub fn new(ports: impl IntoIterator<Item = u16>) -> Self {
        let mut ports: Vec<u16> = ports.into_iter().collect();
        ports.sort_unstable();
        ports.dedup();
        PortSet { ports }
    }

    /// Returns true if `port` is watched
    pub fn contains(&self, port: u16) -> bool {
        self.ports.binary_search(&port).is_ok()
    }

    /// Number of watched ports
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Returns true if no port is watched
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Watched ports in ascending order
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }
}

impl Default for PortSet {
    fn default() -> Self {
        PortSet::new(DEFAULT_PROXY_PORTS)
    }
}

/// TCP payload of a frame addressed to or from a watched port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpPayload<'a> {
    /// Source address (host order after decode)
    pub src: Ipv4Addr,
    /// Source port
    pub src_port: u16,
    /// Destination address
    pub dst: Ipv4Addr,
    /// Destination port
    pub dst_port: u16,
    /// Direction relative to the proxy
    pub direction: Direction,
    /// Payload bytes, at least [`MIN_AUTH_FRAME_LEN`] long
    pub payload: &'a [u8],
}

impl TcpPayload<'_> {
    /// Client→proxy oriented connection key
    pub fn connection_key(&self) -> ConnectionKey {
        ConnectionKey::oriented(
            self.direction,
            self.src,
            self.src_port,
            self.dst,
            self.dst_port,
        )
    }
}

/// Verdict of the classifier for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'a> {
    /// Frame is not IPv4 over Ethernet
    NotIp,
    /// IPv4 frame carrying something other than TCP
    NotTcp,
    /// TCP frame on ports outside the watched set
    PortMismatch,
    /// TCP frame on a watched port with fewer than three payload bytes
    ShortPayload,
    /// A header was cut short or declared an impossible length
    Malformed(FrameError),
    /// Candidate SOCKS5 payload
    Matching(TcpPayload<'a>),
}

impl Classification<'_> {
    /// Returns true for [`Classification::Matching`]
    pub fn is_matching(&self) -> bool {
        matches!(self, Classification::Matching(_))
    }
}

/// Classify one captured frame against the watched port set
pub fn classify<'a>(frame: &'a [u8], ports: &PortSet) -> Classification<'a> {
    match classify_inner(frame, ports) {
        Ok(classification) => classification,
        Err(err) => Classification::Malformed(err),
    }
}

fn classify_inner<'a>(frame: &'a [u8], ports: &PortSet) -> Result<Classification<'a>, FrameError> {
    let mut reader = FrameReader::new(frame);

    // Link layer
    if reader.check(0, ETH_HEADER_LEN).is_err() {
        return Ok(Classification::NotIp);
    }
    if reader.be_u16(12)? != ETH_P_IP {
        return Ok(Classification::NotIp);
    }

    // Network layer
    let ip = ETH_HEADER_LEN;
    reader.check(ip, IPV4_MIN_HEADER_LEN)?;
    let version_ihl = reader.byte(ip)?;
    if version_ihl >> 4 != 4 {
        return Ok(Classification::NotIp);
    }
    let ip_header_len = usize::from(version_ihl & 0x0F) * 4;
    if ip_header_len < IPV4_MIN_HEADER_LEN {
        return Err(FrameError::BadIpHeaderLen(ip_header_len));
    }
    reader.check(ip, ip_header_len)?;
    if reader.byte(ip + 9)? != IPPROTO_TCP {
        return Ok(Classification::NotTcp);
    }
    let total_len = usize::from(reader.be_u16(ip + 2)?);
    if total_len < ip_header_len {
        return Err(FrameError::BadIpHeaderLen(total_len));
    }
    // Ignore link-layer padding after the IP datagram
    reader.truncate(ip + total_len);
    let src = Ipv4Addr::from(reader.be_u32(ip + 12)?);
    let dst = Ipv4Addr::from(reader.be_u32(ip + 16)?);

    // Transport layer
    let tcp = ip + ip_header_len;
    reader.check(tcp, TCP_MIN_HEADER_LEN)?;
    let src_port = reader.be_u16(tcp)?;
    let dst_port = reader.be_u16(tcp + 2)?;

    let direction = if ports.contains(dst_port) {
        Direction::ClientToProxy
    } else if ports.contains(src_port) {
        Direction::ProxyToClient
    } else {
        return Ok(Classification::PortMismatch);
    };

    let tcp_header_len = usize::from(reader.byte(tcp + 12)? >> 4) * 4;
    if tcp_header_len < TCP_MIN_HEADER_LEN {
        return Err(FrameError::BadTcpHeaderLen(tcp_header_len));
    }
    let payload_offset = tcp + tcp_header_len;
    reader.check(payload_offset, 0)?;
    let payload = reader.tail(payload_offset)?;
    if payload.len() < MIN_AUTH_FRAME_LEN {
        return Ok(Classification::ShortPayload);
    }

    Ok(Classification::Matching(TcpPayload {
        src,
        src_port,
        dst,
        dst_port,
        direction,
        payload,
    }))
}

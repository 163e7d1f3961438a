//! Raw link-layer frame source
//!
//! Opens an `AF_PACKET` raw socket that sees every Ethernet frame on the host
//! (or on one interface). Requires `CAP_NET_RAW`.

use crate::error::SockswatchError;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::time::Duration;
use tracing::{info, trace};

/// Largest frame read from the socket
pub const MAX_FRAME_LEN: usize = 65_536;

/// How long a read blocks before the capture loop rechecks for shutdown
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Every link-layer protocol
const ETH_P_ALL: u16 = 0x0003;

/// `sll_hatype` of the loopback device
const ARPHRD_LOOPBACK: u16 = 772;

/// `sll_pkttype` of a frame sent by this host
const PACKET_OUTGOING: u8 = 4;

/// Link-layer metadata the kernel returns with each frame (`sockaddr_ll`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    /// Interface the frame was seen on
    pub ifindex: i32,
    /// ARP hardware type of that interface
    pub hatype: u16,
    /// Packet type (host, broadcast, outgoing, ...)
    pub pkttype: u8,
}

impl FrameMeta {
    /// Read the fixed fields of a raw `sockaddr_ll`
    pub fn parse(addr: &[u8]) -> Option<Self> {
        let ifindex = i32::from_ne_bytes(addr.get(4..8)?.try_into().ok()?);
        let hatype = u16::from_ne_bytes(addr.get(8..10)?.try_into().ok()?);
        let pkttype = *addr.get(10)?;
        Some(FrameMeta {
            ifindex,
            hatype,
            pkttype,
        })
    }

    /// Outgoing copy of a loopback frame
    ///
    /// Loopback hands every frame to packet sockets twice, once outgoing and
    /// once incoming. Only the incoming copy is kept.
    pub fn is_loopback_echo(&self) -> bool {
        self.hatype == ARPHRD_LOOPBACK && self.pkttype == PACKET_OUTGOING
    }
}

/// Blocking raw socket delivering whole link-layer frames
#[derive(Debug)]
pub struct RawSocket {
    socket: Socket,
}

impl RawSocket {
    /// Open a raw socket, optionally bound to one interface
    pub fn open(interface: Option<&str>) -> Result<Self, SockswatchError> {
        let protocol = Protocol::from(i32::from(ETH_P_ALL.to_be()));
        let socket = Socket::new(Domain::PACKET, Type::RAW, Some(protocol)).map_err(|e| {
            SockswatchError::Capture(format!(
                "failed to open AF_PACKET socket (is CAP_NET_RAW granted?): {}",
                e
            ))
        })?;

        if let Some(name) = interface {
            socket.bind_device(Some(name.as_bytes())).map_err(|e| {
                SockswatchError::Capture(format!(
                    "failed to bind capture socket to {}: {}",
                    name, e
                ))
            })?;
        }
        socket.set_read_timeout(Some(READ_TIMEOUT)).map_err(|e| {
            SockswatchError::Capture(format!("failed to set capture read timeout: {}", e))
        })?;

        info!("Capturing on {}", interface.unwrap_or("all interfaces"));
        Ok(RawSocket { socket })
    }

    /// Read one frame into `buf`
    ///
    /// Returns `Ok(None)` when the read timed out or the frame was the
    /// outgoing loopback copy.
    pub fn recv_frame<'a>(&mut self, buf: &'a mut [u8]) -> io::Result<Option<&'a [u8]>> {
        // SAFETY: `MaybeUninit<u8>` has the layout of `u8` and the socket only
        // writes initialised bytes into the slice.
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        let (n, addr) = match self.socket.recv_from(uninit) {
            Ok(received) => received,
            Err(e) if is_timeout(&e) => return Ok(None),
            Err(e) => return Err(e),
        };

        // SAFETY: the address storage holds at least `len` bytes filled in by
        // the kernel.
        let raw = unsafe {
            std::slice::from_raw_parts(addr.as_ptr().cast::<u8>(), addr.len() as usize)
        };
        if let Some(meta) = FrameMeta::parse(raw) {
            if meta.is_loopback_echo() {
                trace!("Skipping outgoing loopback copy on ifindex {}", meta.ifindex);
                return Ok(None);
            }
        }
        Ok(buf.get(..n))
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sockaddr_ll(ifindex: i32, hatype: u16, pkttype: u8) -> Vec<u8> {
        let mut addr = Vec::with_capacity(20);
        addr.extend_from_slice(&17u16.to_ne_bytes());
        addr.extend_from_slice(&ETH_P_ALL.to_be_bytes());
        addr.extend_from_slice(&ifindex.to_ne_bytes());
        addr.extend_from_slice(&hatype.to_ne_bytes());
        addr.push(pkttype);
        addr.push(6);
        addr.extend_from_slice(&[0; 8]);
        addr
    }

    #[test]
    fn test_timeout_kinds() {
        assert!(is_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_timeout(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn test_eth_p_all_network_order() {
        assert_eq!(ETH_P_ALL.to_be().to_ne_bytes(), [0x00, 0x03]);
    }

    #[test]
    fn test_frame_meta_parse() {
        let meta = FrameMeta::parse(&sockaddr_ll(3, 1, 0)).unwrap();
        assert_eq!(
            meta,
            FrameMeta {
                ifindex: 3,
                hatype: 1,
                pkttype: 0
            }
        );
        assert!(FrameMeta::parse(&[0; 10]).is_none());
    }

    #[test]
    fn test_loopback_outgoing_copy_is_skipped() {
        let outgoing =
            FrameMeta::parse(&sockaddr_ll(1, ARPHRD_LOOPBACK, PACKET_OUTGOING)).unwrap();
        assert!(outgoing.is_loopback_echo());

        let incoming = FrameMeta::parse(&sockaddr_ll(1, ARPHRD_LOOPBACK, 0)).unwrap();
        assert!(!incoming.is_loopback_echo());

        // outgoing frames on real interfaces carry the local client's requests
        let ethernet = FrameMeta::parse(&sockaddr_ll(2, 1, PACKET_OUTGOING)).unwrap();
        assert!(!ethernet.is_loopback_echo());
    }
}

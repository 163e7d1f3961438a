//! SOCKS5 stage classification
//!
//! Buffered client windows and standalone proxy payloads are classified by
//! their leading bytes into a [`Stage`]. Client windows are checked in this
//! order:
//!
//! | leading bytes                  | stage              |
//! |--------------------------------|--------------------|
//! | `01 ULEN ..` (3+ bytes)        | `UserPassAuth`     |
//! | `05 01 00 ATYP ..`             | `ConnectRequest`   |
//! | `05 N ..` with N >= 1 (3+ bytes) | `MethodOffer`    |
//! | anything else                  | `Unclassified`     |
//!
//! Past negotiation a bare `05 01 00` is the head of a CONNECT request cut
//! by the capture, not a one-method offer.
//!
//! Proxy payloads are either a two byte method selection or a connect reply.

use super::session::Phase;
use crate::socks::{
    is_known_addr_type, TargetAddr, MIN_AUTH_FRAME_LEN, SOCKS5_ADDR_TYPE_DOMAIN,
    SOCKS5_ADDR_TYPE_IPV4, SOCKS5_ADDR_TYPE_IPV6, SOCKS5_AUTH_VERSION, SOCKS5_CMD_TCP_CONNECT,
    SOCKS5_RESERVED, SOCKS5_VERSION,
};
use std::net::{Ipv4Addr, SocketAddrV4};

/// Length of the fixed `VER CMD RSV ATYP` prefix of a connect request
const REQUEST_HEADER_LEN: usize = 4;

/// Protocol stage recognised at the start of a payload window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage<'a> {
    /// Client greeting listing the offered auth methods
    MethodOffer {
        /// Offered method bytes, possibly cut short by the capture
        methods: &'a [u8],
    },
    /// Proxy choosing an auth method
    MethodSelection {
        /// Chosen method byte
        method: u8,
    },
    /// Username/password sub-negotiation request
    UserPassAuth,
    /// CONNECT request carrying the target address
    ConnectRequest,
    /// Reply to a CONNECT request
    ConnectReply {
        /// Reply code, zero on success
        code: u8,
    },
    /// Nothing recognisable at the window start
    Unclassified,
}

impl<'a> Stage<'a> {
    /// Classify a client→proxy window seen during `phase`
    pub fn client(window: &'a [u8], phase: Phase) -> Self {
        match window {
            [SOCKS5_AUTH_VERSION, ..] if window.len() >= MIN_AUTH_FRAME_LEN => Stage::UserPassAuth,
            [SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED, atyp, ..]
                if is_known_addr_type(*atyp) =>
            {
                Stage::ConnectRequest
            }
            [SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED, ..]
                if phase > Phase::Negotiating =>
            {
                Stage::ConnectRequest
            }
            [SOCKS5_VERSION, n, rest @ ..] if *n >= 1 && !rest.is_empty() => {
                let count = usize::from(*n).min(rest.len());
                Stage::MethodOffer {
                    methods: &rest[..count],
                }
            }
            _ => Stage::Unclassified,
        }
    }

    /// Classify a proxy→client payload
    pub fn proxy(payload: &'a [u8]) -> Self {
        match payload {
            [SOCKS5_VERSION, method] => Stage::MethodSelection { method: *method },
            [SOCKS5_VERSION, code, SOCKS5_RESERVED, _atyp, ..] => Stage::ConnectReply { code: *code },
            _ => Stage::Unclassified,
        }
    }

    /// Short stage name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Stage::MethodOffer { .. } => "method-offer",
            Stage::MethodSelection { .. } => "method-selection",
            Stage::UserPassAuth => "userpass-auth",
            Stage::ConnectRequest => "connect-request",
            Stage::ConnectReply { .. } => "connect-reply",
            Stage::Unclassified => "unclassified",
        }
    }
}

/// Outcome of parsing one message from the front of a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<T> {
    /// Message parsed; the second field is the number of bytes it occupied
    Complete(T, usize),
    /// More bytes are needed before the message can be read
    Incomplete,
    /// The header describes a message that cannot be valid
    Invalid,
}

/// Bytes a method offer occupies, if all of it has been buffered
pub fn method_offer_len(window: &[u8]) -> Option<usize> {
    let count = usize::from(*window.get(1)?);
    let len = 2 + count;
    (window.len() >= len).then_some(len)
}

/// Parse the target address of a CONNECT request at the start of `window`
///
/// Every address variant checks the buffered length before reading.
pub fn parse_connect_request(window: &[u8]) -> Parsed<TargetAddr> {
    let atyp = match window.get(3) {
        Some(atyp) => *atyp,
        None => return Parsed::Incomplete,
    };
    let addr = &window[REQUEST_HEADER_LEN..];

    match atyp {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let Some(bytes) = addr.get(..6) else {
                return Parsed::Incomplete;
            };
            let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
            let port = u16::from_be_bytes([bytes[4], bytes[5]]);
            Parsed::Complete(
                TargetAddr::Ipv4(SocketAddrV4::new(ip, port)),
                REQUEST_HEADER_LEN + 6,
            )
        }
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let Some(len) = addr.first().map(|len| usize::from(*len)) else {
                return Parsed::Incomplete;
            };
            if len == 0 {
                return Parsed::Invalid;
            }
            let Some(bytes) = addr.get(1..1 + len + 2) else {
                return Parsed::Incomplete;
            };
            if !bytes[..len].iter().all(|b| (0x20..=0x7e).contains(b)) {
                return Parsed::Invalid;
            }
            let domain = String::from_utf8_lossy(&bytes[..len]).into_owned();
            let port = u16::from_be_bytes([bytes[len], bytes[len + 1]]);
            Parsed::Complete(
                TargetAddr::Domain(domain, port),
                REQUEST_HEADER_LEN + 1 + len + 2,
            )
        }
        SOCKS5_ADDR_TYPE_IPV6 => {
            let Some(bytes) = addr.get(..18) else {
                return Parsed::Incomplete;
            };
            let port = u16::from_be_bytes([bytes[16], bytes[17]]);
            Parsed::Complete(TargetAddr::Ipv6(port), REQUEST_HEADER_LEN + 18)
        }
        _ => Parsed::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_userpass() {
        assert_eq!(
            Stage::client(b"\x01\x03bob\x03xyz", Phase::Negotiating),
            Stage::UserPassAuth
        );
        assert_eq!(
            Stage::client(&[1, 3, b'b'], Phase::Negotiating),
            Stage::UserPassAuth
        );
        assert_eq!(Stage::client(&[1, 3], Phase::Negotiating), Stage::Unclassified);
    }

    #[test]
    fn test_client_connect_request_wins_over_offer() {
        let request = [5, 1, 0, 1, 10, 0, 0, 1, 0, 80];
        assert_eq!(
            Stage::client(&request, Phase::Negotiating),
            Stage::ConnectRequest
        );
        // unknown ATYP falls back to a method offer
        assert_eq!(
            Stage::client(&[5, 1, 0, 9], Phase::Negotiating),
            Stage::MethodOffer { methods: &[0] }
        );
    }

    #[test]
    fn test_client_request_head_after_negotiation() {
        assert_eq!(
            Stage::client(&[5, 1, 0], Phase::Negotiating),
            Stage::MethodOffer { methods: &[0] }
        );
        assert_eq!(
            Stage::client(&[5, 1, 0], Phase::Authenticating),
            Stage::ConnectRequest
        );
        assert_eq!(
            Stage::client(&[5, 1, 0, 9], Phase::Authenticating),
            Stage::ConnectRequest
        );
        assert_eq!(
            Stage::client(&[5, 2, 0, 2], Phase::Authenticating),
            Stage::MethodOffer { methods: &[0, 2] }
        );
    }

    #[test]
    fn test_client_method_offer() {
        assert_eq!(
            Stage::client(&[5, 2, 0, 2], Phase::Negotiating),
            Stage::MethodOffer { methods: &[0, 2] }
        );
        assert_eq!(
            Stage::client(&[5, 0, 0], Phase::Negotiating),
            Stage::Unclassified
        );
        assert_eq!(Stage::client(&[5, 1], Phase::Negotiating), Stage::Unclassified);
    }

    #[test]
    fn test_client_unclassified() {
        assert_eq!(Stage::client(b"", Phase::Negotiating), Stage::Unclassified);
        assert_eq!(
            Stage::client(b"GET / HTTP/1.1", Phase::Negotiating),
            Stage::Unclassified
        );
    }

    #[test]
    fn test_proxy_stages() {
        assert_eq!(Stage::proxy(&[5, 2]), Stage::MethodSelection { method: 2 });
        assert_eq!(
            Stage::proxy(&[5, 0, 0, 1, 0, 0, 0, 0, 0, 0]),
            Stage::ConnectReply { code: 0 }
        );
        assert_eq!(
            Stage::proxy(&[5, 5, 0, 1, 0, 0, 0, 0, 0, 0]),
            Stage::ConnectReply { code: 5 }
        );
        assert_eq!(Stage::proxy(&[1, 0]), Stage::Unclassified);
        assert_eq!(Stage::proxy(&[5, 0, 0]), Stage::Unclassified);
    }

    #[test]
    fn test_method_offer_len() {
        assert_eq!(method_offer_len(&[5, 2, 0, 2]), Some(4));
        assert_eq!(method_offer_len(&[5, 2, 0, 2, 1, 3]), Some(4));
        assert_eq!(method_offer_len(&[5, 3, 0]), None);
    }

    #[test]
    fn test_parse_ipv4_target() {
        let request = [5, 1, 0, 1, 93, 184, 216, 34, 0x01, 0xBB];
        assert_eq!(
            parse_connect_request(&request),
            Parsed::Complete(
                TargetAddr::ipv4(Ipv4Addr::new(93, 184, 216, 34), 443),
                10
            )
        );
        assert_eq!(parse_connect_request(&request[..9]), Parsed::Incomplete);
    }

    #[test]
    fn test_parse_domain_target() {
        let request = b"\x05\x01\x00\x03\x07example\x01\xBB";
        assert_eq!(
            parse_connect_request(request),
            Parsed::Complete(TargetAddr::domain("example", 443), request.len())
        );
        assert_eq!(parse_connect_request(&request[..5]), Parsed::Incomplete);
        assert_eq!(
            parse_connect_request(&request[..request.len() - 1]),
            Parsed::Incomplete
        );
    }

    #[test]
    fn test_parse_domain_zero_length_is_invalid() {
        assert_eq!(
            parse_connect_request(&[5, 1, 0, 3, 0, 0, 80]),
            Parsed::Invalid
        );
    }

    #[test]
    fn test_parse_domain_non_printable_is_invalid() {
        // request head captured twice before the rest arrived
        let mut window = b"\x05\x01\x00\x03\x07ex".to_vec();
        window.extend_from_slice(b"\x05\x01\x00\x03\x07ex");
        window.extend_from_slice(b"ample\x01\xBB");
        assert_eq!(parse_connect_request(&window), Parsed::Invalid);
    }

    #[test]
    fn test_parse_ipv6_target() {
        let mut request = vec![5, 1, 0, 4];
        request.extend_from_slice(&[0; 16]);
        request.extend_from_slice(&[0x1F, 0x90]);
        assert_eq!(
            parse_connect_request(&request),
            Parsed::Complete(TargetAddr::Ipv6(8080), 22)
        );
        assert_eq!(parse_connect_request(&request[..21]), Parsed::Incomplete);
    }

    #[test]
    fn test_parse_unknown_atyp() {
        assert_eq!(parse_connect_request(&[5, 1, 0, 9, 0, 0]), Parsed::Invalid);
        assert_eq!(parse_connect_request(&[5, 1, 0]), Parsed::Incomplete);
    }
}

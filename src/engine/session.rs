//! Per-connection session state and packet buffer

use crate::flow::ConnectionKey;
use crate::socks::{Credentials, TargetAddr};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::SocketAddrV4;
use std::time::{Duration, Instant};

/// Lifecycle status of an observed session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Seen, no credentials yet
    Connecting,
    /// Credentials recovered
    Authenticated,
    /// Proxy accepted the CONNECT request
    Connected,
    /// Proxy refused the CONNECT request with the given reply code
    Failed(u8),
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Authenticated => write!(f, "authenticated"),
            SessionStatus::Connected => write!(f, "connected"),
            SessionStatus::Failed(code) => write!(f, "failed({:#04x})", code),
        }
    }
}

impl Serialize for SessionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Last protocol phase observed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Method negotiation
    Negotiating,
    /// Methods offered; sub-negotiation or the request comes next
    Authenticating,
    /// CONNECT request sent
    Requesting,
    /// Tunnel up
    Established,
    /// CONNECT refused
    Closed,
}

/// Reconstructed view of one SOCKS5 connection
#[derive(Debug, Clone)]
pub struct Session {
    /// Connection identity
    pub key: ConnectionKey,
    /// Proxy endpoint
    pub proxy: SocketAddrV4,
    /// Recovered credentials, set as one pair
    pub credentials: Option<Credentials>,
    /// Parsed CONNECT target
    pub target: Option<TargetAddr>,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Last protocol phase seen
    pub phase: Phase,
    /// First fragment seen
    pub created_at: Instant,
    /// Credentials recovered
    pub authenticated_at: Option<Instant>,
    /// Last audit report emitted for this session
    pub reported_at: Option<Instant>,
    /// Wall-clock time of the first fragment
    pub observed_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session in the `Connecting` state
    pub fn new(key: ConnectionKey, now: Instant) -> Self {
        Session {
            key,
            proxy: key.proxy(),
            credentials: None,
            target: None,
            status: SessionStatus::Connecting,
            phase: Phase::Negotiating,
            created_at: now,
            authenticated_at: None,
            reported_at: None,
            observed_at: Utc::now(),
        }
    }

    /// Store recovered credentials
    ///
    /// Returns `false` when the same pair was already stored, so a repeated
    /// auth frame changes nothing.
    pub fn set_credentials(&mut self, credentials: Credentials, now: Instant) -> bool {
        if self.credentials.as_ref() == Some(&credentials) {
            return false;
        }
        self.credentials = Some(credentials);
        self.authenticated_at = Some(now);
        self.phase = self.phase.max(Phase::Authenticating);
        if self.status == SessionStatus::Connecting {
            self.status = SessionStatus::Authenticated;
        }
        true
    }

    /// Record that the client finished its method offer
    pub fn offer_sent(&mut self) {
        self.phase = self.phase.max(Phase::Authenticating);
    }

    /// Store the CONNECT target; status is left alone
    pub fn set_target(&mut self, target: TargetAddr) {
        self.target = Some(target);
        self.phase = self.phase.max(Phase::Requesting);
    }

    /// Apply a CONNECT reply code
    pub fn apply_reply(&mut self, code: u8) {
        if code == 0 {
            self.status = SessionStatus::Connected;
            self.phase = Phase::Established;
        } else {
            self.status = SessionStatus::Failed(code);
            self.phase = Phase::Closed;
        }
    }

    /// Whether credentials have been recovered
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Whether further client bytes belong to the proxied stream
    pub fn is_tunneling(&self) -> bool {
        self.target.is_some()
            || matches!(
                self.status,
                SessionStatus::Connected | SessionStatus::Failed(_)
            )
    }

    /// Instant the retention window is measured from
    pub fn reference_time(&self) -> Instant {
        self.authenticated_at.unwrap_or(self.created_at)
    }

    /// Whether the session has outlived `retention` at `now`
    pub fn is_stale(&self, now: Instant, retention: Duration) -> bool {
        now.saturating_duration_since(self.reference_time()) > retention
    }
}

/// Bounded client→proxy byte buffer
///
/// Appends past the capacity are truncated; the buffer never slides. A
/// cursor marks the start of the unconsumed window.
#[derive(Debug)]
pub struct PacketBuffer {
    data: BytesMut,
    cursor: usize,
    capacity: usize,
}

impl PacketBuffer {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        PacketBuffer {
            data: BytesMut::new(),
            cursor: 0,
            capacity,
        }
    }

    /// Append bytes, returning how many were kept
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let room = self.capacity.saturating_sub(self.data.len());
        let kept = bytes.len().min(room);
        self.data.extend_from_slice(&bytes[..kept]);
        kept
    }

    /// Unconsumed bytes
    pub fn window(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    /// Mark `len` window bytes as consumed
    pub fn consume(&mut self, len: usize) {
        self.cursor = (self.cursor + len).min(self.data.len());
    }

    /// Mark the whole window as consumed
    pub fn discard_window(&mut self) {
        self.cursor = self.data.len();
    }

    /// Total bytes held, consumed or not
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing was ever buffered
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether no further bytes can be appended
    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }
}

/// A session together with its buffer, stored and removed as one unit
#[derive(Debug)]
pub struct SessionEntry {
    /// Session state
    pub session: Session,
    /// Client→proxy bytes
    pub buffer: PacketBuffer,
}

impl SessionEntry {
    /// Create a fresh entry
    pub fn new(key: ConnectionKey, now: Instant, buffer_capacity: usize) -> Self {
        SessionEntry {
            session: Session::new(key, now),
            buffer: PacketBuffer::new(buffer_capacity),
        }
    }
}

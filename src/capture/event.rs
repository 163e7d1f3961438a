//! Fixed-layout authentication event record
//!
//! The record crosses from the capture context to the reconstruction engine
//! as a fixed 160 byte little-endian blob whose layout matches a
//! `#[repr(C)]` struct of the same fields:
//!
//! ```text
//! offset size field
//!      0    4 pid
//!      4    4 src_ip        (host order value)
//!      8    4 dst_ip        (host order value)
//!     12    2 src_port
//!     14    2 dst_port
//!     16   64 username      (NUL padded)
//!     80   64 password      (NUL padded)
//!    144    1 username_len
//!    145    1 password_len
//!    146    6 padding       (zero)
//!    152    8 timestamp_ns  (monotonic)
//! ```

use crate::error::EventError;
use crate::flow::ConnectionKey;
use crate::socks::{Credentials, MAX_CREDENTIAL_LEN};
use bytes::{Buf, BufMut};
use std::fmt;
use std::net::Ipv4Addr;

/// Capacity of the username and password fields, terminator included
pub const CREDENTIAL_FIELD_LEN: usize = MAX_CREDENTIAL_LEN;

/// Size of the encoded record
pub const AUTH_EVENT_SIZE: usize = 160;

const PADDING_LEN: usize = 6;

/// Encoded record as carried by the event channel
pub type EventRecord = [u8; AUTH_EVENT_SIZE];

/// Credentials captured from one username/password frame
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AuthEvent {
    /// Process id of the observer
    pub pid: u32,
    /// Source address
    pub src_ip: u32,
    /// Destination address
    pub dst_ip: u32,
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// Username bytes, NUL padded
    pub username: [u8; CREDENTIAL_FIELD_LEN],
    /// Password bytes, NUL padded
    pub password: [u8; CREDENTIAL_FIELD_LEN],
    /// Username length
    pub username_len: u8,
    /// Password length
    pub password_len: u8,
    /// Capture timestamp, nanoseconds on a monotonic clock
    pub timestamp_ns: u64,
}

impl AuthEvent {
    /// Username bytes up to the declared length
    pub fn username_bytes(&self) -> &[u8] {
        field(&self.username, self.username_len)
    }

    /// Password bytes up to the declared length
    pub fn password_bytes(&self) -> &[u8] {
        field(&self.password, self.password_len)
    }

    /// Credentials carried by this event
    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_bytes(self.username_bytes(), self.password_bytes())
    }

    /// Connection the event was captured on
    pub fn connection_key(&self) -> ConnectionKey {
        ConnectionKey::new(
            Ipv4Addr::from(self.src_ip),
            self.src_port,
            Ipv4Addr::from(self.dst_ip),
            self.dst_port,
        )
    }

    /// Compact key of the capture-side cache
    pub fn session_key(&self) -> u64 {
        self.connection_key().capture_key()
    }

    /// Encode to the fixed wire layout
    pub fn encode(&self) -> EventRecord {
        let mut record = [0u8; AUTH_EVENT_SIZE];
        let mut buf = &mut record[..];
        buf.put_u32_le(self.pid);
        buf.put_u32_le(self.src_ip);
        buf.put_u32_le(self.dst_ip);
        buf.put_u16_le(self.src_port);
        buf.put_u16_le(self.dst_port);
        buf.put_slice(&self.username);
        buf.put_slice(&self.password);
        buf.put_u8(self.username_len);
        buf.put_u8(self.password_len);
        buf.put_bytes(0, PADDING_LEN);
        buf.put_u64_le(self.timestamp_ns);
        record
    }

    /// Decode from the fixed wire layout
    pub fn decode(data: &[u8]) -> Result<Self, EventError> {
        if data.len() != AUTH_EVENT_SIZE {
            return Err(EventError::BadSize {
                expected: AUTH_EVENT_SIZE,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let pid = buf.get_u32_le();
        let src_ip = buf.get_u32_le();
        let dst_ip = buf.get_u32_le();
        let src_port = buf.get_u16_le();
        let dst_port = buf.get_u16_le();
        let mut username = [0u8; CREDENTIAL_FIELD_LEN];
        buf.copy_to_slice(&mut username);
        let mut password = [0u8; CREDENTIAL_FIELD_LEN];
        buf.copy_to_slice(&mut password);
        let username_len = buf.get_u8();
        let password_len = buf.get_u8();
        buf.advance(PADDING_LEN);
        let timestamp_ns = buf.get_u64_le();

        if usize::from(username_len) >= CREDENTIAL_FIELD_LEN {
            return Err(EventError::BadLength {
                field: "username",
                len: username_len,
            });
        }
        if usize::from(password_len) >= CREDENTIAL_FIELD_LEN {
            return Err(EventError::BadLength {
                field: "password",
                len: password_len,
            });
        }

        Ok(AuthEvent {
            pid,
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            username,
            password,
            username_len,
            password_len,
            timestamp_ns,
        })
    }
}

fn field(bytes: &[u8; CREDENTIAL_FIELD_LEN], len: u8) -> &[u8] {
    let len = usize::from(len).min(CREDENTIAL_FIELD_LEN - 1);
    &bytes[..len]
}

impl fmt::Debug for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthEvent")
            .field("pid", &self.pid)
            .field("connection", &self.connection_key())
            .field("username", &String::from_utf8_lossy(self.username_bytes()))
            .field("password_len", &self.password_len)
            .field("timestamp_ns", &self.timestamp_ns)
            .finish()
    }
}

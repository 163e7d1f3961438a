//! Username/password credential extractor
//!
//! Parses the RFC 1929 sub-negotiation request:
//!
//! ```text
//! +----+------+----------+------+----------+
//! |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
//! +----+------+----------+------+----------+
//! | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
//! +----+------+----------+------+----------+
//! ```
//!
//! Only lengths in `1..=63` are accepted. Every failure abandons the parse;
//! nothing is ever substituted for missing bytes.

use super::event::{AuthEvent, CREDENTIAL_FIELD_LEN};
use super::TcpPayload;
use crate::error::ExtractError;
use crate::socks::{
    MAX_CREDENTIAL_COPY, MAX_CREDENTIAL_LEN, MIN_AUTH_FRAME_LEN, PRINTABLE_MAX, PRINTABLE_MIN,
    SOCKS5_AUTH_VERSION,
};

/// Validated header of a username/password frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthHeader {
    /// Declared username length
    pub username_len: u8,
    /// Declared password length
    pub password_len: u8,
}

impl AuthHeader {
    /// Validate the header fields of `buf` against its length
    pub fn parse(buf: &[u8]) -> Result<Self, ExtractError> {
        if buf.len() < MIN_AUTH_FRAME_LEN {
            return Err(ExtractError::TooShort(buf.len()));
        }
        let version = buf[0];
        if version != SOCKS5_AUTH_VERSION {
            return Err(ExtractError::NotAuthFrame(version));
        }

        let username_len = buf[1];
        if username_len == 0 || usize::from(username_len) >= MAX_CREDENTIAL_LEN {
            return Err(ExtractError::BadUsernameLen(username_len));
        }
        let plen_offset = 2 + usize::from(username_len);
        let password_len = match buf.get(plen_offset) {
            Some(len) => *len,
            None => {
                return Err(ExtractError::Truncated {
                    needed: plen_offset + 1,
                    available: buf.len(),
                })
            }
        };
        if password_len == 0 || usize::from(password_len) >= MAX_CREDENTIAL_LEN {
            return Err(ExtractError::BadPasswordLen(password_len));
        }

        let header = AuthHeader {
            username_len,
            password_len,
        };
        if buf.len() < header.frame_len() {
            return Err(ExtractError::Truncated {
                needed: header.frame_len(),
                available: buf.len(),
            });
        }
        Ok(header)
    }

    /// Total length of the frame described by this header
    pub fn frame_len(&self) -> usize {
        3 + usize::from(self.username_len) + usize::from(self.password_len)
    }

    fn password_offset(&self) -> usize {
        3 + usize::from(self.username_len)
    }
}

/// A username/password frame borrowed from a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthFrame<'a> {
    /// Username bytes
    pub username: &'a [u8],
    /// Password bytes
    pub password: &'a [u8],
}

impl<'a> AuthFrame<'a> {
    /// Parse a frame starting at the beginning of `buf`
    pub fn parse(buf: &'a [u8]) -> Result<Self, ExtractError> {
        let header = AuthHeader::parse(buf)?;
        let username = buf
            .get(2..2 + usize::from(header.username_len))
            .ok_or(ExtractError::TooShort(buf.len()))?;
        let start = header.password_offset();
        let password = buf
            .get(start..start + usize::from(header.password_len))
            .ok_or(ExtractError::TooShort(buf.len()))?;
        Ok(AuthFrame { username, password })
    }

    /// Parse a frame and additionally require printable ASCII credentials
    pub fn parse_printable(buf: &'a [u8]) -> Result<Self, ExtractError> {
        let frame = Self::parse(buf)?;
        if let Some(byte) = frame
            .username
            .iter()
            .chain(frame.password.iter())
            .find(|b| !(PRINTABLE_MIN..=PRINTABLE_MAX).contains(*b))
        {
            return Err(ExtractError::NonPrintable(*byte));
        }
        Ok(frame)
    }

    /// Number of buffer bytes this frame occupies
    pub fn len(&self) -> usize {
        3 + self.username.len() + self.password.len()
    }

    /// Frames always hold at least one username and one password byte
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Credential bytes copied into fixed-capacity fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCredentials {
    /// Username, NUL padded
    pub username: [u8; CREDENTIAL_FIELD_LEN],
    /// Copied username length
    pub username_len: u8,
    /// Password, NUL padded
    pub password: [u8; CREDENTIAL_FIELD_LEN],
    /// Copied password length
    pub password_len: u8,
}

/// Extract credentials from a payload into fixed fields
///
/// Each copy loop runs at most [`MAX_CREDENTIAL_COPY`] times and re-checks
/// the payload end on every byte, independently of the declared lengths.
pub fn extract_credentials(payload: &[u8]) -> Result<FixedCredentials, ExtractError> {
    let header = AuthHeader::parse(payload)?;

    let mut username = [0u8; CREDENTIAL_FIELD_LEN];
    let username_len = bounded_copy(payload, 2, header.username_len, &mut username);

    let mut password = [0u8; CREDENTIAL_FIELD_LEN];
    let password_len = bounded_copy(
        payload,
        header.password_offset(),
        header.password_len,
        &mut password,
    );

    if username_len == 0 || password_len == 0 {
        return Err(ExtractError::Truncated {
            needed: header.frame_len(),
            available: payload.len(),
        });
    }

    Ok(FixedCredentials {
        username,
        username_len,
        password,
        password_len,
    })
}

fn bounded_copy(
    payload: &[u8],
    start: usize,
    declared: u8,
    out: &mut [u8; CREDENTIAL_FIELD_LEN],
) -> u8 {
    let mut copied = 0u8;
    for i in 0..MAX_CREDENTIAL_COPY {
        if i >= usize::from(declared) {
            break;
        }
        let Some(byte) = payload.get(start + i) else {
            break;
        };
        out[i] = *byte;
        copied += 1;
    }
    copied
}

/// Run the extractor on a classified payload and build an [`AuthEvent`]
pub fn extract_event(
    payload: &TcpPayload<'_>,
    pid: u32,
    timestamp_ns: u64,
) -> Result<AuthEvent, ExtractError> {
    let creds = extract_credentials(payload.payload)?;
    Ok(AuthEvent {
        pid,
        src_ip: u32::from(payload.src),
        dst_ip: u32::from(payload.dst),
        src_port: payload.src_port,
        dst_port: payload.dst_port,
        username: creds.username,
        password: creds.password,
        username_len: creds.username_len,
        password_len: creds.password_len,
        timestamp_ns,
    })
}

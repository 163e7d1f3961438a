//! Error types for Sockswatch
//!
//! This module defines the error types shared across the capture and
//! reconstruction layers. Parse errors never escape the core as failures of
//! the process: callers drop the current parse attempt and move on.

use std::io;
use thiserror::Error;

/// Main error type for Sockswatch operations
#[derive(Error, Debug)]
pub enum SockswatchError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capture source could not be set up
    #[error("Capture error: {0}")]
    Capture(String),
}

/// Errors raised while walking link, network and transport headers
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// A read at `offset` would pass the end of the frame
    #[error("read of {len} bytes at offset {offset} past end of frame ({end})")]
    OutOfBounds {
        /// Offset of the attempted read
        offset: usize,
        /// Width of the attempted read
        len: usize,
        /// Validated end of the frame
        end: usize,
    },

    /// IPv4 header length field below the 20 byte minimum
    #[error("invalid IPv4 header length: {0}")]
    BadIpHeaderLen(usize),

    /// TCP data offset field below the 20 byte minimum
    #[error("invalid TCP header length: {0}")]
    BadTcpHeaderLen(usize),
}

/// Errors raised by the username/password credential extractor
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractError {
    /// Payload does not start with the sub-negotiation marker
    #[error("not a username/password frame (leading byte {0:#04x})")]
    NotAuthFrame(u8),

    /// Payload too short to hold the auth header
    #[error("payload too short: {0} bytes")]
    TooShort(usize),

    /// Declared username length outside 1..=63
    #[error("invalid username length: {0}")]
    BadUsernameLen(u8),

    /// Declared password length outside 1..=63
    #[error("invalid password length: {0}")]
    BadPasswordLen(u8),

    /// Declared lengths run past the captured payload
    #[error("truncated payload: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes implied by the header fields
        needed: usize,
        /// Bytes actually captured
        available: usize,
    },

    /// A credential byte falls outside the printable ASCII range
    #[error("non-printable credential byte {0:#04x}")]
    NonPrintable(u8),
}

/// Errors raised decoding an [`AuthEvent`](crate::capture::AuthEvent) record
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventError {
    /// Record is not exactly the fixed wire size
    #[error("invalid event size: expected {expected}, got {actual}")]
    BadSize {
        /// Fixed wire size
        expected: usize,
        /// Size of the received record
        actual: usize,
    },

    /// A length byte exceeds the field capacity
    #[error("invalid {field} length: {len}")]
    BadLength {
        /// Field name
        field: &'static str,
        /// Declared length
        len: u8,
    },
}

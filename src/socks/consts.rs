//! SOCKS5 protocol constants
//!
//! Wire values observed while reconstructing SOCKS5 exchanges.

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

/// SOCKS5 authentication sub-negotiation version
pub const SOCKS5_AUTH_VERSION: u8 = 0x01;

// Authentication methods
/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;
/// GSSAPI authentication (recognised, never decoded)
pub const SOCKS5_AUTH_METHOD_GSSAPI: u8 = 0x01;
/// Username/password authentication
pub const SOCKS5_AUTH_METHOD_PASSWORD: u8 = 0x02;
/// No acceptable methods
pub const SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

// Commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

// Reply codes
/// Succeeded
pub const SOCKS5_REPLY_SUCCEEDED: u8 = 0x00;

// Reserved byte
/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

// Credential bounds
/// Largest username or password length accepted from a capture (exclusive)
pub const MAX_CREDENTIAL_LEN: usize = 64;
/// Largest number of credential bytes copied into a fixed record
pub const MAX_CREDENTIAL_COPY: usize = MAX_CREDENTIAL_LEN - 1;
/// Smallest payload that can hold a username/password frame header
pub const MIN_AUTH_FRAME_LEN: usize = 3;

/// Lowest printable ASCII byte accepted by the fallback scan
pub const PRINTABLE_MIN: u8 = 32;
/// Highest printable ASCII byte accepted by the fallback scan
pub const PRINTABLE_MAX: u8 = 126;

/// Returns true if `atyp` is one of the three SOCKS5 address types
pub fn is_known_addr_type(atyp: u8) -> bool {
    matches!(
        atyp,
        SOCKS5_ADDR_TYPE_IPV4 | SOCKS5_ADDR_TYPE_DOMAIN | SOCKS5_ADDR_TYPE_IPV6
    )
}

/// Human readable name of an authentication method byte
pub fn auth_method_name(method: u8) -> &'static str {
    match method {
        SOCKS5_AUTH_METHOD_NONE => "no authentication",
        SOCKS5_AUTH_METHOD_GSSAPI => "GSSAPI",
        SOCKS5_AUTH_METHOD_PASSWORD => "username/password",
        SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE => "no acceptable method",
        _ => "other",
    }
}

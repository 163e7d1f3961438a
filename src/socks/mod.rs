//! SOCKS5 wire vocabulary
//!
//! Constants and value types shared by the inline classifier and the
//! reconstruction engine. Nothing here performs IO.

pub mod consts;
mod types;

pub use consts::*;
pub use types::{Credentials, TargetAddr};

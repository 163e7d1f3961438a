//! # Sockswatch - Passive SOCKS5 Session Reconstruction
//!
//! Sockswatch watches TCP traffic to a set of candidate proxy ports,
//! recovers RFC 1929 username/password credentials from SOCKS5 handshakes,
//! and reconstructs each connection's negotiation into an auditable session.
//!
//! ## Features
//!
//! - **Inline Classification**: Bounds-checked, allocation-free parsing of
//!   Ethernet/IPv4/TCP frames on the capture path
//! - **Fixed-Layout Events**: Credentials leave the capture path as 160 byte
//!   records over a lossy bounded channel
//! - **Session Reconstruction**: Per-connection buffering with stage
//!   classification, a fallback scan for misaligned fragments, and target
//!   address recovery
//! - **Rate-Limited Reporting**: One audit report per cooldown window across
//!   all sessions, as text logs or JSON lines
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sockswatch::config::load_config;
//! use sockswatch::monitor::run_monitor;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("sockswatch.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_monitor(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! raw frame -> classifier -> extractor -> AuthEvent channel  -\
//!                        \-> fragment channel ----------------> engine -> report sink
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod capture;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod flow;
pub mod monitor;
pub mod socks;
pub mod stats;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use engine::Engine;
pub use error::SockswatchError;
pub use monitor::run_monitor;

/// Version of the Sockswatch library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

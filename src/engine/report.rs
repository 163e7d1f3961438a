//! Audit reports and their rate limit
//!
//! A report is produced when a session yields credentials, or yields a
//! target while credentials are known. One [`ReportGate`] limits output to
//! one report per cooldown window across all sessions.

use super::session::{Session, SessionStatus};
use crate::config::{ReportConfig, ReportFormat};
use crate::socks::TargetAddr;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Number of digest bytes kept in a redacted password
const REDACTED_DIGEST_BYTES: usize = 8;

/// One recovered credential record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Report time
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time the session was first seen
    pub first_seen: DateTime<Utc>,
    /// Client endpoint
    pub client: SocketAddrV4,
    /// Proxy endpoint
    pub proxy: SocketAddrV4,
    /// Username
    pub username: String,
    /// Password, or its fingerprint when redaction is on
    pub password: String,
    /// CONNECT target, when parsed
    pub target: Option<TargetAddr>,
    /// Session status at report time
    pub status: SessionStatus,
}

impl AuditReport {
    /// Build a report from a session holding credentials
    pub fn from_session(session: &Session, redact: bool) -> Option<Self> {
        let credentials = session.credentials.as_ref()?;
        let password = if redact {
            redact_password(&credentials.password)
        } else {
            credentials.password.clone()
        };
        Some(AuditReport {
            timestamp: Utc::now(),
            first_seen: session.observed_at,
            client: session.key.client(),
            proxy: session.proxy,
            username: credentials.username.clone(),
            password,
            target: session.target.clone(),
            status: session.status,
        })
    }
}

/// Replace a password with a short SHA-256 fingerprint
pub fn redact_password(password: &str) -> String {
    let digest = Sha256::new().chain_update(password.as_bytes()).finalize();
    let hex: String = digest[..REDACTED_DIGEST_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("sha256:{}", hex)
}

/// Global report rate limit
///
/// The cooldown check and the timestamp update happen under one lock, so two
/// sessions can never both pass in the same window.
#[derive(Debug)]
pub struct ReportGate {
    last: Mutex<Option<Instant>>,
    cooldown: Duration,
}

impl ReportGate {
    /// Create a gate that opens at most once per `cooldown`
    pub fn new(cooldown: Duration) -> Self {
        ReportGate {
            last: Mutex::new(None),
            cooldown,
        }
    }

    /// Claim the report slot at `now`
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(at) if now.saturating_duration_since(at) < self.cooldown => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Configured cooldown
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

/// Destination for audit reports
pub trait ReportSink: Send + Sync {
    /// Write one report
    fn emit(&self, report: &AuditReport);
}

/// Logs reports through `tracing`
#[derive(Debug, Default)]
pub struct TextSink;

impl ReportSink for TextSink {
    fn emit(&self, report: &AuditReport) {
        let target = report
            .target
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        info!(
            client = %report.client,
            proxy = %report.proxy,
            username = %report.username,
            password = %report.password,
            target = %target,
            status = %report.status,
            "SOCKS5 credentials captured"
        );
    }
}

/// Writes one JSON object per report to stdout
#[derive(Debug, Default)]
pub struct JsonSink;

impl ReportSink for JsonSink {
    fn emit(&self, report: &AuditReport) {
        match serde_json::to_string(report) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize audit report: {}", e),
        }
    }
}

/// Keeps reports in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    reports: Arc<Mutex<Vec<AuditReport>>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports emitted so far
    pub fn reports(&self) -> Vec<AuditReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReportSink for MemorySink {
    fn emit(&self, report: &AuditReport) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
    }
}

/// Build the sink selected by the report configuration
pub fn sink_from_config(config: &ReportConfig) -> Arc<dyn ReportSink> {
    match config.format {
        ReportFormat::Text => Arc::new(TextSink),
        ReportFormat::Json => Arc::new(JsonSink),
    }
}

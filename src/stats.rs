//! Runtime statistics for the monitor
//!
//! Relaxed atomic counters shared by the capture loop, the engine and the
//! status reporter.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters updated across the capture and reconstruction layers
#[derive(Debug, Default)]
pub struct MonitorStats {
    /// Frames handed to the classifier
    pub frames_seen: AtomicU64,
    /// Frames classified as candidate SOCKS5 payloads
    pub payloads_matched: AtomicU64,
    /// Frames rejected for truncated or impossible headers
    pub frames_malformed: AtomicU64,
    /// Auth events produced by the extractor
    pub events_emitted: AtomicU64,
    /// Auth events dropped on a full channel
    pub events_dropped: AtomicU64,
    /// Fragments dropped on a full channel
    pub fragments_dropped: AtomicU64,
    /// Entries in the capture-side cache
    pub cache_entries: AtomicUsize,
    /// New keys refused because the capture-side cache was full
    pub cache_rejected: AtomicU64,
    /// Sessions currently tracked by the engine
    pub active_sessions: AtomicUsize,
    /// Credential pairs recovered by the engine
    pub credentials_recovered: AtomicU64,
    /// Sessions removed by the reaper
    pub sessions_reaped: AtomicU64,
    /// Audit reports emitted
    pub reports_emitted: AtomicU64,
    /// Audit reports suppressed by the cooldown
    pub reports_suppressed: AtomicU64,
}

impl MonitorStats {
    /// Create zeroed stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to a counter
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current stats snapshot
    pub fn snapshot(&self) -> MonitorStatsSnapshot {
        MonitorStatsSnapshot {
            frames_seen: self.frames_seen.load(Ordering::Relaxed),
            payloads_matched: self.payloads_matched.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            fragments_dropped: self.fragments_dropped.load(Ordering::Relaxed),
            cache_entries: self.cache_entries.load(Ordering::Relaxed),
            cache_rejected: self.cache_rejected.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            credentials_recovered: self.credentials_recovered.load(Ordering::Relaxed),
            sessions_reaped: self.sessions_reaped.load(Ordering::Relaxed),
            reports_emitted: self.reports_emitted.load(Ordering::Relaxed),
            reports_suppressed: self.reports_suppressed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of monitor statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStatsSnapshot {
    pub frames_seen: u64,
    pub payloads_matched: u64,
    pub frames_malformed: u64,
    pub events_emitted: u64,
    pub events_dropped: u64,
    pub fragments_dropped: u64,
    pub cache_entries: usize,
    pub cache_rejected: u64,
    pub active_sessions: usize,
    pub credentials_recovered: u64,
    pub sessions_reaped: u64,
    pub reports_emitted: u64,
    pub reports_suppressed: u64,
}

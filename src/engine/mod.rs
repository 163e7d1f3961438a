//! Session reconstruction engine
//!
//! Consumes captured fragments and auth events, rebuilds each SOCKS5
//! connection's state in a [`SessionStore`], and emits rate-limited audit
//! reports.
//!
//! Client→proxy bytes are appended to a bounded per-connection buffer and
//! consumed one message at a time from the window start. A truncated message
//! leaves the window in place for the next fragment. A message whose header
//! can never be valid discards the window. Once a CONNECT request has been
//! seen, or the proxy has answered one, client bytes are tunnel data and are
//! not buffered. Proxy→client payloads are classified on their own and never
//! buffered.
//!
//! Locks are always taken store first, then report gate. Reports are written
//! to the sink after the store lock is released.

mod reaper;
mod report;
mod session;
mod stage;
mod store;

pub use reaper::run_reaper;
pub use report::{
    redact_password, sink_from_config, AuditReport, JsonSink, MemorySink, ReportGate, ReportSink,
    TextSink,
};
pub use session::{PacketBuffer, Phase, Session, SessionEntry, SessionStatus};
pub use stage::{method_offer_len, parse_connect_request, Parsed, Stage};
pub use store::SessionStore;

use crate::capture::{AuthEvent, AuthFrame};
use crate::clock::Clock;
use crate::config::{EngineConfig, ReportConfig};
use crate::error::ExtractError;
use crate::flow::{ConnectionKey, Direction, Fragment};
use crate::socks::{auth_method_name, Credentials, SOCKS5_AUTH_VERSION};
use crate::stats::MonitorStats;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// What to do with the window after one classification step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// A message of this many bytes was handled
    Consumed(usize),
    /// Keep the window until more bytes arrive
    Wait,
    /// Drop the window
    Discard,
}

/// Reconstruction engine shared by the consumer and reaper tasks
pub struct Engine {
    store: Mutex<SessionStore>,
    gate: ReportGate,
    sink: Arc<dyn ReportSink>,
    clock: Arc<dyn Clock>,
    stats: Arc<MonitorStats>,
    retention: Duration,
    redact: bool,
}

impl Engine {
    /// Create an engine
    pub fn new(
        config: &EngineConfig,
        report: &ReportConfig,
        sink: Arc<dyn ReportSink>,
        clock: Arc<dyn Clock>,
        stats: Arc<MonitorStats>,
    ) -> Self {
        Engine {
            store: Mutex::new(SessionStore::new(config.buffer_capacity)),
            gate: ReportGate::new(config.report_cooldown()),
            sink,
            clock,
            stats,
            retention: config.retention(),
            redact: report.redact_passwords,
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, SessionStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed one captured payload
    pub fn ingest_fragment(&self, fragment: &Fragment) {
        let now = self.clock.now();
        let mut reports = Vec::new();
        {
            let mut store = self.lock_store();
            let entry = store.get_or_create(fragment.key, now);
            match fragment.direction {
                Direction::ClientToProxy => {
                    self.handle_client(entry, &fragment.payload, now, &mut reports)
                }
                Direction::ProxyToClient => self.handle_proxy(&mut entry.session, &fragment.payload),
            }
            self.stats
                .active_sessions
                .store(store.len(), Ordering::Relaxed);
        }
        self.emit(reports);
    }

    /// Fold a capture-side auth event into its session
    pub fn ingest_auth_event(&self, event: &AuthEvent) {
        let Some(credentials) = event.credentials() else {
            trace!("Ignoring auth event without credentials");
            return;
        };
        let now = self.clock.now();
        let mut reports = Vec::new();
        {
            let mut store = self.lock_store();
            let entry = store.get_or_create(event.connection_key(), now);
            self.apply_credentials(&mut entry.session, credentials, now, &mut reports);
            self.stats
                .active_sessions
                .store(store.len(), Ordering::Relaxed);
        }
        self.emit(reports);
    }

    /// Remove stale sessions, returning how many were removed
    pub fn reap(&self) -> usize {
        let now = self.clock.now();
        let (removed, remaining) = {
            let mut store = self.lock_store();
            let removed = store.remove_stale(now, self.retention);
            (removed, store.len())
        };
        self.stats
            .active_sessions
            .store(remaining, Ordering::Relaxed);
        if removed > 0 {
            self.stats
                .sessions_reaped
                .fetch_add(removed as u64, Ordering::Relaxed);
            info!("Reaped {} stale sessions, {} remaining", removed, remaining);
        }
        removed
    }

    /// Snapshot of the session for `key`
    pub fn session(&self, key: &ConnectionKey) -> Option<Session> {
        self.lock_store().get(key).cloned()
    }

    /// Bytes held in the buffer for `key`
    pub fn buffered_len(&self, key: &ConnectionKey) -> Option<usize> {
        self.lock_store().entry(key).map(|entry| entry.buffer.len())
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.lock_store().len()
    }

    fn handle_client(
        &self,
        entry: &mut SessionEntry,
        payload: &[u8],
        now: Instant,
        reports: &mut Vec<AuditReport>,
    ) {
        let SessionEntry { session, buffer } = entry;
        if session.is_tunneling() {
            trace!("{} bytes of tunnel data on {}", payload.len(), session.key);
            return;
        }

        let kept = buffer.append(payload);
        if kept < payload.len() {
            trace!(
                "Buffer full on {}, dropped {} bytes",
                session.key,
                payload.len() - kept
            );
        }

        while !session.is_tunneling() {
            let step = {
                let window = buffer.window();
                if window.is_empty() {
                    break;
                }
                self.step(session, window, now, reports)
            };
            match step {
                Step::Consumed(len) => buffer.consume(len),
                Step::Wait => break,
                Step::Discard => {
                    buffer.discard_window();
                    break;
                }
            }
        }
    }

    fn step(
        &self,
        session: &mut Session,
        window: &[u8],
        now: Instant,
        reports: &mut Vec<AuditReport>,
    ) -> Step {
        let stage = Stage::client(window, session.phase);
        trace!("{} window of {} bytes: {}", session.key, window.len(), stage.name());

        match stage {
            Stage::UserPassAuth => match AuthFrame::parse(window) {
                Ok(frame) => {
                    self.recover(session, &frame, now, reports);
                    Step::Consumed(frame.len())
                }
                Err(ExtractError::Truncated { .. }) | Err(ExtractError::TooShort(_)) => Step::Wait,
                Err(e) => {
                    debug!("Discarding auth frame on {}: {}", session.key, e);
                    Step::Discard
                }
            },
            Stage::ConnectRequest => match parse_connect_request(window) {
                Parsed::Complete(target, len) => {
                    debug!("{} requests {}", session.key, target);
                    session.set_target(target);
                    if session.has_credentials() {
                        self.report(session, now, reports);
                    }
                    Step::Consumed(len)
                }
                Parsed::Incomplete => Step::Wait,
                Parsed::Invalid => {
                    debug!("Discarding malformed connect request on {}", session.key);
                    Step::Discard
                }
            },
            Stage::MethodOffer { methods } => {
                let names: Vec<&str> = methods.iter().map(|m| auth_method_name(*m)).collect();
                debug!("{} offers auth methods {:?}", session.key, names);
                match method_offer_len(window) {
                    Some(len) => {
                        session.offer_sent();
                        Step::Consumed(len)
                    }
                    None => Step::Wait,
                }
            }
            Stage::Unclassified => self.fallback_scan(session, window, now, reports),
            // proxy-only stages
            Stage::MethodSelection { .. } | Stage::ConnectReply { .. } => Step::Discard,
        }
    }

    /// Look for a printable auth frame at any offset of an unclassified window
    fn fallback_scan(
        &self,
        session: &mut Session,
        window: &[u8],
        now: Instant,
        reports: &mut Vec<AuditReport>,
    ) -> Step {
        if session.has_credentials() {
            return Step::Discard;
        }

        let found = window
            .iter()
            .enumerate()
            .filter(|(_, byte)| **byte == SOCKS5_AUTH_VERSION)
            .find_map(|(offset, _)| {
                let candidate = window.get(offset..)?;
                AuthFrame::parse_printable(candidate)
                    .ok()
                    .map(|frame| (offset, frame))
            });

        match found {
            Some((offset, frame)) => {
                debug!(
                    "Fallback scan matched auth frame at offset {} on {}",
                    offset, session.key
                );
                self.recover(session, &frame, now, reports);
                Step::Consumed(offset + frame.len())
            }
            None => Step::Wait,
        }
    }

    fn handle_proxy(&self, session: &mut Session, payload: &[u8]) {
        match Stage::proxy(payload) {
            Stage::MethodSelection { method } => {
                debug!(
                    "Proxy selected auth method {} on {}",
                    auth_method_name(method),
                    session.key
                );
            }
            Stage::ConnectReply { code } => {
                session.apply_reply(code);
                debug!("{} is now {}", session.key, session.status);
            }
            stage => trace!("Ignoring proxy payload on {}: {}", session.key, stage.name()),
        }
    }

    fn recover(
        &self,
        session: &mut Session,
        frame: &AuthFrame<'_>,
        now: Instant,
        reports: &mut Vec<AuditReport>,
    ) {
        if let Some(credentials) = Credentials::from_bytes(frame.username, frame.password) {
            self.apply_credentials(session, credentials, now, reports);
        }
    }

    fn apply_credentials(
        &self,
        session: &mut Session,
        credentials: Credentials,
        now: Instant,
        reports: &mut Vec<AuditReport>,
    ) {
        if !session.set_credentials(credentials, now) {
            return;
        }
        MonitorStats::incr(&self.stats.credentials_recovered);
        info!("Recovered credentials on {}", session.key);
        self.report(session, now, reports);
    }

    fn report(&self, session: &mut Session, now: Instant, reports: &mut Vec<AuditReport>) {
        let Some(report) = AuditReport::from_session(session, self.redact) else {
            return;
        };
        if !self.gate.try_acquire(now) {
            MonitorStats::incr(&self.stats.reports_suppressed);
            debug!("Report for {} suppressed by cooldown", session.key);
            return;
        }
        session.reported_at = Some(now);
        MonitorStats::incr(&self.stats.reports_emitted);
        reports.push(report);
    }

    fn emit(&self, reports: Vec<AuditReport>) {
        for report in &reports {
            self.sink.emit(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::net::Ipv4Addr;

    struct Harness {
        engine: Engine,
        clock: ManualClock,
        sink: MemorySink,
        stats: Arc<MonitorStats>,
    }

    fn harness(config: EngineConfig) -> Harness {
        let clock = ManualClock::new();
        let sink = MemorySink::new();
        let stats = Arc::new(MonitorStats::new());
        let engine = Engine::new(
            &config,
            &ReportConfig::default(),
            Arc::new(sink.clone()),
            Arc::new(clock.clone()),
            stats.clone(),
        );
        Harness {
            engine,
            clock,
            sink,
            stats,
        }
    }

    fn key(port: u16) -> ConnectionKey {
        ConnectionKey::new(
            Ipv4Addr::new(10, 0, 0, 2),
            port,
            Ipv4Addr::new(10, 0, 0, 1),
            1080,
        )
    }

    const AUTH: &[u8] = b"\x01\x03bob\x03xyz";
    const CONNECT: &[u8] = b"\x05\x01\x00\x03\x07example\x01\xBB";

    #[test]
    fn test_auth_frame_sets_credentials() {
        let h = harness(EngineConfig::default());
        h.engine.ingest_fragment(&Fragment::to_proxy(key(1), AUTH));

        let session = h.engine.session(&key(1)).unwrap();
        assert_eq!(session.status, SessionStatus::Authenticated);
        let credentials = session.credentials.unwrap();
        assert_eq!(credentials.username, "bob");
        assert_eq!(credentials.password, "xyz");
        assert_eq!(h.sink.reports().len(), 1);
    }

    #[test]
    fn test_bad_ulen_leaves_session_connecting() {
        let h = harness(EngineConfig::default());
        let mut payload = vec![0x01, 0x40];
        payload.extend_from_slice(&[b'a'; 64]);
        payload.extend_from_slice(&[3, b'x', b'y', b'z']);
        h.engine.ingest_fragment(&Fragment::to_proxy(key(1), payload));

        let session = h.engine.session(&key(1)).unwrap();
        assert_eq!(session.status, SessionStatus::Connecting);
        assert!(session.credentials.is_none());
        assert!(h.sink.reports().is_empty());
    }

    #[test]
    fn test_full_handshake() {
        let h = harness(EngineConfig::default());
        let k = key(1);
        h.engine.ingest_fragment(&Fragment::to_proxy(k, vec![5, 1, 2]));
        h.engine.ingest_fragment(&Fragment::from_proxy(k, vec![5, 2]));
        h.engine.ingest_fragment(&Fragment::to_proxy(k, AUTH));
        h.engine.ingest_fragment(&Fragment::from_proxy(k, vec![1, 0]));
        h.engine.ingest_fragment(&Fragment::to_proxy(k, CONNECT));
        h.engine
            .ingest_fragment(&Fragment::from_proxy(k, vec![5, 0, 0, 1, 0, 0, 0, 0, 0, 0]));

        let session = h.engine.session(&k).unwrap();
        assert_eq!(session.status, SessionStatus::Connected);
        assert_eq!(session.phase, Phase::Established);
        let target = session.target.unwrap();
        assert_eq!(target.host(), "example");
        assert_eq!(target.port(), 443);
        // second report falls inside the cooldown
        assert_eq!(h.sink.reports().len(), 1);
        assert_eq!(h.stats.snapshot().reports_suppressed, 1);
    }

    #[test]
    fn test_target_report_after_cooldown() {
        let h = harness(EngineConfig::default());
        let k = key(1);
        h.engine.ingest_fragment(&Fragment::to_proxy(k, AUTH));
        h.clock.advance(Duration::from_secs(61));
        h.engine.ingest_fragment(&Fragment::to_proxy(k, CONNECT));

        let reports = h.sink.reports();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].target.is_none());
        assert_eq!(reports[1].target, Some(crate::socks::TargetAddr::domain("example", 443)));
    }

    #[test]
    fn test_messages_in_one_window() {
        let h = harness(EngineConfig {
            report_cooldown_secs: 0,
            ..Default::default()
        });
        let mut payload = vec![5, 2, 0, 2];
        payload.extend_from_slice(AUTH);
        payload.extend_from_slice(CONNECT);
        h.engine.ingest_fragment(&Fragment::to_proxy(key(1), payload));

        let session = h.engine.session(&key(1)).unwrap();
        assert!(session.has_credentials());
        assert_eq!(session.phase, Phase::Requesting);
        assert_eq!(h.sink.reports().len(), 2);
    }

    #[test]
    fn test_split_auth_frame() {
        let h = harness(EngineConfig::default());
        h.engine
            .ingest_fragment(&Fragment::to_proxy(key(1), AUTH[..4].to_vec()));
        assert!(!h.engine.session(&key(1)).unwrap().has_credentials());

        h.engine
            .ingest_fragment(&Fragment::to_proxy(key(1), AUTH[4..].to_vec()));
        assert!(h.engine.session(&key(1)).unwrap().has_credentials());
    }

    #[test]
    fn test_connect_request_split_after_header() {
        let h = harness(EngineConfig::default());
        let k = key(1);
        h.engine.ingest_fragment(&Fragment::to_proxy(k, vec![5, 1, 2]));
        h.engine.ingest_fragment(&Fragment::to_proxy(k, AUTH));
        h.engine
            .ingest_fragment(&Fragment::to_proxy(k, CONNECT[..3].to_vec()));
        assert!(h.engine.session(&k).unwrap().target.is_none());
        assert_eq!(h.engine.buffered_len(&k), Some(3 + 3 + AUTH.len()));

        h.engine
            .ingest_fragment(&Fragment::to_proxy(k, CONNECT[3..].to_vec()));
        let session = h.engine.session(&k).unwrap();
        assert_eq!(
            session.target,
            Some(crate::socks::TargetAddr::domain("example", 443))
        );
        assert_eq!(session.phase, Phase::Requesting);
    }

    #[test]
    fn test_no_auth_offer_then_split_request() {
        let h = harness(EngineConfig::default());
        let k = key(1);
        h.engine.ingest_fragment(&Fragment::to_proxy(k, vec![5, 1, 0]));
        h.engine
            .ingest_fragment(&Fragment::to_proxy(k, CONNECT[..3].to_vec()));
        h.engine
            .ingest_fragment(&Fragment::to_proxy(k, CONNECT[3..].to_vec()));

        let target = h.engine.session(&k).unwrap().target.unwrap();
        assert_eq!(target.host(), "example");
    }

    #[test]
    fn test_repeated_request_head_never_yields_garbage_target() {
        let h = harness(EngineConfig::default());
        let k = key(1);
        h.engine.ingest_fragment(&Fragment::to_proxy(k, AUTH));
        h.engine
            .ingest_fragment(&Fragment::to_proxy(k, CONNECT[..7].to_vec()));
        h.engine
            .ingest_fragment(&Fragment::to_proxy(k, CONNECT[..7].to_vec()));
        h.engine
            .ingest_fragment(&Fragment::to_proxy(k, CONNECT[7..].to_vec()));

        assert!(h.engine.session(&k).unwrap().target.is_none());
        let reports = h.sink.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].target.is_none());
    }

    #[test]
    fn test_fallback_scan_finds_misaligned_frame() {
        let h = harness(EngineConfig::default());
        let mut payload = b"\xff\xfe".to_vec();
        payload.extend_from_slice(AUTH);
        h.engine.ingest_fragment(&Fragment::to_proxy(key(1), payload));

        let credentials = h.engine.session(&key(1)).unwrap().credentials.unwrap();
        assert_eq!(credentials.username, "bob");
    }

    #[test]
    fn test_fallback_scan_rejects_non_printable() {
        let h = harness(EngineConfig::default());
        let payload = b"\xff\x01\x03b\x00b\x03xyz".to_vec();
        h.engine.ingest_fragment(&Fragment::to_proxy(key(1), payload));

        assert!(!h.engine.session(&key(1)).unwrap().has_credentials());
        assert_eq!(h.engine.buffered_len(&key(1)), Some(10));
    }

    #[test]
    fn test_unclassified_window_is_retained() {
        let h = harness(EngineConfig::default());
        h.engine
            .ingest_fragment(&Fragment::to_proxy(key(1), b"\xff\x01\x03bo".to_vec()));
        assert!(!h.engine.session(&key(1)).unwrap().has_credentials());

        h.engine
            .ingest_fragment(&Fragment::to_proxy(key(1), b"b\x03xyz".to_vec()));
        assert!(h.engine.session(&key(1)).unwrap().has_credentials());
    }

    #[test]
    fn test_same_credentials_twice() {
        let h = harness(EngineConfig {
            report_cooldown_secs: 0,
            ..Default::default()
        });
        h.engine.ingest_fragment(&Fragment::to_proxy(key(1), AUTH));
        let first = h.engine.session(&key(1)).unwrap();
        h.clock.advance(Duration::from_secs(1));
        h.engine.ingest_fragment(&Fragment::to_proxy(key(1), AUTH));
        let second = h.engine.session(&key(1)).unwrap();

        assert_eq!(first.credentials, second.credentials);
        assert_eq!(first.authenticated_at, second.authenticated_at);
        assert_eq!(h.sink.reports().len(), 1);
        assert_eq!(h.stats.snapshot().credentials_recovered, 1);
    }

    #[test]
    fn test_buffer_capacity() {
        let h = harness(EngineConfig {
            buffer_capacity: 16,
            ..Default::default()
        });
        h.engine
            .ingest_fragment(&Fragment::to_proxy(key(1), vec![0xAA; 10]));
        h.engine
            .ingest_fragment(&Fragment::to_proxy(key(1), vec![0xBB; 10]));
        assert_eq!(h.engine.buffered_len(&key(1)), Some(16));
    }

    #[test]
    fn test_tunnel_data_not_buffered() {
        let h = harness(EngineConfig::default());
        h.engine.ingest_fragment(&Fragment::to_proxy(key(1), CONNECT));
        let before = h.engine.buffered_len(&key(1)).unwrap();
        h.engine
            .ingest_fragment(&Fragment::to_proxy(key(1), b"GET / HTTP/1.1\r\n".to_vec()));
        assert_eq!(h.engine.buffered_len(&key(1)), Some(before));
    }

    #[test]
    fn test_failed_reply() {
        let h = harness(EngineConfig::default());
        h.engine
            .ingest_fragment(&Fragment::from_proxy(key(1), vec![5, 5, 0, 1, 0, 0, 0, 0, 0, 0]));
        let session = h.engine.session(&key(1)).unwrap();
        assert_eq!(session.status, SessionStatus::Failed(5));
        assert_eq!(h.engine.buffered_len(&key(1)), Some(0));
    }

    #[test]
    fn test_reap_removes_stale_sessions() {
        let h = harness(EngineConfig::default());
        h.engine.ingest_fragment(&Fragment::to_proxy(key(1), vec![5, 1, 0]));
        h.clock.advance(Duration::from_secs(200));
        h.engine.ingest_fragment(&Fragment::to_proxy(key(2), AUTH));
        h.clock.advance(Duration::from_secs(101));

        assert_eq!(h.engine.reap(), 1);
        assert!(h.engine.session(&key(1)).is_none());
        assert!(h.engine.session(&key(2)).is_some());
        assert_eq!(h.stats.snapshot().active_sessions, 1);
        assert_eq!(h.stats.snapshot().sessions_reaped, 1);
    }
}

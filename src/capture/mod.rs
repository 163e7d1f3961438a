//! Capture layer
//!
//! Runs inline on every observed frame: classifies it, extracts credentials
//! from username/password frames into fixed [`AuthEvent`] records, and
//! forwards candidate payloads to the reconstruction engine. Nothing in this
//! layer blocks; full channels drop.

pub mod cache;
pub mod channel;
pub mod classifier;
pub mod event;
pub mod extractor;
#[cfg(target_os = "linux")]
pub mod socket;

pub use cache::{CaptureCache, DEFAULT_CACHE_CAPACITY};
pub use channel::{event_channel, lossy_channel, EventReceiver, EventSender, FragmentSender};
pub use classifier::{
    classify, Classification, FrameReader, PortSet, TcpPayload, DEFAULT_PROXY_PORTS,
};
pub use event::{AuthEvent, EventRecord, AUTH_EVENT_SIZE};
pub use extractor::{extract_credentials, extract_event, AuthFrame};
#[cfg(target_os = "linux")]
pub use socket::{FrameMeta, RawSocket};

use crate::clock::monotonic_nanos;
use crate::config::CaptureConfig;
use crate::error::SockswatchError;
use crate::flow::{Direction, Fragment};
use crate::socks::SOCKS5_AUTH_VERSION;
use crate::stats::MonitorStats;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Inline frame processor feeding the event and fragment channels
pub struct Capture {
    ports: PortSet,
    pid: u32,
    origin: Instant,
    events: EventSender,
    fragments: FragmentSender,
    cache: CaptureCache,
    stats: Arc<MonitorStats>,
}

impl Capture {
    /// Create a capture processor
    pub fn new(
        config: &CaptureConfig,
        events: EventSender,
        fragments: FragmentSender,
        stats: Arc<MonitorStats>,
    ) -> Self {
        Capture {
            ports: config.port_set(),
            pid: config.pid,
            origin: Instant::now(),
            events,
            fragments,
            cache: CaptureCache::new(config.cache_capacity),
            stats,
        }
    }

    /// Classify one frame and forward whatever it yields
    pub fn process_frame(&mut self, frame: &[u8]) {
        MonitorStats::incr(&self.stats.frames_seen);

        let payload = match classify(frame, &self.ports) {
            Classification::Matching(payload) => payload,
            Classification::Malformed(err) => {
                MonitorStats::incr(&self.stats.frames_malformed);
                trace!("Dropping malformed frame: {}", err);
                return;
            }
            _ => return,
        };
        MonitorStats::incr(&self.stats.payloads_matched);

        if payload.direction == Direction::ClientToProxy
            && payload.payload.first() == Some(&SOCKS5_AUTH_VERSION)
        {
            self.extract(&payload);
        }

        let fragment = Fragment {
            key: payload.connection_key(),
            direction: payload.direction,
            payload: Bytes::copy_from_slice(payload.payload),
        };
        if !self.fragments.send_lossy(fragment) {
            MonitorStats::incr(&self.stats.fragments_dropped);
        }
    }

    fn extract(&mut self, payload: &TcpPayload<'_>) {
        let event = match extract_event(payload, self.pid, monotonic_nanos(self.origin)) {
            Ok(event) => event,
            Err(e) => {
                trace!("Credential extraction abandoned: {}", e);
                return;
            }
        };
        debug!(
            "Captured credentials on {}",
            payload.connection_key()
        );
        MonitorStats::incr(&self.stats.events_emitted);
        if !self.events.emit(&event) {
            MonitorStats::incr(&self.stats.events_dropped);
        }
        if !self.cache.upsert(&event) {
            let rejected = self.stats.cache_rejected.fetch_add(1, Ordering::Relaxed) + 1;
            if rejected.is_power_of_two() {
                warn!(
                    "Capture cache full at {} keys, {} new keys refused so far",
                    self.cache.len(),
                    rejected
                );
            }
        }
        self.stats
            .cache_entries
            .store(self.cache.len(), Ordering::Relaxed);
    }

    /// Capture-side session cache
    pub fn cache(&self) -> &CaptureCache {
        &self.cache
    }

    /// Read frames from a raw socket until `stop` is set
    #[cfg(target_os = "linux")]
    pub fn run_blocking(
        mut self,
        mut socket: RawSocket,
        stop: Arc<AtomicBool>,
    ) -> Result<(), SockswatchError> {
        let mut buf = vec![0u8; socket::MAX_FRAME_LEN];
        while !stop.load(Ordering::Relaxed) {
            match socket.recv_frame(&mut buf)? {
                Some(frame) => self.process_frame(frame),
                None => continue,
            }
        }
        debug!("Capture loop stopped");
        Ok(())
    }
}

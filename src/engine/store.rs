//! Session store keyed by connection
//!
//! Not synchronised on its own; the engine guards it with one mutex shared
//! by fragment handling and the reaper.

use super::session::{Session, SessionEntry};
use crate::flow::ConnectionKey;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Map of live sessions and their buffers
#[derive(Debug)]
pub struct SessionStore {
    entries: HashMap<ConnectionKey, SessionEntry>,
    buffer_capacity: usize,
}

impl SessionStore {
    /// Create an empty store whose buffers hold `buffer_capacity` bytes
    pub fn new(buffer_capacity: usize) -> Self {
        SessionStore {
            entries: HashMap::new(),
            buffer_capacity,
        }
    }

    /// Look up the entry for `key`, creating it on first sight
    pub fn get_or_create(&mut self, key: ConnectionKey, now: Instant) -> &mut SessionEntry {
        let capacity = self.buffer_capacity;
        self.entries.entry(key).or_insert_with(|| {
            debug!("New session {}", key);
            SessionEntry::new(key, now, capacity)
        })
    }

    /// Session for `key`
    pub fn get(&self, key: &ConnectionKey) -> Option<&Session> {
        self.entries.get(key).map(|entry| &entry.session)
    }

    /// Entry for `key`, buffer included
    pub fn entry(&self, key: &ConnectionKey) -> Option<&SessionEntry> {
        self.entries.get(key)
    }

    /// Remove every session older than `retention`, returning how many went
    ///
    /// One pass over the map; each session leaves together with its buffer.
    pub fn remove_stale(&mut self, now: Instant, retention: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let stale = entry.session.is_stale(now, retention);
            if stale {
                debug!("Reaping session {}", key);
            }
            !stale
        });
        before - self.entries.len()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

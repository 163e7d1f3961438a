//! Bounded capture-side session cache
//!
//! Holds the latest [`AuthEvent`] per compact capture key. The cache has a
//! fixed entry limit: updates to known keys always succeed, inserts of new
//! keys fail once the limit is reached. Nothing is ever evicted from here;
//! the reconstruction engine owns session lifetime.

use super::event::AuthEvent;
use std::collections::HashMap;

/// Default entry limit
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Fixed-capacity map from capture key to last seen event
#[derive(Debug)]
pub struct CaptureCache {
    entries: HashMap<u64, AuthEvent>,
    capacity: usize,
}

impl CaptureCache {
    /// Create a cache holding at most `capacity` keys
    pub fn new(capacity: usize) -> Self {
        CaptureCache {
            entries: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert or replace the event stored under its session key
    ///
    /// Returns false if the key is new and the cache is full.
    pub fn upsert(&mut self, event: &AuthEvent) -> bool {
        let key = event.session_key();
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = *event;
            return true;
        }
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.insert(key, *event);
        true
    }

    /// Look up the event stored under a capture key
    pub fn get(&self, key: u64) -> Option<&AuthEvent> {
        self.entries.get(&key)
    }

    /// Number of cached keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CaptureCache {
    fn default() -> Self {
        CaptureCache::new(DEFAULT_CACHE_CAPACITY)
    }
}

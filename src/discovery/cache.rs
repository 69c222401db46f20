//! Discovery response cache.
//!
//! Config responses are kept until the next config change; any event from
//! the aggregate store clears the whole cache.
//!
//! A response computed before a clear must never outlive it. Handlers read
//! [`ResponseCache::generation`] before listing and insert through
//! [`ResponseCache::insert_if_current`], which drops the body if a clear ran
//! in between.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::observability::metrics;

#[derive(Debug)]
pub struct ResponseCache {
    enabled: bool,
    generation: AtomicU64,
    entries: DashMap<String, String>,
}

impl ResponseCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            generation: AtomicU64::new(0),
            entries: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Bumped by every [`ResponseCache::clear`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Insert `body` only if no clear happened since `generation` was read.
    ///
    /// The entry is written first and withdrawn if the generation moved, so a
    /// clear racing with the insert either wipes it or is seen here.
    pub fn insert_if_current(&self, key: String, body: String, generation: u64) -> bool {
        if !self.enabled || self.generation() != generation {
            return false;
        }
        self.entries.insert(key.clone(), body.clone());
        if self.generation() != generation {
            self.entries.remove_if(&key, |_, cached| *cached == body);
            return false;
        }
        metrics::record_cache_entries(self.entries.len());
        true
    }

    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
        metrics::record_cache_entries(0);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

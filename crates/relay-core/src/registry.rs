use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Time-limited record of dedup keys that have already started a run.
///
/// Entries expire after `ttl`. When the map reaches `capacity`, expired
/// entries are swept; fresh entries are never evicted, so a burst of distinct
/// keys inside one TTL window can grow the map past `capacity`.
#[derive(Debug)]
pub struct SessionRegistry {
    entries: HashMap<String, Instant>,
    ttl: Duration,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity,
        }
    }

    /// Record `key` unless an unexpired entry already exists.
    ///
    /// Returns `true` if the key was newly recorded (the caller may start a
    /// run) and `false` if it is a duplicate.
    pub fn check_and_record(&mut self, key: &str) -> bool {
        self.check_and_record_at(key, Instant::now())
    }

    pub fn check_and_record_at(&mut self, key: &str, now: Instant) -> bool {
        if self.contains_at(key, now) {
            return false;
        }
        self.touch_at(key, now);
        true
    }

    /// Whether `key` has an unexpired entry.
    pub fn contains(&self, key: &str) -> bool {
        self.contains_at(key, Instant::now())
    }

    pub fn contains_at(&self, key: &str, now: Instant) -> bool {
        self.entries
            .get(key)
            .is_some_and(|seen| now.saturating_duration_since(*seen) < self.ttl)
    }

    /// Record `key`, restarting its TTL if it is already present.
    pub fn touch(&mut self, key: &str) {
        self.touch_at(key, Instant::now());
    }

    pub fn touch_at(&mut self, key: &str, now: Instant) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            self.sweep(now);
        }
        self.entries.insert(key.to_string(), now);
    }

    /// Drop every entry older than the TTL. Returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, seen| now.saturating_duration_since(*seen) < ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = self.entries.len(), "swept session registry");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

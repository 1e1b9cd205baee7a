//! Short-term memory (spec §4.D): bounded LRU of `MemoryEntry`, capacity
//! `C` (default 1000), with an optional TTL pruner.

use crate::model::MemoryEntry;
use chrono::Utc;
use lru::LruCache;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ShortTermConfig {
    pub capacity: usize,
    pub ttl: Option<Duration>,
    /// When false, eviction on overflow picks the oldest-inserted entry
    /// rather than the least-recently-used one (spec §4.D). Insertion order
    /// is tracked independently of access, so a `get()` never reorders it;
    /// FIFO was chosen over a random victim so eviction stays deterministic
    /// under test.
    pub use_lru: bool,
}

impl Default for ShortTermConfig {
    fn default() -> Self {
        Self { capacity: 1000, ttl: None, use_lru: true }
    }
}

pub struct ShortTermMemory {
    entries: LruCache<String, MemoryEntry>,
    insertion_order: VecDeque<String>,
    config: ShortTermConfig,
}

impl ShortTermMemory {
    pub fn new(config: ShortTermConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1)).unwrap();
        Self { entries: LruCache::new(capacity), insertion_order: VecDeque::new(), config }
    }

    /// Returns the evicted entry's id, if any eviction was needed to make
    /// room.
    pub fn add(&mut self, entry: MemoryEntry) -> Option<String> {
        let id = entry.id.clone();
        let is_new = !self.entries.contains(&id);
        let evicted = if self.entries.len() >= self.entries.cap().get() && is_new {
            if self.config.use_lru {
                self.entries.pop_lru().map(|(id, _)| id)
            } else {
                self.pop_oldest_inserted()
            }
        } else {
            None
        };
        if let Some(evicted) = &evicted {
            self.insertion_order.retain(|id| id != evicted);
        }
        if is_new {
            self.insertion_order.push_back(id.clone());
        }
        self.entries.put(id, entry);
        evicted
    }

    fn pop_oldest_inserted(&mut self) -> Option<String> {
        while let Some(id) = self.insertion_order.pop_front() {
            if self.entries.pop(&id).is_some() {
                return Some(id);
            }
        }
        None
    }

    pub fn get(&mut self, id: &str) -> Option<&MemoryEntry> {
        let entry = self.entries.get_mut(id)?;
        entry.touch();
        Some(&*entry)
    }

    pub fn remove(&mut self, id: &str) -> Option<MemoryEntry> {
        self.insertion_order.retain(|i| i != id);
        self.entries.pop(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    /// Removes entries whose age exceeds the configured TTL. No-op when no
    /// TTL is configured.
    pub fn prune_expired(&mut self) -> Vec<String> {
        let Some(ttl) = self.config.ttl else { return Vec::new() };
        let now = Utc::now();
        let ttl_ms = ttl.as_millis() as i64;
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.age_ms(now) >= ttl_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.entries.pop(id);
        }
        let expired_set: std::collections::HashSet<&String> = expired.iter().collect();
        self.insertion_order.retain(|id| !expired_set.contains(id));
        expired
    }
}

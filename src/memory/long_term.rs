//! Long-term memory (spec §4.D): a persistent store over a pluggable
//! `StoragePort`, addressed by `namespace:item:id`, with a word-level
//! inverted index and a metadata-value index rebuilt on load.

use crate::error::CoreResult;
use crate::model::MemoryEntry;
use crate::ports::StoragePort;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct LongTermMemory {
    namespace: String,
    storage: Arc<dyn StoragePort>,
    entries: HashMap<String, MemoryEntry>,
    /// word (len > 2, lowercased) -> entry ids containing it.
    word_index: HashMap<String, HashSet<String>>,
    /// "key=value" (value JSON-encoded) -> entry ids.
    metadata_index: HashMap<String, HashSet<String>>,
}

fn item_key(namespace: &str, id: &str) -> String {
    format!("{namespace}:item:{id}")
}

fn index_words(content: &str) -> HashSet<String> {
    content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_lowercase())
        .collect()
}

fn metadata_keys(entry: &MemoryEntry) -> Vec<String> {
    entry
        .metadata
        .iter()
        .map(|(k, v)| format!("{k}={}", v))
        .collect()
}

impl LongTermMemory {
    pub fn new(namespace: impl Into<String>, storage: Arc<dyn StoragePort>) -> Self {
        Self {
            namespace: namespace.into(),
            storage,
            entries: HashMap::new(),
            word_index: HashMap::new(),
            metadata_index: HashMap::new(),
        }
    }

    /// Loads every item under this namespace from storage and rebuilds both
    /// indices (spec §4.D: "rebuilt on load").
    pub async fn load(&mut self) -> CoreResult<()> {
        self.entries.clear();
        self.word_index.clear();
        self.metadata_index.clear();

        let prefix = format!("{}:item:", self.namespace);
        for key in self.storage.keys().await? {
            if !key.starts_with(&prefix) {
                continue;
            }
            if let Some(value) = self.storage.load(&key).await? {
                if let Ok(entry) = serde_json::from_value::<MemoryEntry>(value) {
                    self.index_entry(&entry);
                    self.entries.insert(entry.id.clone(), entry);
                }
            }
        }
        Ok(())
    }

    fn index_entry(&mut self, entry: &MemoryEntry) {
        for word in index_words(&entry.content) {
            self.word_index.entry(word).or_default().insert(entry.id.clone());
        }
        for key in metadata_keys(entry) {
            self.metadata_index.entry(key).or_default().insert(entry.id.clone());
        }
    }

    fn unindex_entry(&mut self, entry: &MemoryEntry) {
        for word in index_words(&entry.content) {
            if let Some(set) = self.word_index.get_mut(&word) {
                set.remove(&entry.id);
            }
        }
        for key in metadata_keys(entry) {
            if let Some(set) = self.metadata_index.get_mut(&key) {
                set.remove(&entry.id);
            }
        }
    }

    pub async fn add(&mut self, entry: MemoryEntry) -> CoreResult<()> {
        let key = item_key(&self.namespace, &entry.id);
        let value = serde_json::to_value(&entry)
            .map_err(|e| crate::error::CoreError::validation(format!("failed to serialize memory entry: {e}")))?;
        self.storage.save(&key, value).await?;
        self.index_entry(&entry);
        self.entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    pub async fn delete(&mut self, id: &str) -> CoreResult<bool> {
        if let Some(entry) = self.entries.remove(id) {
            self.unindex_entry(&entry);
        }
        let key = item_key(&self.namespace, id);
        self.storage.delete(&key).await
    }

    pub fn get(&mut self, id: &str) -> Option<&MemoryEntry> {
        let entry = self.entries.get_mut(id)?;
        entry.touch();
        Some(&*entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.values()
    }

    /// Removes items whose `createdAt < now - archiveAgeMs` (spec §4.D
    /// "archiveOldMemories"). Returns the ids removed.
    pub async fn archive_old_memories(&mut self, archive_age_ms: i64) -> CoreResult<Vec<String>> {
        let now = Utc::now();
        let stale: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.age_ms(now) >= archive_age_ms)
            .map(|e| e.id.clone())
            .collect();
        for id in &stale {
            self.delete(id).await?;
        }
        Ok(stale)
    }

    /// Relevance score for one entry, given an optional query: `0.7 *
    /// query-word-recall + 0.3 * recency` when a query is supplied, else
    /// pure recency (spec §4.D).
    pub fn relevance_score(&self, entry: &MemoryEntry, query: Option<&str>, archive_age_ms: i64, now: DateTime<Utc>) -> f64 {
        let recency = (1.0 - entry.age_ms(now) as f64 / archive_age_ms.max(1) as f64).max(0.0);
        match query {
            None => recency,
            Some(q) => {
                let query_words = index_words(q);
                if query_words.is_empty() {
                    return recency;
                }
                let entry_words = index_words(&entry.content);
                let matched = query_words.iter().filter(|w| entry_words.contains(*w)).count();
                let recall = matched as f64 / query_words.len() as f64;
                0.7 * recall + 0.3 * recency
            }
        }
    }

    /// Clears every entry under this namespace from both the local indices
    /// and the backing storage port (spec §6 storage port `clear()`).
    pub async fn clear(&mut self) -> CoreResult<()> {
        let prefix = format!("{}:item:", self.namespace);
        for key in self.storage.keys().await? {
            if key.starts_with(&prefix) {
                self.storage.delete(&key).await?;
            }
        }
        self.entries.clear();
        self.word_index.clear();
        self.metadata_index.clear();
        Ok(())
    }

    /// Candidate ids matching any query word, via the inverted index. Falls
    /// back to every entry when the query has no indexable words.
    pub fn candidates_for_query(&self, query: &str) -> HashSet<String> {
        let words = index_words(query);
        if words.is_empty() {
            return self.entries.keys().cloned().collect();
        }
        let mut out = HashSet::new();
        for word in words {
            if let Some(ids) = self.word_index.get(&word) {
                out.extend(ids.iter().cloned());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryKind;
    use crate::ports::InMemoryStorage;

    fn storage() -> Arc<dyn StoragePort> {
        Arc::new(InMemoryStorage::new())
    }

    #[tokio::test]
    async fn add_then_load_rebuilds_indices() {
        let storage = storage();
        let mut mem = LongTermMemory::new("crew1", storage.clone());
        let entry = MemoryEntry::new("the quick brown fox", MemoryKind::Fact);
        let id = entry.id.clone();
        mem.add(entry).await.unwrap();

        let mut reloaded = LongTermMemory::new("crew1", storage);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.candidates_for_query("brown").contains(&id));
    }

    #[tokio::test]
    async fn archive_old_memories_removes_stale_entries() {
        let mut mem = LongTermMemory::new("crew1", storage());
        let entry = MemoryEntry::new("old fact", MemoryKind::Fact);
        let id = entry.id.clone();
        mem.add(entry).await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let archived = mem.archive_old_memories(1).await.unwrap();
        assert_eq!(archived, vec![id]);
        assert_eq!(mem.len(), 0);
    }

    #[tokio::test]
    async fn relevance_score_with_query_weighs_recall_and_recency() {
        let mut mem = LongTermMemory::new("crew1", storage());
        let entry = MemoryEntry::new("rust programming language", MemoryKind::Fact);
        mem.add(entry.clone()).await.unwrap();
        let now = Utc::now();
        let score = mem.relevance_score(&entry, Some("rust language"), 1_000_000, now);
        assert!(score > 0.6);
        let no_query_score = mem.relevance_score(&entry, None, 1_000_000, now);
        assert!(no_query_score > 0.9);
    }
}

//! `MemoryManager`: aggregates short-term, long-term, and entity memories,
//! triggers pruning, and emits the memory event stream (spec §4.D).

use super::entity_memory::EntityMemory;
use super::events::{MemoryEvent, MemoryEventBus};
use super::long_term::LongTermMemory;
use super::pruning::{select_for_pruning, PruneStrategy};
use super::short_term::{ShortTermConfig, ShortTermMemory};
use crate::error::CoreResult;
use crate::model::{Entity, MemoryEntry};
use crate::ports::StoragePort;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct MemoryManagerConfig {
    pub short_term: ShortTermConfig,
    pub archive_age_ms: i64,
    pub prune_strategy: PruneStrategy,
    /// Pruning triggers once short-term entry count reaches this threshold.
    pub prune_threshold: usize,
    pub prune_ratio: f64,
    pub track_entity_sources: bool,
}

impl Default for MemoryManagerConfig {
    fn default() -> Self {
        Self {
            short_term: ShortTermConfig::default(),
            archive_age_ms: 7 * 24 * 60 * 60 * 1000,
            prune_strategy: PruneStrategy::Lru,
            prune_threshold: 1000,
            prune_ratio: 0.2,
            track_entity_sources: false,
        }
    }
}

/// Which memory kind(s) `MemoryManager::reset` clears (spec §4.I
/// `resetMemory(kind)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryCategory {
    ShortTerm,
    LongTerm,
    Entity,
    All,
}

pub struct MemoryManager {
    short_term: ShortTermMemory,
    long_term: LongTermMemory,
    entity: EntityMemory,
    events: MemoryEventBus,
    config: MemoryManagerConfig,
}

impl MemoryManager {
    pub fn new(namespace: impl Into<String>, storage: Arc<dyn StoragePort>, config: MemoryManagerConfig) -> Self {
        Self {
            short_term: ShortTermMemory::new(config.short_term.clone()),
            long_term: LongTermMemory::new(namespace, storage),
            entity: EntityMemory::new(config.track_entity_sources),
            events: MemoryEventBus::new(),
            config,
        }
    }

    pub async fn load(&mut self) -> CoreResult<()> {
        self.long_term.load().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemoryEvent> {
        self.events.subscribe()
    }

    pub fn add_short_term(&mut self, entry: MemoryEntry) {
        let id = entry.id.clone();
        let kind = format!("{:?}", entry.kind);
        self.short_term.add(entry);
        self.events.publish(MemoryEvent::MemoryAdded { id, kind });
        self.maybe_prune_short_term();
    }

    pub fn get_short_term(&mut self, id: &str) -> Option<&MemoryEntry> {
        self.short_term.get(id)
    }

    pub fn short_term_entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.short_term.iter()
    }

    fn maybe_prune_short_term(&mut self) {
        if self.short_term.len() < self.config.prune_threshold {
            return;
        }
        let entries: Vec<&MemoryEntry> = self.short_term.iter().collect();
        let victims = select_for_pruning(&entries, self.config.prune_strategy, self.config.prune_ratio);
        let count = victims.len();
        for id in victims {
            self.short_term.remove(&id);
        }
        if count > 0 {
            self.events.publish(MemoryEvent::MemoriesPruned { count, strategy: self.config.prune_strategy });
        }
    }

    pub async fn add_long_term(&mut self, entry: MemoryEntry) -> CoreResult<()> {
        let id = entry.id.clone();
        let kind = format!("{:?}", entry.kind);
        self.long_term.add(entry).await?;
        self.events.publish(MemoryEvent::MemoryAdded { id, kind });
        Ok(())
    }

    pub async fn delete_long_term(&mut self, id: &str) -> CoreResult<bool> {
        let removed = self.long_term.delete(id).await?;
        if removed {
            self.events.publish(MemoryEvent::MemoryDeleted { id: id.to_string() });
        }
        Ok(removed)
    }

    pub async fn archive_old_memories(&mut self) -> CoreResult<Vec<String>> {
        self.long_term.archive_old_memories(self.config.archive_age_ms).await
    }

    /// Ranks long-term memories for `query` by relevance score, highest
    /// first, returning at most `limit` entries.
    pub fn search_long_term(&self, query: Option<&str>, limit: usize) -> Vec<&MemoryEntry> {
        let now = chrono::Utc::now();
        let candidate_ids = match query {
            Some(q) => self.long_term.candidates_for_query(q),
            None => self.long_term.iter().map(|e| e.id.clone()).collect(),
        };
        let mut scored: Vec<(&MemoryEntry, f64)> = self
            .long_term
            .iter()
            .filter(|e| candidate_ids.contains(&e.id))
            .map(|e| {
                let score = self.long_term.relevance_score(e, query, self.config.archive_age_ms, now);
                (e, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(limit).map(|(e, _)| e).collect()
    }

    pub fn add_or_update_entity(
        &mut self,
        name: &str,
        entity_type: &str,
        attrs: HashMap<String, serde_json::Value>,
    ) -> &Entity {
        let id = self.entity.add_or_update(name, entity_type, attrs).id.clone();
        self.events.publish(MemoryEvent::MemoryAdded { id: id.clone(), kind: "entity".to_string() });
        self.entity.get_by_id(&id).unwrap()
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.entity.get_by_name(name)
    }

    pub fn entities_by_type(&self, entity_type: &str) -> Vec<&Entity> {
        self.entity.by_type(entity_type)
    }

    pub fn add_entity_relationship(&mut self, entity_id: &str, relation: &str, target_id: &str, confidence: f32) -> bool {
        self.entity.add_relationship(entity_id, relation, target_id, confidence)
    }

    /// Clears the selected memory kind(s) (spec §4.I `resetMemory(kind)`).
    pub async fn reset(&mut self, category: MemoryCategory) -> CoreResult<()> {
        if matches!(category, MemoryCategory::ShortTerm | MemoryCategory::All) {
            self.short_term.clear();
        }
        if matches!(category, MemoryCategory::LongTerm | MemoryCategory::All) {
            self.long_term.clear().await?;
        }
        if matches!(category, MemoryCategory::Entity | MemoryCategory::All) {
            self.entity.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryKind;
    use crate::ports::InMemoryStorage;

    fn manager() -> MemoryManager {
        MemoryManager::new("crew1", Arc::new(InMemoryStorage::new()), MemoryManagerConfig::default())
    }

    #[test]
    fn short_term_add_and_get_round_trips() {
        let mut mgr = manager();
        let entry = MemoryEntry::new("hello", MemoryKind::Fact);
        let id = entry.id.clone();
        mgr.add_short_term(entry);
        assert!(mgr.get_short_term(&id).is_some());
    }

    #[test]
    fn short_term_prunes_when_threshold_reached() {
        let mut config = MemoryManagerConfig::default();
        config.short_term.capacity = 100;
        config.prune_threshold = 3;
        config.prune_ratio = 0.5;
        let mut mgr = MemoryManager::new("crew1", Arc::new(InMemoryStorage::new()), config);
        for i in 0..3 {
            mgr.add_short_term(MemoryEntry::new(format!("entry {i}"), MemoryKind::Fact));
        }
        assert!(mgr.short_term_entries().count() < 3);
    }

    #[tokio::test]
    async fn long_term_add_delete_round_trips() {
        let mut mgr = manager();
        let entry = MemoryEntry::new("the quick brown fox", MemoryKind::Fact);
        let id = entry.id.clone();
        mgr.add_long_term(entry).await.unwrap();
        assert_eq!(mgr.search_long_term(Some("brown fox"), 10).len(), 1);
        assert!(mgr.delete_long_term(&id).await.unwrap());
    }

    #[test]
    fn entity_upsert_is_queryable_by_type() {
        let mut mgr = manager();
        mgr.add_or_update_entity("Acme Corp", "organization", HashMap::new());
        assert_eq!(mgr.entities_by_type("organization").len(), 1);
    }

    #[tokio::test]
    async fn reset_short_term_leaves_long_term_and_entity_intact() {
        let mut mgr = manager();
        mgr.add_short_term(MemoryEntry::new("note", MemoryKind::Fact));
        mgr.add_long_term(MemoryEntry::new("durable fact", MemoryKind::Fact)).await.unwrap();
        mgr.add_or_update_entity("Acme Corp", "organization", HashMap::new());

        mgr.reset(MemoryCategory::ShortTerm).await.unwrap();

        assert_eq!(mgr.short_term_entries().count(), 0);
        assert_eq!(mgr.search_long_term(None, 10).len(), 1);
        assert_eq!(mgr.entities_by_type("organization").len(), 1);
    }

    #[tokio::test]
    async fn reset_all_clears_every_kind() {
        let mut mgr = manager();
        mgr.add_short_term(MemoryEntry::new("note", MemoryKind::Fact));
        mgr.add_long_term(MemoryEntry::new("durable fact", MemoryKind::Fact)).await.unwrap();
        mgr.add_or_update_entity("Acme Corp", "organization", HashMap::new());

        mgr.reset(MemoryCategory::All).await.unwrap();

        assert_eq!(mgr.short_term_entries().count(), 0);
        assert_eq!(mgr.search_long_term(None, 10).len(), 0);
        assert_eq!(mgr.entities_by_type("organization").len(), 0);
    }
}

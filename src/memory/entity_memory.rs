//! Entity memory (spec §4.D): keyed by normalized name and by type, with a
//! directed relationship multigraph.

use crate::model::entity::normalize_name;
use crate::model::Entity;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct EntityMemory {
    entities: HashMap<String, Entity>,
    by_name: HashMap<String, String>,
    by_type: HashMap<String, Vec<String>>,
    /// When enabled, every `addOrUpdate` appends a unique source id to the
    /// entity's `sources` (spec §4.D).
    track_sources: bool,
}

impl EntityMemory {
    pub fn new(track_sources: bool) -> Self {
        Self { track_sources, ..Default::default() }
    }

    pub fn add_or_update(
        &mut self,
        name: &str,
        entity_type: &str,
        attrs: HashMap<String, serde_json::Value>,
    ) -> &Entity {
        let normalized = normalize_name(name);

        let id = if let Some(existing_id) = self.by_name.get(&normalized) {
            let entity = self.entities.get_mut(existing_id).unwrap();
            entity.attributes.extend(attrs);
            entity.updated_at = chrono::Utc::now();
            entity.last_accessed_at = chrono::Utc::now();
            if self.track_sources {
                entity.sources.push(Uuid::new_v4().to_string());
            }
            existing_id.clone()
        } else {
            let id = Uuid::new_v4().to_string();
            let mut entity = Entity::new(id.clone(), name, entity_type);
            entity.attributes = attrs;
            if self.track_sources {
                entity.sources.push(Uuid::new_v4().to_string());
            }
            self.entities.insert(id.clone(), entity);
            self.by_name.insert(normalized, id.clone());
            self.by_type.entry(entity_type.to_string()).or_default().push(id.clone());
            id
        };

        self.entities.get(&id).unwrap()
    }

    pub fn add_relationship(&mut self, entity_id: &str, relation: &str, target_id: &str, confidence: f32) -> bool {
        match self.entities.get_mut(entity_id) {
            Some(entity) => {
                entity.add_relationship(relation, target_id, confidence);
                true
            }
            None => false,
        }
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Entity> {
        let normalized = normalize_name(name);
        self.by_name.get(&normalized).and_then(|id| self.entities.get(id))
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn by_type(&self, entity_type: &str) -> Vec<&Entity> {
        self.by_type
            .get(entity_type)
            .map(|ids| ids.iter().filter_map(|id| self.entities.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        let entity = self.entities.remove(id)?;
        self.by_name.remove(&normalize_name(&entity.name));
        if let Some(ids) = self.by_type.get_mut(&entity.entity_type) {
            ids.retain(|x| x != id);
        }
        Some(entity)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.by_name.clear();
        self.by_type.clear();
    }
}

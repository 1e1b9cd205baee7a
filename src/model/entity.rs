//! Entity and its relationship graph (spec §3 "Entity").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub relation: String,
    pub entity_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            attributes: HashMap::new(),
            relationships: Vec::new(),
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            sources: Vec::new(),
        }
    }

    pub fn add_relationship(&mut self, relation: impl Into<String>, entity_id: impl Into<String>, confidence: f32) {
        self.relationships.push(Relationship {
            relation: relation.into(),
            entity_id: entity_id.into(),
            metadata: HashMap::new(),
            confidence: confidence.clamp(0.0, 1.0),
        });
        self.updated_at = Utc::now();
    }
}

/// Normalize a name for the entity index: lower-case, trimmed (spec §3).
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace_and_case() {
        assert_eq!(normalize_name("  Alice Smith  "), "alice smith");
    }

    #[test]
    fn relationship_confidence_is_clamped() {
        let mut e = Entity::new("e1", "Alice", "person");
        e.add_relationship("knows", "e2", 3.0);
        assert_eq!(e.relationships[0].confidence, 1.0);
    }
}

//! KnowledgeChunk — content, metadata and embedding stored by the vector
//! store (spec §3 "KnowledgeChunk").

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub embedding: Option<Vec<f32>>,
}

impl KnowledgeChunk {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let id = deterministic_id(&content);
        Self {
            id,
            content,
            metadata: HashMap::new(),
            embedding: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Deterministic content hash used as an id when none is supplied.
pub fn deterministic_id(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest[..16])
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_id_is_stable_for_same_content() {
        let a = deterministic_id("hello world");
        let b = deterministic_id("hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn deterministic_id_differs_for_different_content() {
        assert_ne!(deterministic_id("a"), deterministic_id("b"));
    }
}

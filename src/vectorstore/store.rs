//! Core `VectorStore`: id→chunk+embedding map, cosine search, cache wiring.

use super::cache::QueryCache;
use super::filter::matches_filter;
use crate::error::CoreResult;
use crate::model::KnowledgeChunk;
use crate::ports::EmbedderPort;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub context: String,
    pub metadata: HashMap<String, Value>,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub cache_max_size: usize,
    pub cache_ttl: Duration,
    pub default_threshold: f32,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self { cache_max_size: 100, cache_ttl: Duration::from_secs(3600), default_threshold: 0.35 }
    }
}

pub struct VectorStore {
    collection: String,
    chunks: Mutex<HashMap<String, KnowledgeChunk>>,
    cache: Mutex<QueryCache>,
    embedder: Arc<dyn EmbedderPort>,
    config: VectorStoreConfig,
}

impl VectorStore {
    pub fn new(collection: impl Into<String>, embedder: Arc<dyn EmbedderPort>, config: VectorStoreConfig) -> Self {
        let cache = QueryCache::new(config.cache_max_size, config.cache_ttl);
        Self {
            collection: super::sanitize_collection_name(&collection.into()),
            chunks: Mutex::new(HashMap::new()),
            cache: Mutex::new(cache),
            embedder,
            config,
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Computes an embedding via the embedder port if absent, and a
    /// deterministic content hash id if absent. Duplicates by id overwrite.
    pub async fn add(&self, mut chunk: KnowledgeChunk) -> CoreResult<String> {
        if chunk.embedding.is_none() {
            chunk.embedding = Some(self.embedder.embed(&chunk.content).await?);
        }
        let id = chunk.id.clone();
        self.chunks.lock().await.insert(id.clone(), chunk);
        self.cache.lock().await.invalidate_all();
        Ok(id)
    }

    pub async fn add_batch(&self, chunks: Vec<KnowledgeChunk>) -> CoreResult<Vec<String>> {
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            ids.push(self.add(chunk).await?);
        }
        Ok(ids)
    }

    pub async fn get(&self, ids: &[String]) -> Vec<KnowledgeChunk> {
        let chunks = self.chunks.lock().await;
        ids.iter().filter_map(|id| chunks.get(id).cloned()).collect()
    }

    pub async fn delete(&self, ids: &[String]) -> usize {
        let mut chunks = self.chunks.lock().await;
        let removed = ids.iter().filter(|id| chunks.remove(*id).is_some()).count();
        drop(chunks);
        self.cache.lock().await.invalidate_all();
        removed
    }

    pub async fn reset(&self) {
        self.chunks.lock().await.clear();
        self.cache.lock().await.invalidate_all();
    }

    pub async fn len(&self) -> usize {
        self.chunks.lock().await.len()
    }

    /// Runs the search algorithm of spec §4.C, serving from the query cache
    /// when the normalized inputs match a live entry.
    pub async fn search(
        &self,
        queries: &[String],
        k: i64,
        filter: Option<Value>,
        threshold: Option<f32>,
    ) -> CoreResult<Vec<SearchResult>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let threshold = threshold.unwrap_or(self.config.default_threshold);
        let cache_key = QueryCache::build_key(queries, k, filter.as_ref(), threshold);

        if let Some(cached) = self.cache.lock().await.get(&cache_key) {
            return Ok(cached);
        }

        let mut query_embeddings = Vec::with_capacity(queries.len());
        for q in queries {
            query_embeddings.push(self.embedder.embed(q).await?);
        }

        let chunks = self.chunks.lock().await;
        let mut scored: Vec<SearchResult> = Vec::new();
        for chunk in chunks.values() {
            if let Some(filter) = &filter {
                if !matches_filter(&chunk.metadata, filter) {
                    continue;
                }
            }
            let Some(embedding) = &chunk.embedding else { continue };
            let mut best = 0.0f32;
            for query_embedding in &query_embeddings {
                let score = cosine_similarity(embedding, query_embedding);
                if score > best {
                    best = score;
                }
            }
            if best >= threshold {
                scored.push(SearchResult {
                    id: chunk.id.clone(),
                    context: chunk.content.clone(),
                    metadata: chunk.metadata.clone(),
                    score: best,
                });
            }
        }
        drop(chunks);

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if k > 0 {
            scored.truncate(k as usize);
        }

        self.cache.lock().await.put(cache_key, scored.clone());
        Ok(scored)
    }
}

/// Cosine similarity; dimension mismatches warn and return 0 rather than
/// raising (spec §4.C). Dot product and magnitudes iterate in blocks of 4
/// ("unrolled") matching the teacher's numeric style.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        tracing::warn!(a_dim = a.len(), b_dim = b.len(), "cosine_similarity: dimension mismatch");
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    let chunks = a.len() / 4;
    for i in 0..chunks {
        let base = i * 4;
        for offset in 0..4 {
            let x = a[base + offset];
            let y = b[base + offset];
            dot += x * y;
            mag_a += x * x;
            mag_b += y * y;
        }
    }
    for i in (chunks * 4)..a.len() {
        let x = a[i];
        let y = b[i];
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

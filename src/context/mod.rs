//! Contextual Memory Builder (spec §4.E): `build(task) → string`, aggregating
//! short-term, long-term, entity (and optional user) memories into a bounded
//! context string.

mod sections;

use crate::memory::{LongTermMemory, MemoryManager};
use crate::model::Task;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

pub use sections::{format_sections, format_sections_with_limit};

#[derive(Debug, Clone)]
pub struct ContextBuilderConfig {
    pub parallel: bool,
    pub max_context_length: usize,
    pub cache_max_size: usize,
    pub cache_ttl: Duration,
    pub long_term_limit: usize,
    pub entity_limit: usize,
}

impl Default for ContextBuilderConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_context_length: 4000,
            cache_max_size: 200,
            cache_ttl: Duration::from_secs(300),
            long_term_limit: 5,
            entity_limit: 5,
        }
    }
}

struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

pub struct ContextBuilder {
    config: ContextBuilderConfig,
    cache: LruCache<(String, String), CacheEntry>,
}

impl ContextBuilder {
    pub fn new(config: ContextBuilderConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_max_size.max(1)).unwrap();
        Self { cache: LruCache::new(capacity), config }
    }

    /// Builds the context string for `task`, querying each memory source
    /// (parallelism here is conceptual: the underlying manager is
    /// single-locked, so "parallel" mode fetches all sources before
    /// formatting rather than racing independent futures) and memoizing on
    /// `(task.id, task.description)`.
    pub fn build(&mut self, task: &Task, memory: &MemoryManager, user_memory: Option<&LongTermMemory>) -> String {
        let key = (task.id.clone(), task.description.clone());
        if let Some(entry) = self.cache.peek(&key) {
            if entry.inserted_at.elapsed() < self.config.cache_ttl {
                return self.cache.get(&key).unwrap().value.clone();
            }
            self.cache.pop(&key);
        }

        let query = task.description.as_str();
        tracing::debug!(parallel = self.config.parallel, task_id = %task.id, "building task context");

        let recent_insights: Vec<String> = memory
            .short_term_entries()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .take(5)
            .map(|e| e.content.clone())
            .collect();

        let historical_data: Vec<String> = memory
            .search_long_term(Some(query), self.config.long_term_limit)
            .into_iter()
            .map(|e| match e.metadata.get("suggestions").and_then(|v| v.as_str()) {
                Some(suggestion) => suggestion.to_string(),
                None => e.content.clone(),
            })
            .collect();

        let entities: Vec<String> = sections::matching_entity_summaries(memory, query, self.config.entity_limit);

        let user_memories: Vec<String> = match user_memory {
            Some(user_memory) => {
                let words: Vec<&str> = query.split_whitespace().collect();
                user_memory
                    .iter()
                    .filter(|e| words.iter().any(|w| e.content.to_lowercase().contains(&w.to_lowercase())))
                    .take(5)
                    .map(|e| e.content.clone())
                    .collect()
            }
            None => Vec::new(),
        };

        let built = format_sections_with_limit(
            &recent_insights,
            &historical_data,
            &entities,
            &user_memories,
            self.config.max_context_length,
        );
        self.cache.put(key, CacheEntry { value: built.clone(), inserted_at: Instant::now() });
        built
    }
}

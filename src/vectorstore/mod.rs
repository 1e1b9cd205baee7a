//! Vector Store (spec §4.C): an in-memory id→chunk+embedding map with
//! cosine search, an LRU query-result cache, and a metadata filter language.
//!
//! Grounded on the teacher's `memory/vector.rs` (`VectorMemory`), generalized
//! from a single fixed-purpose store into one reusable by the memory manager
//! for all three memory kinds.

mod cache;
mod filter;
mod store;

pub use cache::QueryCache;
pub use filter::matches_filter;
pub use store::{cosine_similarity, SearchResult, VectorStore, VectorStoreConfig};

/// Sanitizes a collection name to `[a-z0-9_-]`, lower-case; other characters
/// collapse to `_` (spec §4.C).
pub fn sanitize_collection_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

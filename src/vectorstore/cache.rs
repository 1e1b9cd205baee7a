//! Query-result LRU with a TTL, keyed on the normalized search inputs
//! (spec §4.C "Cache").

use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use super::store::SearchResult;

struct Entry {
    results: Vec<SearchResult>,
    inserted_at: Instant,
}

pub struct QueryCache {
    inner: LruCache<String, Entry>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_size.max(1)).unwrap();
        Self { inner: LruCache::new(capacity), ttl }
    }

    /// Builds the cache key: queries lowercased/trimmed/sorted/joined with
    /// `|`; limit; filter with recursively sorted keys JSON-encoded;
    /// threshold.
    pub fn build_key(queries: &[String], limit: i64, filter: Option<&Value>, threshold: f32) -> String {
        let mut normalized: Vec<String> = queries.iter().map(|q| q.trim().to_lowercase()).collect();
        normalized.sort();
        let joined = normalized.join("|");
        let filter_json = filter.map(sorted_json).unwrap_or_else(|| "null".to_string());
        format!("{joined}::{limit}::{filter_json}::{threshold}")
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<SearchResult>> {
        let expired = match self.inner.peek(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            self.inner.pop(key);
            return None;
        }
        self.inner.get(key).map(|e| e.results.clone())
    }

    pub fn put(&mut self, key: String, results: Vec<SearchResult>) {
        self.inner.put(key, Entry { results, inserted_at: Instant::now() });
    }

    pub fn invalidate_all(&mut self) {
        self.inner.clear();
    }
}

/// Recursively sorts object keys so structurally-equal filters always
/// produce the same cache key regardless of insertion order.
fn sorted_json(value: &Value) -> String {
    serde_json::to_string(&sort_value(value)).unwrap_or_else(|_| "null".to_string())
}

fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(k, _)| k.as_str());
            let sorted = entries.into_iter().map(|(k, v)| (k.clone(), sort_value(v))).collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_key_is_order_independent_for_queries_and_filter_keys() {
        let k1 = QueryCache::build_key(&["Foo".into(), "bar".into()], 5, Some(&json!({"a": 1, "b": 2})), 0.5);
        let k2 = QueryCache::build_key(&["bar".into(), " Foo ".into()], 5, Some(&json!({"b": 2, "a": 1})), 0.5);
        assert_eq!(k1, k2);
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut cache = QueryCache::new(10, Duration::from_secs(60));
        let key = QueryCache::build_key(&["x".into()], 5, None, 0.3);
        cache.put(key.clone(), vec![]);
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let mut cache = QueryCache::new(10, Duration::from_millis(1));
        let key = QueryCache::build_key(&["x".into()], 5, None, 0.3);
        cache.put(key.clone(), vec![]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let mut cache = QueryCache::new(10, Duration::from_secs(60));
        let key = QueryCache::build_key(&["x".into()], 5, None, 0.3);
        cache.put(key.clone(), vec![]);
        cache.invalidate_all();
        assert!(cache.get(&key).is_none());
    }
}

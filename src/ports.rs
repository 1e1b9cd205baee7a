//! External Interfaces (spec §6): the opaque collaborators the core
//! consumes but never implements — the LLM client, tool implementations,
//! the embedding model, and the long-term storage backend.
//!
//! Two in-process default adapters (`HashEmbedder`, `InMemoryStorage`) are
//! provided so the crate is exercisable offline, exactly as spec §6 allows:
//! "solely so tests and development work offline."

use crate::error::{CoreError, CoreResult};
use crate::model::TokenUsage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use rusqlite::OptionalExtension;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), name: None }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), name: None }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), name: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCall,
    ContentFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub finish_reason: FinishReason,
}

impl Completion {
    pub fn usage(&self) -> TokenUsage {
        TokenUsage { prompt: self.prompt_tokens, completion: self.completion_tokens, total: self.total_tokens }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tool_schemas: Vec<Value>,
}

/// `complete(messages) → text+usage` (spec §1, §6 "LLM port").
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn complete(&self, messages: &[Message], options: &CompletionOptions) -> CoreResult<Completion>;

    /// Approximate token count for a piece of text, used for prompt-budget
    /// enforcement (spec §4.G step 2).
    fn count_tokens(&self, text: &str) -> usize {
        // Default heuristic consistent with `utils::truncate::approx_token_count`.
        text.len().div_ceil(4)
    }
}

/// `execute(input) → result` (spec §1, §6 "Tool port").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub result: Value,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub cached: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ToolCallOptions {
    pub timeout_ms: Option<u64>,
}

#[async_trait]
pub trait ToolPort: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> Option<Value> {
        None
    }
    async fn execute(&self, input: Value, options: &ToolCallOptions) -> CoreResult<ToolResult>;
}

/// `embed(text) → vector<float, D>` (spec §6 "Embedder port").
#[async_trait]
pub trait EmbedderPort: Send + Sync {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }

    fn dimensionality(&self) -> usize;
}

/// Deterministic hash-derived embedder, the fallback spec §6 requires when
/// no real embedder is configured. Uniformly distributed in `[-1, 1]` per
/// dimension, optionally L2-normalized.
pub struct HashEmbedder {
    dims: usize,
    normalize: bool,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims, normalize: true }
    }

    pub fn without_normalization(mut self) -> Self {
        self.normalize = false;
        self
    }
}

#[async_trait]
impl EmbedderPort for HashEmbedder {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let mut out = Vec::with_capacity(self.dims);
        let mut counter: u32 = 0;
        while out.len() < self.dims {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for chunk in digest.chunks(4) {
                if out.len() >= self.dims {
                    break;
                }
                let mut buf = [0u8; 4];
                buf[..chunk.len()].copy_from_slice(chunk);
                let as_u32 = u32::from_le_bytes(buf);
                // map to [-1, 1]
                let v = (as_u32 as f64 / u32::MAX as f64) * 2.0 - 1.0;
                out.push(v as f32);
            }
            counter += 1;
        }
        if self.normalize {
            let norm: f32 = out.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in out.iter_mut() {
                    *x /= norm;
                }
            }
        }
        Ok(out)
    }

    fn dimensionality(&self) -> usize {
        self.dims
    }
}

/// `save/load/delete/clear/keys` over `"<ns>:item:<id>"` keys
/// (spec §6 "Storage port (long-term memory)").
#[async_trait]
pub trait StoragePort: Send + Sync {
    async fn save(&self, key: &str, value: Value) -> CoreResult<()>;
    async fn load(&self, key: &str) -> CoreResult<Option<Value>>;
    async fn delete(&self, key: &str) -> CoreResult<bool>;
    async fn clear(&self) -> CoreResult<()>;
    async fn keys(&self) -> CoreResult<Vec<String>>;
}

/// Default in-memory `StoragePort`, mirroring the teacher's
/// load-to-cache/persist-on-write pattern (`memory/vector.rs`) without the
/// file-backed persistence — suitable for tests and single-process runs
/// where no external database is configured (spec §1 Non-goals: "no
/// persistent database — persistence is a pluggable port").
#[derive(Default)]
pub struct InMemoryStorage {
    data: RwLock<HashMap<String, Value>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoragePort for InMemoryStorage {
    async fn save(&self, key: &str, value: Value) -> CoreResult<()> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn load(&self, key: &str) -> CoreResult<Option<Value>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> CoreResult<bool> {
        Ok(self.data.write().await.remove(key).is_some())
    }

    async fn clear(&self) -> CoreResult<()> {
        self.data.write().await.clear();
        Ok(())
    }

    async fn keys(&self) -> CoreResult<Vec<String>> {
        Ok(self.data.read().await.keys().cloned().collect())
    }
}

/// SQLite-backed `StoragePort`, grounded on the teacher's
/// `orchestrator/queue.rs` pattern of running `rusqlite` calls through
/// `spawn_blocking`. Offered as an alternative to `InMemoryStorage` for
/// callers that want the long-term memory to survive a process restart.
pub struct SqliteStorage {
    path: std::path::PathBuf,
}

impl SqliteStorage {
    pub async fn open(path: impl Into<std::path::PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let path_clone = path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path_clone)
                .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
                [],
            )
            .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            Ok::<_, CoreError>(())
        })
        .await
        .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })??;
        Ok(Self { path })
    }
}

#[async_trait]
impl StoragePort for SqliteStorage {
    async fn save(&self, key: &str, value: Value) -> CoreResult<()> {
        let path = self.path.clone();
        let key = key.to_string();
        let payload = value.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path)
                .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, payload],
            )
            .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            Ok::<_, CoreError>(())
        })
        .await
        .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?
    }

    async fn load(&self, key: &str) -> CoreResult<Option<Value>> {
        let path = self.path.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path)
                .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            let row: Option<String> = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", rusqlite::params![key], |r| r.get(0))
                .optional()
                .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            Ok::<_, CoreError>(row.map(|s| serde_json::from_str(&s).unwrap_or(Value::Null)))
        })
        .await
        .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?
    }

    async fn delete(&self, key: &str) -> CoreResult<bool> {
        let path = self.path.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path)
                .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            let n = conn
                .execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])
                .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            Ok::<_, CoreError>(n > 0)
        })
        .await
        .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?
    }

    async fn clear(&self) -> CoreResult<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path)
                .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            conn.execute("DELETE FROM kv", [])
                .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            Ok::<_, CoreError>(())
        })
        .await
        .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?
    }

    async fn keys(&self) -> CoreResult<Vec<String>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path)
                .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            let mut stmt = conn
                .prepare("SELECT key FROM kv")
                .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            let rows = stmt
                .query_map([], |r| r.get(0))
                .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?);
            }
            Ok::<_, CoreError>(out)
        })
        .await
        .map_err(|e| CoreError::Memory { kind: "sqlite".into(), message: e.to_string() })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(16);
        let a = embedder.embed("hello").await.unwrap();
        let b = embedder.embed("hello").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn hash_embedder_differs_across_inputs() {
        let embedder = HashEmbedder::new(8);
        let a = embedder.embed("alpha").await.unwrap();
        let b = embedder.embed("beta").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn in_memory_storage_roundtrips() {
        let storage = InMemoryStorage::new();
        storage.save("ns:item:1", serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(storage.load("ns:item:1").await.unwrap(), Some(serde_json::json!({"x": 1})));
        assert!(storage.delete("ns:item:1").await.unwrap());
        assert_eq!(storage.load("ns:item:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sqlite_storage_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::open(dir.path().join("store.db")).await.unwrap();
        storage.save("ns:item:1", serde_json::json!({"y": 2})).await.unwrap();
        assert_eq!(storage.load("ns:item:1").await.unwrap(), Some(serde_json::json!({"y": 2})));
        let keys = storage.keys().await.unwrap();
        assert_eq!(keys, vec!["ns:item:1".to_string()]);
    }
}

//! TaskOutput and the streaming/structured variants (spec §3 "TaskOutput").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

impl TokenUsage {
    pub fn add(mut self, other: TokenUsage) -> Self {
        self.prompt += other.prompt;
        self.completion += other.completion;
        self.total += other.total;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutputMetadata {
    pub task_id: String,
    pub agent_id: String,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub result: String,
    pub metadata: TaskOutputMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<serde_json::Value>,
    /// Present only for structured/streaming outputs; `true` while tokens are
    /// still arriving. Appending to a streaming result must invalidate its
    /// cached serialization (spec §3).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
}

impl TaskOutput {
    pub fn new(result: impl Into<String>, metadata: TaskOutputMetadata) -> Self {
        Self {
            result: result.into(),
            metadata,
            formatted: None,
            streaming: None,
        }
    }
}

/// An append-only log backing a streaming task output. Mutating it
/// invalidates any cached serialization of the accumulated text so callers
/// never observe a stale snapshot.
#[derive(Debug, Default)]
pub struct StreamingOutput {
    chunks: Vec<String>,
    total_len: usize,
    complete: bool,
    cached: Option<String>,
}

impl StreamingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: impl Into<String>) {
        let chunk = chunk.into();
        self.total_len += chunk.len();
        self.chunks.push(chunk);
        self.cached = None;
    }

    pub fn complete(&mut self) {
        self.complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Materialize (and memoize) the concatenated text.
    pub fn text(&mut self) -> &str {
        if self.cached.is_none() {
            self.cached = Some(self.chunks.concat());
        }
        self.cached.as_deref().unwrap()
    }
}

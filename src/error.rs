//! Error Kinds
//!
//! Errors are distinguished by discriminant rather than by the underlying
//! source type, so the scheduler, retry harness, and crew orchestrator can
//! make retry/propagation decisions without downcasting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A structured, serializable failure surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub code: String,
    pub message: String,
    pub context: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CoreError {
    #[error("validation: {message}")]
    Validation { message: String },

    #[error("configuration: {message}")]
    Configuration { message: String },

    #[error("rate limited{}", retry_after_ms.map(|ms| format!(" (retry after {ms}ms)")).unwrap_or_default())]
    RateLimit { retry_after_ms: Option<u64> },

    #[error("timeout in {operation_name} after {timeout_ms}ms")]
    Timeout {
        operation_name: String,
        timeout_ms: u64,
    },

    #[error("network/transient error: {message}")]
    Network { message: String, retryable: bool },

    #[error("tool '{tool_name}' failed for agent {agent_id}: {message}")]
    ToolExecution {
        tool_name: String,
        agent_id: String,
        message: String,
    },

    #[error("task '{task_id}' failed for agent {agent_id}: {message}")]
    TaskExecution {
        task_id: String,
        agent_id: String,
        message: String,
        attempts: u32,
    },

    #[error("authentication failure: {message}")]
    Authentication { message: String },

    #[error("authorization failure: {message}")]
    Authorization { message: String },

    #[error("memory backend failure ({kind}): {message}")]
    Memory { kind: String, message: String },

    #[error("cancelled")]
    Cancelled,
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        CoreError::Configuration {
            message: message.into(),
        }
    }

    /// Default retryability predicate: `error.retryable == true` (spec §7).
    pub fn retryable(&self) -> bool {
        match self {
            CoreError::RateLimit { .. } => true,
            CoreError::Timeout { .. } => true,
            CoreError::Network { retryable, .. } => *retryable,
            CoreError::Memory { .. } => true,
            CoreError::Validation { .. }
            | CoreError::Configuration { .. }
            | CoreError::Authentication { .. }
            | CoreError::Authorization { .. }
            | CoreError::ToolExecution { .. }
            | CoreError::TaskExecution { .. }
            | CoreError::Cancelled => false,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => "validation",
            CoreError::Configuration { .. } => "configuration",
            CoreError::RateLimit { .. } => "rate_limit",
            CoreError::Timeout { .. } => "timeout",
            CoreError::Network { .. } => "network",
            CoreError::ToolExecution { .. } => "tool_execution",
            CoreError::TaskExecution { .. } => "task_execution",
            CoreError::Authentication { .. } => "authentication",
            CoreError::Authorization { .. } => "authorization",
            CoreError::Memory { .. } => "memory",
            CoreError::Cancelled => "cancelled",
        }
    }

    pub fn to_context(&self) -> ErrorContext {
        ErrorContext {
            code: self.code().to_string(),
            message: self.to_string(),
            context: serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
            cause: None,
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

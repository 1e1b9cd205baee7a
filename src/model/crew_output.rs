//! CrewOutput — the aggregate result of one crew run (spec §3 "CrewOutput").

use super::task_output::{TaskOutput, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewMetrics {
    pub execution_time_ms: u64,
    pub token_usage_total: u32,
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewOutput {
    pub final_output: String,
    pub task_outputs: Vec<TaskOutput>,
    pub metrics: CrewMetrics,
    pub timestamp: DateTime<Utc>,
}

impl CrewOutput {
    pub fn assemble(final_output: String, task_outputs: Vec<TaskOutput>, execution_time_ms: u64) -> Self {
        let total = task_outputs
            .iter()
            .filter_map(|o| o.metadata.token_usage)
            .fold(TokenUsage::default(), TokenUsage::add);
        Self {
            final_output,
            task_outputs,
            metrics: CrewMetrics {
                execution_time_ms,
                token_usage_total: total.total,
                cost: None,
            },
            timestamp: Utc::now(),
        }
    }
}

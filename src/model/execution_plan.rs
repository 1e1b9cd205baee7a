//! ExecutionPlan — wire format produced by the hierarchical planner
//! (spec §3 "ExecutionPlan", §6 "Wire format of ExecutionPlan").

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One entry in `taskOrder`: either a single task, or a parallel group id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskOrderItem {
    Task(String),
    Group(u64),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub task_order: Vec<TaskOrderItem>,
    #[serde(default)]
    pub parallel_groups: HashMap<String, HashSet<String>>,
    #[serde(default)]
    pub significant_tasks: Option<HashSet<String>>,
    #[serde(default)]
    pub synthesis_required: bool,
}

impl ExecutionPlan {
    /// A task is significant if listed explicitly, or if the field was
    /// omitted entirely (spec §4.H: "default: include all").
    pub fn is_significant(&self, task_id: &str) -> bool {
        match &self.significant_tasks {
            None => true,
            Some(set) => set.contains(task_id),
        }
    }

    /// Every TaskId must appear exactly once across `taskOrder` and
    /// `parallelGroups`, and every id referenced must exist in `known_ids`.
    pub fn validate(&self, known_ids: &HashSet<String>) -> Result<(), crate::error::CoreError> {
        use crate::error::CoreError;
        let mut seen: HashSet<&str> = HashSet::new();

        for item in &self.task_order {
            match item {
                TaskOrderItem::Task(id) => {
                    if !known_ids.contains(id) {
                        return Err(CoreError::validation(format!("plan references unknown task {id}")));
                    }
                    if !seen.insert(id.as_str()) {
                        return Err(CoreError::validation(format!("plan references task {id} more than once")));
                    }
                }
                TaskOrderItem::Group(gid) => {
                    let key = gid.to_string();
                    let members = self.parallel_groups.get(&key).ok_or_else(|| {
                        CoreError::validation(format!("plan references undeclared parallel group {gid}"))
                    })?;
                    for id in members {
                        if !known_ids.contains(id) {
                            return Err(CoreError::validation(format!("plan references unknown task {id}")));
                        }
                        if !seen.insert(id.as_str()) {
                            return Err(CoreError::validation(format!("plan references task {id} more than once")));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Fallback plan used when the manager's response cannot be parsed
    /// (spec §4.H step 1): every task runs sequentially, no synthesis.
    pub fn trivial_sequential(task_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            task_order: task_ids.into_iter().map(TaskOrderItem::Task).collect(),
            parallel_groups: HashMap::new(),
            significant_tasks: None,
            synthesis_required: false,
        }
    }

    /// Extract a JSON ExecutionPlan from model output: fenced code block
    /// first, then a top-level object starting with `"taskOrder"`, then a
    /// whole-string parse (spec §6 "Wire format of ExecutionPlan").
    pub fn extract_from_text(text: &str) -> Option<Self> {
        if let Some(fenced) = extract_fenced_block(text) {
            if let Ok(plan) = serde_json::from_str::<ExecutionPlan>(&fenced) {
                return Some(plan);
            }
        }
        if let Some(obj) = extract_object_starting_with(text, "\"taskOrder\"") {
            if let Ok(plan) = serde_json::from_str::<ExecutionPlan>(&obj) {
                return Some(plan);
            }
        }
        serde_json::from_str::<ExecutionPlan>(text.trim()).ok()
    }
}

fn extract_fenced_block(text: &str) -> Option<String> {
    let start_marker = "```";
    let start = text.find(start_marker)?;
    let after_marker = start + start_marker.len();
    let body_start = text[after_marker..].find('\n').map(|i| after_marker + i + 1).unwrap_or(after_marker);
    let end = text[body_start..].find(start_marker)? + body_start;
    Some(text[body_start..end].trim().to_string())
}

fn extract_object_starting_with(text: &str, needle: &str) -> Option<String> {
    let key_pos = text.find(needle)?;
    let brace_start = text[..key_pos].rfind('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[brace_start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[brace_start..brace_start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(xs: &[&str]) -> HashSet<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn validate_accepts_well_formed_plan() {
        let mut groups = HashMap::new();
        groups.insert("1".to_string(), ids(&["t2", "t2b"]));
        let plan = ExecutionPlan {
            task_order: vec![
                TaskOrderItem::Task("t1".into()),
                TaskOrderItem::Group(1),
                TaskOrderItem::Task("t3".into()),
            ],
            parallel_groups: groups,
            significant_tasks: Some(ids(&["t1", "t3"])),
            synthesis_required: true,
        };
        assert!(plan.validate(&ids(&["t1", "t2", "t2b", "t3"])).is_ok());
        assert!(plan.is_significant("t1"));
        assert!(!plan.is_significant("t2"));
    }

    #[test]
    fn validate_rejects_duplicate_task_reference() {
        let plan = ExecutionPlan {
            task_order: vec![TaskOrderItem::Task("t1".into()), TaskOrderItem::Task("t1".into())],
            ..Default::default()
        };
        assert!(plan.validate(&ids(&["t1"])).is_err());
    }

    #[test]
    fn extracts_fenced_json_block() {
        let text = "Here is the plan:\n```json\n{\"taskOrder\": [\"t1\"], \"synthesisRequired\": false}\n```\nDone.";
        let plan = ExecutionPlan::extract_from_text(text).expect("should parse");
        assert_eq!(plan.task_order, vec![TaskOrderItem::Task("t1".into())]);
    }

    #[test]
    fn extracts_bare_object_when_no_fence() {
        let text = "Sure thing. {\"taskOrder\": [\"t1\", \"t2\"], \"synthesisRequired\": true} thanks";
        let plan = ExecutionPlan::extract_from_text(text).expect("should parse");
        assert!(plan.synthesis_required);
        assert_eq!(plan.task_order.len(), 2);
    }

    #[test]
    fn falls_back_to_none_on_garbage() {
        assert!(ExecutionPlan::extract_from_text("not json at all").is_none());
    }
}

//! Task definition and the caching-strategy/priority enums (spec §3 "Task").

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachingStrategy {
    None,
    Memory,
    /// Reserved: declared but not dispatched (spec §9 open question).
    Disk,
    /// Reserved: declared but not dispatched (spec §9 open question).
    Hybrid,
}

impl CachingStrategy {
    /// Only `none`/`memory` are honored; everything else must be rejected at
    /// validation time rather than silently downgraded (spec §9).
    pub fn is_supported(&self) -> bool {
        matches!(self, CachingStrategy::None | CachingStrategy::Memory)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub agent_ref: String,
    pub expected_output: Option<String>,
    pub context_seeds: Vec<String>,
    pub priority: Priority,
    pub is_async: bool,
    pub tool_refs: Vec<String>,
    pub dependencies: HashSet<String>,
    pub caching_strategy: CachingStrategy,
    pub max_retries: u32,
    pub timeout_ms: Option<u64>,
    /// A conditional task is never async (spec §3 invariant).
    pub conditional: bool,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>, agent_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            agent_ref: agent_ref.into(),
            expected_output: None,
            context_seeds: Vec::new(),
            priority: Priority::Medium,
            is_async: false,
            tool_refs: Vec::new(),
            dependencies: HashSet::new(),
            caching_strategy: CachingStrategy::None,
            max_retries: 2,
            timeout_ms: None,
            conditional: false,
        }
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = String>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }
}

/// Validates the crew-level invariants on a task list: agent references
/// resolve, dependencies resolve, the dependency graph is acyclic, the async
/// tasks form a contiguous trailing suffix, and no conditional task is async.
pub fn validate_tasks(tasks: &[Task], agent_ids: &HashSet<String>) -> Result<(), crate::error::CoreError> {
    use crate::error::CoreError;

    let mut ids = HashSet::new();
    for task in tasks {
        if !ids.insert(task.id.as_str()) {
            return Err(CoreError::validation(format!("duplicate task id: {}", task.id)));
        }
    }

    for task in tasks {
        if !agent_ids.contains(&task.agent_ref) {
            return Err(CoreError::validation(format!(
                "task {} references unknown agent {}",
                task.id, task.agent_ref
            )));
        }
        for dep in &task.dependencies {
            if !ids.contains(dep.as_str()) {
                return Err(CoreError::validation(format!(
                    "task {} depends on unknown task {}",
                    task.id, dep
                )));
            }
        }
        if !task.caching_strategy.is_supported() {
            return Err(CoreError::validation(format!(
                "task {} uses unsupported caching strategy {:?}",
                task.id, task.caching_strategy
            )));
        }
        if task.conditional && task.is_async {
            return Err(CoreError::validation(format!(
                "task {} is conditional and cannot be async",
                task.id
            )));
        }
    }

    detect_cycle(tasks)?;
    validate_async_suffix(tasks)?;
    Ok(())
}

fn detect_cycle(tasks: &[Task]) -> Result<(), crate::error::CoreError> {
    use crate::error::CoreError;
    use std::collections::HashMap;

    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Temp,
        Done,
    }
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a Task>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<(), crate::error::CoreError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Temp) => {
                return Err(crate::error::CoreError::validation(format!(
                    "dependency cycle detected at task {}",
                    id
                )))
            }
            None => {}
        }
        marks.insert(id, Mark::Temp);
        if let Some(task) = by_id.get(id) {
            for dep in &task.dependencies {
                visit(dep.as_str(), by_id, marks)?;
            }
        }
        marks.insert(id, Mark::Done);
        Ok(())
    }

    for task in tasks {
        visit(task.id.as_str(), &by_id, &mut marks)?;
    }
    Ok(())
}

fn validate_async_suffix(tasks: &[Task]) -> Result<(), crate::error::CoreError> {
    use crate::error::CoreError;
    // Find the first async task; every task after it must also be async.
    let first_async = tasks.iter().position(|t| t.is_async);
    if let Some(pos) = first_async {
        if tasks[pos..].iter().any(|t| !t.is_async) {
            return Err(CoreError::validation(
                "async tasks must form a contiguous trailing suffix of the task list".to_string(),
            ));
        }
    }
    Ok(())
}

/// The contiguous trailing run of async tasks, and the (possibly empty)
/// sequential prefix before it.
pub fn split_async_suffix(tasks: &[Task]) -> (&[Task], &[Task]) {
    let first_async = tasks.iter().position(|t| t.is_async).unwrap_or(tasks.len());
    tasks.split_at(first_async)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agents(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accepts_valid_dag() {
        let tasks = vec![
            Task::new("t1", "d1", "a1"),
            Task::new("t2", "d2", "a1").with_dependencies(["t1".to_string()]),
        ];
        assert!(validate_tasks(&tasks, &agents(&["a1"])).is_ok());
    }

    #[test]
    fn rejects_cycle() {
        let tasks = vec![
            Task::new("t1", "d1", "a1").with_dependencies(["t2".to_string()]),
            Task::new("t2", "d2", "a1").with_dependencies(["t1".to_string()]),
        ];
        assert!(validate_tasks(&tasks, &agents(&["a1"])).is_err());
    }

    #[test]
    fn rejects_non_contiguous_async_suffix() {
        let tasks = vec![
            Task::new("t1", "d1", "a1").with_async(true),
            Task::new("t2", "d2", "a1").with_async(false),
        ];
        assert!(validate_tasks(&tasks, &agents(&["a1"])).is_err());
    }

    #[test]
    fn rejects_unsupported_caching_strategy() {
        let mut t = Task::new("t1", "d1", "a1");
        t.caching_strategy = CachingStrategy::Disk;
        assert!(validate_tasks(&[t], &agents(&["a1"])).is_err());
    }

    #[test]
    fn split_async_suffix_finds_trailing_run() {
        let tasks = vec![
            Task::new("t1", "d", "a1"),
            Task::new("t2", "d", "a1").with_async(true),
            Task::new("t3", "d", "a1").with_async(true),
        ];
        let (seq, async_tasks) = split_async_suffix(&tasks);
        assert_eq!(seq.len(), 1);
        assert_eq!(async_tasks.len(), 2);
    }
}

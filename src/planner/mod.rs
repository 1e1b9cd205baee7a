//! Hierarchical Planner (spec §4.H): the manager agent drafts an
//! `ExecutionPlan`, the planner walks it (sequential items in order,
//! parallel-group items concurrently against one shared entering context),
//! then optionally asks the manager to synthesize the accumulated results
//! into one coherent answer.
//!
//! Grounded on the teacher's `orchestrator/planner.rs` for the plan/execute/
//! synthesize shape and its tolerant JSON extraction, reused here via
//! `model::ExecutionPlan::extract_from_text`.

use crate::error::{CoreError, CoreResult};
use crate::model::{ExecutionPlan, Priority, Task, TaskOrderItem, TaskOutput};
use crate::retry::{self, RetryOptions};
use crate::scheduler::TaskExecutor;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const PLANNING_TASK_ID: &str = "__planning__";
pub const SYNTHESIS_TASK_ID: &str = "__synthesis__";

/// What the planner produced, handed back to the crew orchestrator for
/// `CrewOutput::assemble` (spec §4.I).
#[derive(Debug, Clone)]
pub struct PlannerOutcome {
    pub final_output: String,
    pub completed_ids: Vec<String>,
    pub context: String,
    pub task_outputs: HashMap<String, TaskOutput>,
}

/// Runs `tasks` under a manager-drafted plan (spec §4.H steps 1-3).
/// `manager_agent_id` must resolve against whatever agent registry backs
/// `executor` (ordinarily the crew's `AgentRuntime`).
pub async fn run(
    executor: Arc<dyn TaskExecutor>,
    manager_agent_id: &str,
    tasks: &[Task],
    input_context: &str,
    cancel: CancellationToken,
) -> CoreResult<PlannerOutcome> {
    let known_ids: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
    let by_id: HashMap<String, Task> = tasks.iter().map(|t| (t.id.clone(), t.clone())).collect();

    let plan = draft_plan(&executor, manager_agent_id, tasks, &known_ids, input_context, cancel.clone()).await;

    let mut context = input_context.to_string();
    let mut final_output = String::new();
    let mut completed_ids = Vec::new();
    let mut task_outputs = HashMap::new();

    for item in &plan.task_order {
        match item {
            TaskOrderItem::Task(id) => {
                let task = by_id.get(id).ok_or_else(|| {
                    CoreError::validation(format!("plan references unknown task {id}"))
                })?;
                let output = execute_with_retry(&executor, task, &context, cancel.clone()).await?;
                record_step(&plan, id, &output, &mut context, &mut final_output);
                completed_ids.push(id.clone());
                task_outputs.insert(id.clone(), output);
            }
            TaskOrderItem::Group(gid) => {
                let key = gid.to_string();
                let members: Vec<&Task> = plan
                    .parallel_groups
                    .get(&key)
                    .into_iter()
                    .flatten()
                    .filter_map(|id| by_id.get(id))
                    .collect();

                let entering_context = context.clone();
                let outcomes = futures_util::future::join_all(members.iter().map(|task| {
                    let executor = executor.clone();
                    let ctx = entering_context.clone();
                    let cancel = cancel.clone();
                    async move {
                        let result = execute_with_retry(&executor, task, &ctx, cancel).await;
                        (task.id.clone(), result)
                    }
                }))
                .await;

                // Side-effect ordering inside a group is unspecified; we apply
                // them in task-array order for deterministic bookkeeping.
                for (id, result) in outcomes {
                    let output = result?;
                    record_step(&plan, &id, &output, &mut context, &mut final_output);
                    completed_ids.push(id.clone());
                    task_outputs.insert(id, output);
                }
            }
        }
    }

    if plan.synthesis_required {
        match run_synthesis(&executor, manager_agent_id, &context, cancel.clone()).await {
            Ok(output) => {
                final_output = output.result.clone();
                task_outputs.insert(SYNTHESIS_TASK_ID.to_string(), output);
            }
            Err(_) => {
                final_output = aggregate_fallback(&completed_ids, &task_outputs);
            }
        }
    }

    Ok(PlannerOutcome { final_output, completed_ids, context, task_outputs })
}

fn record_step(plan: &ExecutionPlan, id: &str, output: &TaskOutput, context: &mut String, final_output: &mut String) {
    if plan.is_significant(id) {
        context.push_str("\n\nTask result: ");
        context.push_str(&output.result);
        *final_output = output.result.clone();
    }
}

fn aggregate_fallback(completed_ids: &[String], task_outputs: &HashMap<String, TaskOutput>) -> String {
    let mut message = String::from("Results are provided individually:\n");
    for id in completed_ids {
        if let Some(output) = task_outputs.get(id) {
            message.push_str(&format!("- {id}: {}\n", output.result));
        }
    }
    message
}

async fn draft_plan(
    executor: &Arc<dyn TaskExecutor>,
    manager_agent_id: &str,
    tasks: &[Task],
    known_ids: &HashSet<String>,
    input_context: &str,
    cancel: CancellationToken,
) -> ExecutionPlan {
    let fallback = || ExecutionPlan::trivial_sequential(tasks.iter().map(|t| t.id.clone()));

    let enumeration: String = tasks
        .iter()
        .map(|t| {
            format!(
                "- id: {}, description: {}, agent: {}, priority: {:?}, async: {}",
                t.id, t.description, t.agent_ref, t.priority, t.is_async
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let description = format!(
        "Plan the execution of the following tasks. Reply with a JSON \
         ExecutionPlan object: {{\"taskOrder\": [...], \"parallelGroups\": {{...}}, \
         \"significantTasks\": [...], \"synthesisRequired\": bool}}. Tasks:\n{enumeration}"
    );

    let planning_task = Task::new(PLANNING_TASK_ID, description, manager_agent_id).with_priority(Priority::Critical);

    let output = match execute_with_retry(executor, &planning_task, input_context, cancel).await {
        Ok(output) => output,
        Err(_) => return fallback(),
    };

    match ExecutionPlan::extract_from_text(&output.result) {
        Some(plan) if plan.validate(known_ids).is_ok() => plan,
        _ => fallback(),
    }
}

async fn run_synthesis(
    executor: &Arc<dyn TaskExecutor>,
    manager_agent_id: &str,
    context: &str,
    cancel: CancellationToken,
) -> CoreResult<TaskOutput> {
    let description = format!(
        "{context}\n\nProduce a single coherent, integrated summary of all the task \
         results above, as if no work had been delegated to separate tasks."
    );
    let synthesis_task = Task::new(SYNTHESIS_TASK_ID, description, manager_agent_id).with_priority(Priority::Critical);
    execute_with_retry(executor, &synthesis_task, "", cancel).await
}

/// Runs one task through the retry harness directly (the planner bypasses
/// the scheduler's queue, but still honors `task.max_retries`/`timeout_ms`
/// per spec §4.H "unless the task's own retry policy absorbs it"). Also used
/// by the crew orchestrator's sequential dispatch for the same reason.
pub(crate) async fn execute_with_retry(
    executor: &Arc<dyn TaskExecutor>,
    task: &Task,
    context: &str,
    cancel: CancellationToken,
) -> CoreResult<TaskOutput> {
    let executor = executor.clone();
    let task = task.clone();
    let context = context.to_string();
    let op = || {
        let executor = executor.clone();
        let task = task.clone();
        let context = context.clone();
        let cancel = cancel.clone();
        async move { executor.execute(&task, &context, cancel).await }
    };
    let options = RetryOptions { max_attempts: task.max_retries.max(1), timeout_ms: task.timeout_ms, cancel: Some(cancel.clone()), ..RetryOptions::default() };
    retry::run(op, options).await.map_err(|e| e.last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority as P, TaskOutputMetadata};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn task_output(task: &Task, result: impl Into<String>) -> TaskOutput {
        TaskOutput::new(
            result,
            TaskOutputMetadata {
                task_id: task.id.clone(),
                agent_id: task.agent_ref.clone(),
                execution_time_ms: 1,
                token_usage: None,
                iterations: None,
                cache_hit: None,
                retries: None,
            },
        )
    }

    /// A manager whose planning/synthesis replies are scripted, and whose
    /// ordinary task replies just echo the description.
    struct ScriptedManager {
        plan_reply: String,
        synthesis_reply: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TaskExecutor for ScriptedManager {
        async fn execute(&self, task: &Task, _ctx: &str, _cancel: CancellationToken) -> CoreResult<TaskOutput> {
            self.calls.lock().unwrap().push(task.id.clone());
            if task.id == PLANNING_TASK_ID {
                return Ok(task_output(task, self.plan_reply.clone()));
            }
            if task.id == SYNTHESIS_TASK_ID {
                return match &self.synthesis_reply {
                    Some(reply) => Ok(task_output(task, reply.clone())),
                    None => Err(CoreError::validation("synthesis disabled")),
                };
            }
            Ok(task_output(task, format!("result-of-{}", task.id)))
        }
    }

    fn tasks() -> Vec<Task> {
        vec![
            Task::new("T1", "first", "writer").with_priority(P::Medium),
            Task::new("T2", "second-a", "writer").with_priority(P::Medium),
            Task::new("T2b", "second-b", "writer").with_priority(P::Medium),
            Task::new("T3", "third", "writer").with_priority(P::Medium),
        ]
    }

    #[tokio::test]
    async fn sequential_plan_accumulates_context_and_final_output() {
        let plan_json = r#"{"taskOrder": ["T1", "T2", "T2b", "T3"], "synthesisRequired": false}"#;
        let manager = Arc::new(ScriptedManager { plan_reply: plan_json.to_string(), synthesis_reply: None, calls: Mutex::new(Vec::new()) });
        let outcome = run(manager, "manager", &tasks(), "seed", CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.completed_ids, vec!["T1", "T2", "T2b", "T3"]);
        assert_eq!(outcome.final_output, "result-of-T3");
        assert!(outcome.context.contains("result-of-T1"));
    }

    #[tokio::test]
    async fn parallel_group_executes_all_members_with_same_entering_context() {
        let plan_json = r#"{
            "taskOrder": ["T1", 1, "T3"],
            "parallelGroups": {"1": ["T2", "T2b"]},
            "significantTasks": ["T1", "T3"],
            "synthesisRequired": false
        }"#;
        let manager = Arc::new(ScriptedManager { plan_reply: plan_json.to_string(), synthesis_reply: None, calls: Mutex::new(Vec::new()) });
        let outcome = run(manager, "manager", &tasks(), "", CancellationToken::new()).await.unwrap();
        let completed: HashSet<_> = outcome.completed_ids.iter().cloned().collect();
        assert_eq!(completed, vec!["T1", "T2", "T2b", "T3"].into_iter().map(String::from).collect());
        // T2/T2b are not in significantTasks, so only T1/T3 shape the context.
        assert!(!outcome.context.contains("result-of-T2\n") && outcome.context.contains("result-of-T1"));
        assert_eq!(outcome.final_output, "result-of-T3");
    }

    #[tokio::test]
    async fn unparsable_plan_falls_back_to_trivial_sequential() {
        let manager = Arc::new(ScriptedManager { plan_reply: "not json".to_string(), synthesis_reply: None, calls: Mutex::new(Vec::new()) });
        let outcome = run(manager, "manager", &tasks(), "", CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.completed_ids, vec!["T1", "T2", "T2b", "T3"]);
    }

    #[tokio::test]
    async fn synthesis_runs_when_required_and_overrides_final_output() {
        let plan_json = r#"{"taskOrder": ["T1"], "synthesisRequired": true}"#;
        let manager = Arc::new(ScriptedManager {
            plan_reply: plan_json.to_string(),
            synthesis_reply: Some("a synthesized answer".to_string()),
            calls: Mutex::new(Vec::new()),
        });
        let outcome = run(manager, "manager", &tasks()[..1], "", CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.final_output, "a synthesized answer");
        assert!(outcome.task_outputs.contains_key(SYNTHESIS_TASK_ID));
    }

    #[tokio::test]
    async fn synthesis_failure_falls_back_to_aggregated_results() {
        let plan_json = r#"{"taskOrder": ["T1"], "synthesisRequired": true}"#;
        let manager = Arc::new(ScriptedManager { plan_reply: plan_json.to_string(), synthesis_reply: None, calls: Mutex::new(Vec::new()) });
        let outcome = run(manager, "manager", &tasks()[..1], "", CancellationToken::new()).await.unwrap();
        assert!(outcome.final_output.starts_with("Results are provided individually"));
        assert!(outcome.final_output.contains("result-of-T1"));
    }

    #[tokio::test]
    async fn failing_task_fails_the_whole_run() {
        struct FlakyManager(AtomicU32);
        #[async_trait]
        impl TaskExecutor for FlakyManager {
            async fn execute(&self, task: &Task, _ctx: &str, _cancel: CancellationToken) -> CoreResult<TaskOutput> {
                if task.id == PLANNING_TASK_ID {
                    return Ok(task_output(task, r#"{"taskOrder": ["T1"], "synthesisRequired": false}"#));
                }
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::TaskExecution { task_id: task.id.clone(), agent_id: task.agent_ref.clone(), message: "boom".into(), attempts: 1 })
            }
        }
        let mut flaky_task = tasks()[0].clone();
        flaky_task.max_retries = 1;
        let manager = Arc::new(FlakyManager(AtomicU32::new(0)));
        let result = run(manager, "manager", std::slice::from_ref(&flaky_task), "", CancellationToken::new()).await;
        assert!(result.is_err());
    }
}

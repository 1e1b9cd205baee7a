//! Crew Orchestrator (spec §4.I): the top-level façade. Validates a crew's
//! agents/tasks/process, initializes shared memory, dispatches to the
//! sequential or hierarchical executor, and assembles `CrewOutput`.
//!
//! Grounded on the teacher's `orchestrator/crew.rs` for the
//! validate-then-dispatch-then-assemble shape; the sequential executor's
//! context-accumulation loop is grounded on the same pattern used in
//! `planner::run`'s sequential branch (reused here via
//! `planner::execute_with_retry`).

use crate::agent_runtime::{AgentMemory, AgentRuntime, AgentRuntimeConfig};
use crate::context::{ContextBuilder, ContextBuilderConfig};
use crate::error::{CoreError, CoreResult};
use crate::memory::{MemoryCategory, MemoryManager, MemoryManagerConfig};
use crate::model::agent::validate_unique_ids;
use crate::model::task::{split_async_suffix, validate_tasks};
use crate::model::{Agent, CrewOutput, Task, TaskOutput};
use crate::planner::{self, execute_with_retry};
use crate::ports::{LlmPort, StoragePort, ToolPort};
use crate::rate::{RateController, RateControllerConfig};
use crate::scheduler::{Scheduler, SchedulerConfig, TaskExecutor};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const SYNTHETIC_MANAGER_ID: &str = "__manager__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Process {
    Sequential,
    Hierarchical,
}

#[derive(Clone)]
pub struct CrewConfig {
    pub process: Process,
    /// An existing agent (from the crew's own roster) that plans and
    /// synthesizes for the hierarchical process.
    pub manager_agent_id: Option<String>,
    /// Used to synthesize a manager agent when no `manager_agent_id` is
    /// given (spec §4.I "hierarchical process has either a manager-llm or
    /// manager-agent").
    pub manager_llm_ref: Option<String>,
    pub scheduler: SchedulerConfig,
    pub rate: RateControllerConfig,
    pub runtime: AgentRuntimeConfig,
    pub memory: MemoryManagerConfig,
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            process: Process::Sequential,
            manager_agent_id: None,
            manager_llm_ref: None,
            scheduler: SchedulerConfig::default(),
            rate: RateControllerConfig::default(),
            runtime: AgentRuntimeConfig::default(),
            memory: MemoryManagerConfig::default(),
        }
    }
}

/// Owns its tasks, agents, memory manager, and rate controller for the
/// duration of one run (spec §3 "Ownership").
pub struct Crew {
    tasks: Vec<Task>,
    config: CrewConfig,
    manager_agent_id: Option<String>,
    runtime: Arc<AgentRuntime>,
    memory: Arc<AgentMemory>,
    cancel: CancellationToken,
}

impl Crew {
    pub fn new(
        crew_id: impl Into<String>,
        agents: Vec<Agent>,
        tasks: Vec<Task>,
        llms: HashMap<String, Arc<dyn LlmPort>>,
        tools: HashMap<String, Arc<dyn ToolPort>>,
        storage: Arc<dyn StoragePort>,
        config: CrewConfig,
    ) -> CoreResult<Self> {
        if agents.is_empty() {
            return Err(CoreError::validation("a crew needs at least one agent"));
        }
        if tasks.is_empty() {
            return Err(CoreError::validation("a crew needs at least one task"));
        }
        validate_unique_ids(&agents)?;

        let manager_agent_id = match config.process {
            Process::Hierarchical => Some(resolve_manager_id(&agents, &config)?),
            Process::Sequential => None,
        };

        let agent_ids: HashSet<String> = agents.iter().map(|a| a.id.clone()).collect();
        validate_tasks(&tasks, &agent_ids)?;

        let mut runtime_agents = agents.clone();
        let synthesized_manager = matches!(config.process, Process::Hierarchical)
            && config.manager_agent_id.is_none()
            && config.manager_llm_ref.is_some();
        if synthesized_manager {
            runtime_agents.push(
                Agent::new(
                    SYNTHETIC_MANAGER_ID,
                    "Crew Manager",
                    "Plan the task order, delegate effectively, and synthesize a coherent final answer",
                    config.manager_llm_ref.clone().unwrap(),
                )
                .with_delegation(true),
            );
        }

        let memory = Arc::new(AgentMemory {
            manager: Mutex::new(MemoryManager::new(crew_id.into(), storage, config.memory.clone())),
            context_builder: Mutex::new(ContextBuilder::new(ContextBuilderConfig::default())),
        });

        let mut runtime = AgentRuntime::new(
            runtime_agents,
            llms,
            tools,
            Arc::new(RateController::new(config.rate)),
            config.runtime.clone(),
        );
        for agent in &agents {
            if agent.memory_enabled {
                runtime = runtime.with_memory(agent.id.clone(), memory.clone());
            }
        }

        Ok(Self {
            tasks,
            config,
            manager_agent_id,
            runtime: Arc::new(runtime),
            memory,
            cancel: CancellationToken::new(),
        })
    }

    /// Aborts the run: pending/waiting scheduler work is rejected, in-flight
    /// port calls abort at their next suspension point (spec §5
    /// "Cancellation").
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn reset_memory(&self, category: MemoryCategory) -> CoreResult<()> {
        self.memory.manager.lock().await.reset(category).await
    }

    pub async fn run(&self) -> CoreResult<CrewOutput> {
        let start = Instant::now();
        let (final_output, task_outputs) = match self.config.process {
            Process::Sequential => self.run_sequential().await?,
            Process::Hierarchical => self.run_hierarchical().await?,
        };
        Ok(CrewOutput::assemble(final_output, task_outputs, start.elapsed().as_millis() as u64))
    }

    /// Sequential process: the non-async prefix runs one task at a time,
    /// each seeing prior results in its context (spec §5 "task i's result is
    /// visible in the context of task i+1"); the trailing async suffix (if
    /// any) then runs concurrently through the scheduler, every member
    /// seeing the same entering context.
    async fn run_sequential(&self) -> CoreResult<(String, Vec<TaskOutput>)> {
        let executor: Arc<dyn TaskExecutor> = self.runtime.clone();
        let (seq, async_tasks) = split_async_suffix(&self.tasks);

        let mut context = String::new();
        let mut ordered_ids = Vec::new();
        let mut outputs_by_id: HashMap<String, TaskOutput> = HashMap::new();

        for task in seq {
            let output = execute_with_retry(&executor, task, &context, self.cancel.clone()).await?;
            context.push_str("\n\nTask result: ");
            context.push_str(&output.result);
            ordered_ids.push(task.id.clone());
            outputs_by_id.insert(task.id.clone(), output);
        }

        if !async_tasks.is_empty() {
            let scheduler = Scheduler::new(executor, self.config.scheduler, self.cancel.clone());
            for task in async_tasks {
                scheduler.submit(task.clone(), context.clone()).await?;
            }
            scheduler.drain().await?;
            for id in scheduler.completion_order().await {
                let output = scheduler.output(&id).await.expect("just completed")?;
                ordered_ids.push(id.clone());
                outputs_by_id.insert(id, output);
            }
        }

        // spec §4.F: "the result of the last async task (by submission order)
        // becomes the crew's final result" — not whichever async task happens
        // to finish last. Fall back to completion order when there is no
        // async suffix (plain sequential crew).
        let final_output = async_tasks
            .last()
            .map(|t| &t.id)
            .or_else(|| ordered_ids.last())
            .and_then(|id| outputs_by_id.get(id))
            .map(|o| o.result.clone())
            .unwrap_or_default();
        let task_outputs = ordered_ids.iter().filter_map(|id| outputs_by_id.get(id).cloned()).collect();
        Ok((final_output, task_outputs))
    }

    /// Hierarchical process: delegates planning, execution, and synthesis
    /// entirely to the manager-driven planner (spec §4.H).
    async fn run_hierarchical(&self) -> CoreResult<(String, Vec<TaskOutput>)> {
        let manager_id = self
            .manager_agent_id
            .clone()
            .ok_or_else(|| CoreError::configuration("hierarchical process requires a manager agent"))?;
        let executor: Arc<dyn TaskExecutor> = self.runtime.clone();
        let outcome = planner::run(executor, &manager_id, &self.tasks, "", self.cancel.clone()).await?;

        let mut task_outputs: Vec<TaskOutput> =
            outcome.completed_ids.iter().filter_map(|id| outcome.task_outputs.get(id).cloned()).collect();
        if let Some(synthesis) = outcome.task_outputs.get(planner::SYNTHESIS_TASK_ID) {
            task_outputs.push(synthesis.clone());
        }
        Ok((outcome.final_output, task_outputs))
    }
}

fn resolve_manager_id(agents: &[Agent], config: &CrewConfig) -> CoreResult<String> {
    if let Some(id) = &config.manager_agent_id {
        if !agents.iter().any(|a| &a.id == id) {
            return Err(CoreError::validation(format!("manager agent {id} is not part of this crew")));
        }
        return Ok(id.clone());
    }
    if config.manager_llm_ref.is_some() {
        return Ok(SYNTHETIC_MANAGER_ID.to_string());
    }
    Err(CoreError::validation(
        "hierarchical process requires either manager_agent_id or manager_llm_ref",
    ))
}

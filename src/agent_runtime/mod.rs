//! Agent Runtime (spec §4.G): executes one task end to end — assembles
//! context and a system prompt, calls the LLM port through the rate
//! controller and retry harness, runs a bounded tool-call loop, and records
//! memory.
//!
//! The tool-call loop shape (iterate, observe, truncate the observation,
//! stop at `maxIterations`) is grounded on the teacher's `agent/react.rs`
//! `execute_with_steering` loop; tool-observation truncation reuses
//! `utils::truncate::{truncate_text, TruncationPolicy}` exactly as that loop
//! does. The delegate-to-coworker tool descriptors are grounded on the same
//! file's `AgentResponse`/tool-call shape, generalized from a fixed agent
//! roster into synthesized per-agent delegation tools.

mod prompt;

use crate::context::ContextBuilder;
use crate::error::{CoreError, CoreResult};
use crate::memory::MemoryManager;
use crate::model::{Agent, CachingStrategy, MemoryEntry, MemoryKind, Task, TaskOutput, TaskOutputMetadata, TokenUsage};
use crate::ports::{CompletionOptions, LlmPort, Message, ToolCallOptions, ToolPort};
use crate::rate::RateController;
use crate::retry::{self, RetryOptions};
use crate::scheduler::TaskExecutor;
use crate::utils::truncate::{truncate_text, TruncationPolicy};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub use prompt::{PromptBudget, PromptVariable};

/// `{quality, suggestions[], entities[]}` produced by an output evaluator
/// (spec §4.G step 5).
#[derive(Debug, Clone, Default)]
pub struct EvaluatedOutput {
    pub quality: f32,
    pub suggestions: Vec<String>,
    pub entities: Vec<ExtractedEntity>,
}

#[derive(Debug, Clone)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: String,
    pub description: String,
    pub relationships: Vec<String>,
}

/// Extracts `{quality, suggestions, entities}` from a completed task output,
/// so a long-term memory write can be enriched beyond the raw result text.
#[async_trait]
pub trait OutputEvaluator: Send + Sync {
    async fn evaluate(&self, task: &Task, output: &str) -> CoreResult<EvaluatedOutput>;
}

/// LLM-backed evaluator: asks the same model for a terse JSON verdict and
/// tolerantly extracts it the way `ExecutionPlan::extract_from_text` does
/// (fenced block, then bare object, then whole-string parse).
pub struct LlmOutputEvaluator {
    llm: Arc<dyn LlmPort>,
}

impl LlmOutputEvaluator {
    pub fn new(llm: Arc<dyn LlmPort>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl OutputEvaluator for LlmOutputEvaluator {
    async fn evaluate(&self, task: &Task, output: &str) -> CoreResult<EvaluatedOutput> {
        let prompt = format!(
            "Evaluate the following task result. Task: {}\nResult: {}\n\nRespond with a single JSON object: {{\"quality\": <0..1>, \"suggestions\": [string], \"entities\": [{{\"name\": string, \"type\": string, \"description\": string, \"relationships\": [string]}}]}}.",
            task.description, output
        );
        let messages = vec![Message::user(prompt)];
        let completion = self.llm.complete(&messages, &CompletionOptions::default()).await?;
        Ok(parse_evaluated_output(&completion.content))
    }
}

fn parse_evaluated_output(text: &str) -> EvaluatedOutput {
    extract_json_object(text)
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .map(|value| EvaluatedOutput {
            quality: value.get("quality").and_then(Value::as_f64).map(|q| q as f32).unwrap_or(0.5).clamp(0.0, 1.0),
            suggestions: value
                .get("suggestions")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            entities: value
                .get("entities")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|e| {
                            let name = e.get("name")?.as_str()?.to_string();
                            Some(ExtractedEntity {
                                name,
                                entity_type: e.get("type").and_then(Value::as_str).unwrap_or("concept").to_string(),
                                description: e.get("description").and_then(Value::as_str).unwrap_or_default().to_string(),
                                relationships: e
                                    .get("relationships")
                                    .and_then(Value::as_array)
                                    .map(|r| r.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
                                    .unwrap_or_default(),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .unwrap_or_default()
}

/// Fenced block first, else a top-level `{...}` lookup, else whole-string
/// parse — the same tolerance order as `ExecutionPlan::extract_from_text`.
fn extract_json_object(text: &str) -> Option<String> {
    if let Some(start) = text.find("```") {
        let after = start + 3;
        let body_start = text[after..].find('\n').map(|i| after + i + 1).unwrap_or(after);
        if let Some(end) = text[body_start..].find("```") {
            let candidate = text[body_start..body_start + end].trim();
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Some(candidate.to_string());
            }
        }
    }
    if let Some(brace_start) = text.find('{') {
        let mut depth = 0i32;
        for (offset, ch) in text[brace_start..].char_indices() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &text[brace_start..brace_start + offset + 1];
                        if serde_json::from_str::<Value>(candidate).is_ok() {
                            return Some(candidate.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }
    if serde_json::from_str::<Value>(text.trim()).is_ok() {
        return Some(text.trim().to_string());
    }
    None
}

#[derive(Clone)]
pub struct AgentRuntimeConfig {
    pub max_prompt_tokens: usize,
    pub tool_timeout_ms: Option<u64>,
    pub retry: RetryOptions,
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self { max_prompt_tokens: 4000, tool_timeout_ms: Some(30_000), retry: RetryOptions::default() }
    }
}

/// Per-agent memory plumbing: shared so the contextual memory builder and
/// the runtime's post-task write share one lock (spec §5: "all state
/// mutations are serialized" inside one memory manager).
pub struct AgentMemory {
    pub manager: Mutex<MemoryManager>,
    pub context_builder: Mutex<ContextBuilder>,
}

/// Executes tasks for a fixed roster of agents against shared LLM/tool/rate
/// collaborators (spec §4.G). One instance typically backs one crew run.
pub struct AgentRuntime {
    agents: HashMap<String, Agent>,
    llms: HashMap<String, Arc<dyn LlmPort>>,
    tools: HashMap<String, Arc<dyn ToolPort>>,
    rate_controller: Arc<RateController>,
    memory: HashMap<String, Arc<AgentMemory>>,
    evaluator: Option<Arc<dyn OutputEvaluator>>,
    config: AgentRuntimeConfig,
}

impl AgentRuntime {
    pub fn new(
        agents: Vec<Agent>,
        llms: HashMap<String, Arc<dyn LlmPort>>,
        tools: HashMap<String, Arc<dyn ToolPort>>,
        rate_controller: Arc<RateController>,
        config: AgentRuntimeConfig,
    ) -> Self {
        Self {
            agents: agents.into_iter().map(|a| (a.id.clone(), a)).collect(),
            llms,
            tools,
            rate_controller,
            memory: HashMap::new(),
            evaluator: None,
            config,
        }
    }

    pub fn with_memory(mut self, agent_id: impl Into<String>, memory: Arc<AgentMemory>) -> Self {
        self.memory.insert(agent_id.into(), memory);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn OutputEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    fn agent(&self, id: &str) -> CoreResult<&Agent> {
        self.agents.get(id).ok_or_else(|| CoreError::configuration(format!("unknown agent {id}")))
    }

    fn llm(&self, agent: &Agent) -> CoreResult<Arc<dyn LlmPort>> {
        self.llms
            .get(&agent.llm_ref)
            .cloned()
            .ok_or_else(|| CoreError::configuration(format!("no llm port registered for {}", agent.llm_ref)))
    }

    /// Delegation tool descriptors: one per other agent, synthesized from
    /// its role/goal, built only when `allow_delegation` is set (spec §4.G
    /// "Delegation").
    fn delegation_tool_schemas(&self, agent: &Agent) -> Vec<Value> {
        if !agent.allow_delegation {
            return Vec::new();
        }
        self.agents
            .values()
            .filter(|other| other.id != agent.id)
            .map(|other| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": format!("delegate_to_{}", other.id),
                        "description": format!(
                            "Delegate a sub-task to the coworker whose role is '{}' and whose goal is '{}'.",
                            other.role_template(), other.goal_template()
                        ),
                        "parameters": {
                            "type": "object",
                            "properties": {
                                "task": {"type": "string", "description": "The sub-task description to delegate"}
                            },
                            "required": ["task"]
                        }
                    }
                })
            })
            .collect()
    }

    /// Step 1: `task.contextSeeds`, then `extraContext`, then the
    /// contextual-memory-builder output (if `memoryEnabled`), blank-line
    /// joined.
    async fn assemble_context(&self, agent: &Agent, task: &Task, extra_context: &str) -> String {
        let mut parts: Vec<String> = task.context_seeds.clone();
        if !extra_context.is_empty() {
            parts.push(extra_context.to_string());
        }
        if agent.memory_enabled {
            if let Some(mem) = self.memory.get(&agent.id) {
                let manager = mem.manager.lock().await;
                let mut builder = mem.context_builder.lock().await;
                let built = builder.build(task, &manager, None);
                if !built.is_empty() {
                    parts.push(built);
                }
            }
        }
        parts.join("\n\n")
    }

    /// Runs the bounded tool-call loop against `llm`, returning the final
    /// answer text, the number of iterations spent, and accumulated token
    /// usage (spec §4.G step 3).
    async fn run_tool_loop(
        &self,
        agent: &Agent,
        llm: &Arc<dyn LlmPort>,
        system_prompt: String,
        cancel: CancellationToken,
    ) -> CoreResult<(String, u32, TokenUsage)> {
        let tool_schemas = self.tool_schema_list(agent);
        let mut messages = vec![Message::system(system_prompt)];
        let mut usage = TokenUsage::default();
        let mut last_tool_call: Option<String> = None;

        for iteration in 1..=agent.max_iterations.max(1) as u32 {
            let options = CompletionOptions { tool_schemas: tool_schemas.clone(), ..Default::default() };
            let llm = llm.clone();
            let messages_snapshot = messages.clone();
            let cancel_for_call = cancel.clone();
            let completion = retry::run(
                move || {
                    let llm = llm.clone();
                    let messages_snapshot = messages_snapshot.clone();
                    let options = options.clone();
                    async move { llm.complete(&messages_snapshot, &options).await }
                },
                RetryOptions { cancel: Some(cancel_for_call), ..self.config.retry.clone() },
            )
            .await
            .map_err(|e| e.last_error)?;
            usage = usage.add(completion.usage());

            let tool_call = parse_tool_call(&completion.content);
            match tool_call {
                None => return Ok((completion.content, iteration, usage)),
                Some((tool_name, tool_input)) => {
                    if last_tool_call.as_deref() == Some(tool_name.as_str()) && iteration > 1 {
                        // Same tool invoked twice in a row with an unchanged
                        // transcript: treat the latest answer as final
                        // rather than spin further (react.rs redundant-call
                        // guard, generalized from action-equality to
                        // name-equality since we don't diff full call args
                        // here).
                        return Ok((completion.content, iteration, usage));
                    }
                    last_tool_call = Some(tool_name.clone());
                    messages.push(Message::assistant(completion.content.clone()));

                    if let Some(delegate_agent_id) = tool_name.strip_prefix("delegate_to_") {
                        let observation = self.run_delegation(delegate_agent_id, &tool_input, cancel.clone()).await;
                        messages.push(Message { role: crate::ports::Role::Tool, content: observation, name: Some(tool_name) });
                        continue;
                    }

                    let observation = self.call_tool(agent, &tool_name, tool_input, cancel.clone()).await;
                    let truncated = truncate_text(&observation, TruncationPolicy::Bytes(1500));
                    messages.push(Message { role: crate::ports::Role::Tool, content: truncated, name: Some(tool_name) });
                }
            }
        }

        Err(CoreError::ToolExecution {
            tool_name: "agent_loop".to_string(),
            agent_id: agent.id.clone(),
            message: format!("reached maximum iterations ({})", agent.max_iterations),
        })
    }

    fn tool_schema_list(&self, agent: &Agent) -> Vec<Value> {
        let mut schemas: Vec<Value> = agent
            .tool_refs
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.schema().unwrap_or_else(|| serde_json::json!({"type": "object"})),
                    }
                })
            })
            .collect();
        schemas.extend(self.delegation_tool_schemas(agent));
        schemas
    }

    async fn call_tool(&self, agent: &Agent, tool_name: &str, input: Value, cancel: CancellationToken) -> String {
        let Some(tool) = self.tools.get(tool_name) else {
            return format!("error: no tool registered named '{tool_name}'");
        };
        let options = ToolCallOptions { timeout_ms: self.config.tool_timeout_ms };
        let tool = tool.clone();
        let result = retry::run(
            move || {
                let tool = tool.clone();
                let input = input.clone();
                let options = options.clone();
                async move { tool.execute(input, &options).await }
            },
            RetryOptions { max_attempts: 1, cancel: Some(cancel), ..Default::default() },
        )
        .await;

        match result {
            Ok(tool_result) if tool_result.success => tool_result.result.to_string(),
            Ok(tool_result) => format!("error: {}", tool_result.error.unwrap_or_else(|| "tool reported failure".to_string())),
            Err(err) => {
                tracing::warn!(agent_id = %agent.id, tool = %tool_name, error = %err.last_error, "tool call failed");
                format!("error: {}", err.last_error)
            }
        }
    }

    async fn run_delegation(&self, delegate_agent_id: &str, input: &Value, cancel: CancellationToken) -> String {
        if self.agent(delegate_agent_id).is_err() {
            return format!("error: no such coworker '{delegate_agent_id}'");
        }
        let description = input.get("task").and_then(Value::as_str).unwrap_or("").to_string();
        let sub_task = Task::new(format!("delegate-{delegate_agent_id}"), description, delegate_agent_id.to_string());
        match self.execute(&sub_task, "", cancel).await {
            Ok(output) => output.result,
            Err(e) => format!("error: delegated task failed: {e}"),
        }
    }

    /// Step 5: short-term write always; long-term write (with the
    /// evaluator's entities) only when both memory is enabled and a
    /// long-term-capable manager is configured for this agent.
    async fn record_memory(&self, agent: &Agent, task: &Task, output: &str) {
        if !agent.memory_enabled {
            return;
        }
        let Some(mem) = self.memory.get(&agent.id) else { return };

        {
            let mut manager = mem.manager.lock().await;
            manager.add_short_term(MemoryEntry::new(output.to_string(), MemoryKind::Result));
        }

        let Some(evaluator) = &self.evaluator else { return };
        let evaluated = match evaluator.evaluate(task, output).await {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(agent_id = %agent.id, error = %e, "output evaluation failed, skipping long-term write");
                return;
            }
        };

        let mut manager = mem.manager.lock().await;
        let mut entry = MemoryEntry::new(output.to_string(), MemoryKind::Reflection).with_importance(evaluated.quality);
        entry.metadata.insert("suggestions".to_string(), serde_json::json!(evaluated.suggestions));
        if let Err(e) = manager.add_long_term(entry).await {
            tracing::warn!(agent_id = %agent.id, error = %e, "long-term memory write failed");
        }
        for entity in &evaluated.entities {
            let mut attrs = HashMap::new();
            attrs.insert("description".to_string(), Value::String(entity.description.clone()));
            manager.add_or_update_entity(&entity.name, &entity.entity_type, attrs);
        }
    }
}

fn parse_tool_call(content: &str) -> Option<(String, Value)> {
    let value: Value = serde_json::from_str(content.trim()).ok()?;
    let name = value.get("tool").or_else(|| value.get("tool_name"))?.as_str()?.to_string();
    let input = value.get("input").or_else(|| value.get("arguments")).cloned().unwrap_or(Value::Null);
    Some((name, input))
}

#[async_trait]
impl TaskExecutor for AgentRuntime {
    async fn execute(&self, task: &Task, extra_context: &str, cancel: CancellationToken) -> CoreResult<TaskOutput> {
        let start = std::time::Instant::now();
        let agent = self.agent(&task.agent_ref)?;
        let llm = self.llm(agent)?;

        let context = self.assemble_context(agent, task, extra_context).await;
        let variables = self.build_prompt_variables(agent, task, &context);
        let system_prompt = prompt::render_with_budget(&variables, self.config.max_prompt_tokens, |text| llm.count_tokens(text));

        self.rate_controller.admit(task.priority, &cancel).await?;
        let loop_result = self.run_tool_loop(agent, &llm, system_prompt, cancel.clone()).await;
        self.rate_controller.mark_completed(None);

        let (final_text, iterations, usage) = match loop_result {
            Ok(v) => v,
            Err(e) => {
                self.rate_controller.mark_throttled();
                return Err(e);
            }
        };

        let formatted = serde_json::from_str::<Value>(final_text.trim()).ok();
        self.record_memory(agent, task, &final_text).await;

        let metadata = TaskOutputMetadata {
            task_id: task.id.clone(),
            agent_id: agent.id.clone(),
            execution_time_ms: start.elapsed().as_millis() as u64,
            token_usage: Some(usage),
            iterations: Some(iterations),
            cache_hit: if task.caching_strategy == CachingStrategy::Memory { Some(false) } else { None },
            retries: None,
        };

        let mut output = TaskOutput::new(final_text, metadata);
        output.formatted = formatted;
        Ok(output)
    }
}

impl AgentRuntime {
    fn build_prompt_variables(&self, agent: &Agent, task: &Task, context: &str) -> Vec<PromptVariable> {
        let interpolated = agent.interpolate(&HashMap::new());
        vec![
            PromptVariable::new("role", interpolated.role, 3),
            PromptVariable::new("goal", interpolated.goal, 3),
            PromptVariable::new("backstory", interpolated.backstory.unwrap_or_default(), 1),
            PromptVariable::new("task", task.description.clone(), 3),
            PromptVariable::new(
                "expected_output",
                task.expected_output.clone().unwrap_or_default(),
                2,
            ),
            PromptVariable::new("context", context.to_string(), 2),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextBuilderConfig;
    use crate::memory::MemoryManagerConfig;
    use crate::model::Priority;
    use crate::ports::{Completion, FinishReason, InMemoryStorage, ToolResult};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoLlm;

    #[async_trait]
    impl LlmPort for EchoLlm {
        async fn complete(&self, messages: &[Message], _options: &CompletionOptions) -> CoreResult<Completion> {
            let last_user = messages.iter().rev().find(|m| matches!(m.role, crate::ports::Role::System)).map(|m| m.content.clone()).unwrap_or_default();
            Ok(Completion {
                content: format!("answer based on: {}", last_user.len()),
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    fn runtime(agent: Agent) -> AgentRuntime {
        let mut llms: HashMap<String, Arc<dyn LlmPort>> = HashMap::new();
        llms.insert("llm1".to_string(), Arc::new(EchoLlm));
        AgentRuntime::new(vec![agent], llms, HashMap::new(), Arc::new(RateController::new(Default::default())), AgentRuntimeConfig::default())
    }

    #[tokio::test]
    async fn execute_returns_output_tied_to_task_and_agent() {
        let agent = Agent::new("a1", "Researcher", "Find things out", "llm1");
        let rt = runtime(agent);
        let task = Task::new("t1", "investigate", "a1").with_priority(Priority::Medium);
        let out = rt.execute(&task, "", CancellationToken::new()).await.unwrap();
        assert_eq!(out.metadata.task_id, "t1");
        assert_eq!(out.metadata.agent_id, "a1");
        assert!(out.metadata.iterations.unwrap_or(0) >= 1);
    }

    #[tokio::test]
    async fn unknown_agent_is_a_configuration_error() {
        let agent = Agent::new("a1", "Researcher", "Find things out", "llm1");
        let rt = runtime(agent);
        let task = Task::new("t1", "investigate", "missing-agent");
        let err = rt.execute(&task, "", CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.code(), "configuration");
    }

    #[tokio::test]
    async fn memory_enabled_agent_writes_short_term_entry() {
        let agent = Agent::new("a1", "Researcher", "Find things out", "llm1");
        let mut llms: HashMap<String, Arc<dyn LlmPort>> = HashMap::new();
        llms.insert("llm1".to_string(), Arc::new(EchoLlm));
        let memory = Arc::new(AgentMemory {
            manager: Mutex::new(MemoryManager::new("crew1", Arc::new(InMemoryStorage::new()), MemoryManagerConfig::default())),
            context_builder: Mutex::new(ContextBuilder::new(ContextBuilderConfig::default())),
        });
        let rt = AgentRuntime::new(
            vec![agent],
            llms,
            HashMap::new(),
            Arc::new(RateController::new(Default::default())),
            AgentRuntimeConfig::default(),
        )
        .with_memory("a1", memory.clone());

        let task = Task::new("t1", "investigate", "a1");
        rt.execute(&task, "", CancellationToken::new()).await.unwrap();
        let manager = memory.manager.lock().await;
        assert_eq!(manager.short_term_entries().count(), 1);
    }

    #[test]
    fn parse_tool_call_reads_tool_and_input() {
        let parsed = parse_tool_call(r#"{"tool": "search", "input": {"q": "rust"}}"#);
        let (name, input) = parsed.unwrap();
        assert_eq!(name, "search");
        assert_eq!(input["q"], "rust");
    }

    #[test]
    fn parse_tool_call_returns_none_for_plain_text() {
        assert!(parse_tool_call("just a regular final answer").is_none());
    }

    #[tokio::test]
    async fn tool_loop_invokes_registered_tool_and_truncates_observation() {
        struct ToolCallingLlm(Arc<AtomicU32>);
        #[async_trait]
        impl LlmPort for ToolCallingLlm {
            async fn complete(&self, messages: &[Message], _options: &CompletionOptions) -> CoreResult<Completion> {
                let n = self.0.fetch_add(1, Ordering::SeqCst);
                let content = if n == 0 {
                    r#"{"tool": "search", "input": {"q": "rust"}}"#.to_string()
                } else {
                    format!("final answer after {} messages", messages.len())
                };
                Ok(Completion { content, prompt_tokens: 1, completion_tokens: 1, total_tokens: 2, finish_reason: FinishReason::Stop })
            }
        }
        struct LongTool;
        #[async_trait]
        impl ToolPort for LongTool {
            fn name(&self) -> &str {
                "search"
            }
            fn description(&self) -> &str {
                "search the web"
            }
            async fn execute(&self, _input: Value, _options: &ToolCallOptions) -> CoreResult<ToolResult> {
                Ok(ToolResult {
                    success: true,
                    result: Value::String("x".repeat(5000)),
                    error: None,
                    execution_time_ms: 1,
                    cached: false,
                })
            }
        }

        let agent = Agent::new("a1", "Researcher", "Find things out", "llm1").with_tools(vec!["search".to_string()]);
        let mut llms: HashMap<String, Arc<dyn LlmPort>> = HashMap::new();
        llms.insert("llm1".to_string(), Arc::new(ToolCallingLlm(Arc::new(AtomicU32::new(0)))));
        let mut tools: HashMap<String, Arc<dyn ToolPort>> = HashMap::new();
        tools.insert("search".to_string(), Arc::new(LongTool));
        let rt = AgentRuntime::new(vec![agent], llms, tools, Arc::new(RateController::new(Default::default())), AgentRuntimeConfig::default());

        let task = Task::new("t1", "investigate", "a1");
        let out = rt.execute(&task, "", CancellationToken::new()).await.unwrap();
        assert!(out.result.starts_with("final answer"));
        assert_eq!(out.metadata.iterations, Some(2));
    }
}

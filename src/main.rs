//! Reference entry point for `crew_runtime`: assembles a minimal offline
//! crew (a single agent, a two-task chain) behind a deterministic stub LLM
//! port, runs it through the sequential process, and prints the resulting
//! `CrewOutput` as JSON.
//!
//! Grounded on the teacher's `src/main.rs` startup shape (tracing init,
//! then wire the runtime, then run) with the teacher's interactive REPL and
//! tool registry dropped: this crate is a library whose real entry points
//! are `crew::Crew` and the embedder/LLM/tool/storage ports a caller
//! supplies, so the binary here exists to prove the wiring compiles and
//! runs end to end rather than to be a product surface.

use async_trait::async_trait;
use crew_runtime::crew::{Crew, CrewConfig};
use crew_runtime::error::CoreResult;
use crew_runtime::model::{Agent, Task};
use crew_runtime::ports::{Completion, CompletionOptions, FinishReason, InMemoryStorage, LlmPort, Message, Role};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Deterministic offline stand-in for a real model client: echoes the
/// task description carried in the system prompt it was given.
struct StubLlm;

#[async_trait]
impl LlmPort for StubLlm {
    async fn complete(&self, messages: &[Message], _options: &CompletionOptions) -> CoreResult<Completion> {
        let prompt = messages
            .iter()
            .find(|m| matches!(m.role, Role::System))
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let task = prompt.lines().find_map(|l| l.strip_prefix("Task: ")).unwrap_or("");
        Ok(Completion {
            content: format!("executed:{task}"),
            prompt_tokens: prompt.len() as u32 / 4,
            completion_tokens: 8,
            total_tokens: prompt.len() as u32 / 4 + 8,
            finish_reason: FinishReason::Stop,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crew_runtime::telemetry::init_tracing();

    let agent = Agent::new("researcher", "Researcher", "Investigate the given topic thoroughly", "stub-llm");
    let tasks = vec![
        Task::new("research", "Research the topic", "researcher"),
        Task::new("summarize", "Summarize the findings", "researcher").with_dependencies(["research".to_string()]),
    ];

    let mut llms: HashMap<String, Arc<dyn LlmPort>> = HashMap::new();
    llms.insert("stub-llm".to_string(), Arc::new(StubLlm));

    let crew = Crew::new(
        "demo-crew",
        vec![agent],
        tasks,
        llms,
        HashMap::new(),
        Arc::new(InMemoryStorage::new()),
        CrewConfig::default(),
    )?;

    info!("running demo crew");
    let output = crew.run().await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

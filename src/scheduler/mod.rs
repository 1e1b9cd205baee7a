//! Task Scheduler & Dependency Resolver (spec §4.F): priority queue +
//! dependency DAG + a bounded concurrency pool, dispatched cooperatively.
//!
//! Grounded on the teacher's `orchestrator/queue.rs` for the task lifecycle
//! and attempt bookkeeping (generalized here from a durable single-queue
//! store into an in-process dependency-aware scheduler), and on
//! `rate::controller::RateController`'s `BinaryHeap<Waiter>` pattern for the
//! `ready` queue (priority desc, enqueue order asc).

use crate::error::{CoreError, CoreResult};
use crate::model::{Priority, Task, TaskOutput};
use crate::retry::{self, RetryOptions};
use async_trait::async_trait;
use lru::LruCache;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Executes one task end to end (spec §4.G `execute(task, extraContext) →
/// TaskOutput`). The scheduler treats this as an opaque collaborator so it
/// can be backed by the real agent runtime or a test double.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, extra_context: &str, cancel: CancellationToken) -> CoreResult<TaskOutput>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Waiting,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    PropagateToDependents,
    DropSilently,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerMetrics {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    /// Exponential moving average (alpha = 0.2) of per-task processing time.
    pub avg_processing_time_ms: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    /// Cache size for `cachingStrategy == memory` task results, keyed by
    /// task description (spec §3 Task `cachingStrategy`).
    pub memory_cache_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { concurrency: 5, failure_policy: FailurePolicy::PropagateToDependents, memory_cache_size: 256 }
    }
}

struct TaskRecord {
    task: Task,
    extra_context: String,
    state: TaskState,
    pending_deps: usize,
}

#[derive(Eq, PartialEq)]
struct ReadyItem {
    priority: Priority,
    seq: u64,
    id: String,
}

impl Ord for ReadyItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    tasks: HashMap<String, TaskRecord>,
    ready: BinaryHeap<ReadyItem>,
    dependents: HashMap<String, HashSet<String>>,
    running: HashSet<String>,
    outputs: HashMap<String, CoreResult<TaskOutput>>,
    completion_order: Vec<String>,
    paused: bool,
    next_seq: u64,
    metrics: SchedulerMetrics,
    result_cache: LruCache<String, TaskOutput>,
}

/// Priority + dependency-DAG scheduler over a bounded concurrency pool
/// (spec §4.F). One instance drives one crew run (or one logical stage of
/// one, e.g. an async suffix or a hierarchical parallel group).
pub struct Scheduler {
    executor: Arc<dyn TaskExecutor>,
    config: SchedulerConfig,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
    resume_notify: Notify,
}

impl Scheduler {
    pub fn new(executor: Arc<dyn TaskExecutor>, config: SchedulerConfig, cancel: CancellationToken) -> Self {
        let capacity = NonZeroUsize::new(config.memory_cache_size.max(1)).unwrap();
        Self {
            executor,
            config,
            cancel,
            inner: Mutex::new(Inner {
                tasks: HashMap::new(),
                ready: BinaryHeap::new(),
                dependents: HashMap::new(),
                running: HashSet::new(),
                outputs: HashMap::new(),
                completion_order: Vec::new(),
                paused: false,
                next_seq: 0,
                metrics: SchedulerMetrics::default(),
                result_cache: LruCache::new(capacity),
            }),
            resume_notify: Notify::new(),
        }
    }

    /// Submits `task`, rejecting a duplicate id. Dependencies already
    /// submitted and completed don't block it; anything else (not yet
    /// completed, or not yet submitted at all) does.
    pub async fn submit(&self, task: Task, extra_context: impl Into<String>) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.tasks.contains_key(&task.id) {
            return Err(CoreError::validation(format!("task {} already submitted", task.id)));
        }

        let unmet: Vec<String> = task
            .dependencies
            .iter()
            .filter(|dep| !matches!(inner.tasks.get(dep.as_str()).map(|r| r.state), Some(TaskState::Completed)))
            .cloned()
            .collect();

        let id = task.id.clone();
        let priority = task.priority;
        for dep in &unmet {
            inner.dependents.entry(dep.clone()).or_default().insert(id.clone());
        }
        let state = if unmet.is_empty() { TaskState::Ready } else { TaskState::Waiting };
        let pending_deps = unmet.len();
        inner.tasks.insert(id.clone(), TaskRecord { task, extra_context: extra_context.into(), state, pending_deps });
        if pending_deps == 0 {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.ready.push(ReadyItem { priority, seq, id });
        }
        Ok(())
    }

    pub async fn pause(&self) {
        self.inner.lock().await.paused = true;
    }

    pub async fn resume(&self) {
        self.inner.lock().await.paused = false;
        self.resume_notify.notify_waiters();
    }

    /// Rejects every non-running task with `Cancelled` and cancels the
    /// shared token so in-flight attempts abort at their next suspension
    /// point. Running tasks still complete but their results are discarded
    /// in `complete()` (spec §5 "Cancellation").
    pub async fn cancel_all(&self) {
        self.cancel.cancel();
        let mut inner = self.inner.lock().await;
        let ids: Vec<String> = inner
            .tasks
            .iter()
            .filter(|(_, r)| matches!(r.state, TaskState::Waiting | TaskState::Ready))
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            if let Some(record) = inner.tasks.get_mut(&id) {
                record.state = TaskState::Cancelled;
            }
            inner.outputs.insert(id.clone(), Err(CoreError::Cancelled));
            inner.completion_order.push(id);
            inner.metrics.tasks_cancelled += 1;
        }
        inner.ready.clear();
        self.resume_notify.notify_waiters();
    }

    /// Runs the dispatch loop until every submitted task reaches a terminal
    /// state (spec §4.F "drain completes when tasks.size == 0").
    pub async fn drain(&self) -> CoreResult<()> {
        let mut joins: JoinSet<(String, u64, CoreResult<TaskOutput>)> = JoinSet::new();

        loop {
            loop {
                let dispatched = self.try_dispatch(&mut joins).await?;
                if !dispatched {
                    break;
                }
            }

            if joins.is_empty() {
                let inner = self.inner.lock().await;
                let all_terminal = inner
                    .tasks
                    .values()
                    .all(|r| matches!(r.state, TaskState::Completed | TaskState::Failed | TaskState::Cancelled));
                if all_terminal {
                    return Ok(());
                }
                let paused = inner.paused;
                drop(inner);
                if paused {
                    tokio::select! {
                        _ = self.cancel.cancelled() => { self.cancel_all().await; return Ok(()); }
                        _ = self.resume_notify.notified() => { continue; }
                    }
                }
                return Err(CoreError::validation(
                    "scheduler stalled: waiting tasks whose dependencies were never submitted",
                ));
            }

            if let Some(joined) = joins.join_next().await {
                let (id, elapsed_ms, result) = joined.map_err(|e| CoreError::TaskExecution {
                    task_id: "unknown".into(),
                    agent_id: "unknown".into(),
                    message: format!("scheduler join error: {e}"),
                    attempts: 0,
                })?;
                self.complete(id, elapsed_ms, result).await;
            }
        }
    }

    async fn try_dispatch(&self, joins: &mut JoinSet<(String, u64, CoreResult<TaskOutput>)>) -> CoreResult<bool> {
        let dispatch = {
            let mut inner = self.inner.lock().await;
            if inner.paused || inner.running.len() >= self.config.concurrency {
                None
            } else if let Some(item) = inner.ready.pop() {
                let task = inner.tasks.get(&item.id).unwrap().task.clone();
                let cached = inner.result_cache.get(&task.description).cloned();
                if let Some(record) = inner.tasks.get_mut(&item.id) {
                    record.state = TaskState::Running;
                }
                inner.running.insert(item.id.clone());
                let extra_context = inner.tasks.get(&item.id).unwrap().extra_context.clone();
                Some((item.id, task, extra_context, cached))
            } else {
                None
            }
        };

        let Some((id, task, extra_context, cached)) = dispatch else {
            return Ok(false);
        };

        if let Some(cached_output) = cached {
            if task.caching_strategy == crate::model::CachingStrategy::Memory {
                tracing::debug!(task_id = %id, "memory cache hit, skipping execution");
                let mut output = cached_output;
                output.metadata.cache_hit = Some(true);
                self.complete(id, 0, Ok(output)).await;
                return Ok(true);
            }
        }

        let executor = self.executor.clone();
        let cancel = self.cancel.clone();
        let max_attempts = task.max_retries.max(1);
        let timeout_ms = task.timeout_ms;
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count2 = attempt_count.clone();
        let task_id = task.id.clone();
        let agent_id = task.agent_ref.clone();

        joins.spawn(async move {
            let start = Instant::now();
            let op = || {
                attempt_count2.fetch_add(1, AtomicOrdering::SeqCst);
                let executor = executor.clone();
                let task = task.clone();
                let extra_context = extra_context.clone();
                let cancel = cancel.clone();
                async move { executor.execute(&task, &extra_context, cancel).await }
            };
            let retry_options = RetryOptions {
                max_attempts,
                timeout_ms,
                cancel: Some(cancel.clone()),
                ..RetryOptions::default()
            };
            let result = retry::run(op, retry_options).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            let retries = attempt_count.load(AtomicOrdering::SeqCst).saturating_sub(1);
            match result {
                Ok(mut output) => {
                    if retries > 0 {
                        output.metadata.retries = Some(retries);
                    }
                    (task_id, elapsed_ms, Ok(output))
                }
                Err(retry_err) => {
                    let error = if retry_err.last_error.code() == "cancelled" {
                        CoreError::Cancelled
                    } else {
                        CoreError::TaskExecution {
                            task_id: task_id.clone(),
                            agent_id,
                            message: retry_err.last_error.to_string(),
                            attempts: retry_err.attempts,
                        }
                    };
                    (task_id, elapsed_ms, Err(error))
                }
            }
        });

        Ok(true)
    }

    async fn complete(&self, id: String, elapsed_ms: u64, mut result: CoreResult<TaskOutput>) {
        let mut inner = self.inner.lock().await;
        inner.running.remove(&id);

        let discard_for_cancel = self.cancel.is_cancelled()
            && !matches!(inner.tasks.get(&id).map(|r| r.state), Some(TaskState::Cancelled));
        if discard_for_cancel {
            result = Err(CoreError::Cancelled);
        }

        let alpha = 0.2;
        if inner.metrics.avg_processing_time_ms == 0.0 {
            inner.metrics.avg_processing_time_ms = elapsed_ms as f64;
        } else {
            inner.metrics.avg_processing_time_ms =
                alpha * elapsed_ms as f64 + (1.0 - alpha) * inner.metrics.avg_processing_time_ms;
        }

        let new_state = match &result {
            Ok(_) => TaskState::Completed,
            Err(CoreError::Cancelled) => TaskState::Cancelled,
            Err(_) => TaskState::Failed,
        };
        match new_state {
            TaskState::Completed => inner.metrics.tasks_completed += 1,
            TaskState::Cancelled => inner.metrics.tasks_cancelled += 1,
            TaskState::Failed => inner.metrics.tasks_failed += 1,
            _ => unreachable!(),
        }

        let cache_key = inner.tasks.get(&id).filter(|r| r.task.caching_strategy == crate::model::CachingStrategy::Memory).map(|r| r.task.description.clone());
        if let (Some(key), Ok(output)) = (cache_key, &result) {
            inner.result_cache.put(key, output.clone());
        }

        if let Some(record) = inner.tasks.get_mut(&id) {
            record.state = new_state;
        }
        inner.completion_order.push(id.clone());
        inner.outputs.insert(id.clone(), result.clone());

        let failed = result.is_err();
        let dependents = inner.dependents.get(&id).cloned().unwrap_or_default();
        if failed && self.config.failure_policy == FailurePolicy::PropagateToDependents {
            for dep_id in dependents {
                self.reject_transitively(&mut inner, &dep_id, &id);
            }
        } else {
            for dep_id in dependents {
                let mut became_ready = None;
                if let Some(dep_record) = inner.tasks.get_mut(&dep_id) {
                    if dep_record.pending_deps > 0 {
                        dep_record.pending_deps -= 1;
                    }
                    if dep_record.pending_deps == 0 && dep_record.state == TaskState::Waiting {
                        dep_record.state = TaskState::Ready;
                        became_ready = Some(dep_record.task.priority);
                    }
                }
                if let Some(priority) = became_ready {
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    inner.ready.push(ReadyItem { priority, seq, id: dep_id });
                }
            }
        }
    }

    /// Marks `dep_id` (and everything transitively depending on it) Failed
    /// with an error naming the upstream failure, per the default
    /// propagate-to-dependents failure policy (spec §4.F).
    fn reject_transitively(&self, inner: &mut Inner, dep_id: &str, upstream_failed: &str) {
        if !matches!(inner.tasks.get(dep_id).map(|r| r.state), Some(TaskState::Waiting)) {
            return;
        }
        let agent_id = inner.tasks.get(dep_id).map(|r| r.task.agent_ref.clone()).unwrap_or_default();
        if let Some(record) = inner.tasks.get_mut(dep_id) {
            record.state = TaskState::Failed;
        }
        inner.outputs.insert(
            dep_id.to_string(),
            Err(CoreError::TaskExecution {
                task_id: dep_id.to_string(),
                agent_id,
                message: format!("upstream dependency {upstream_failed} failed"),
                attempts: 0,
            }),
        );
        inner.completion_order.push(dep_id.to_string());
        inner.metrics.tasks_failed += 1;

        let further = inner.dependents.get(dep_id).cloned().unwrap_or_default();
        for next_id in further {
            self.reject_transitively(inner, &next_id, upstream_failed);
        }
    }

    pub async fn output(&self, id: &str) -> Option<CoreResult<TaskOutput>> {
        self.inner.lock().await.outputs.get(id).cloned()
    }

    pub async fn completion_order(&self) -> Vec<String> {
        self.inner.lock().await.completion_order.clone()
    }

    pub async fn metrics(&self) -> SchedulerMetrics {
        self.inner.lock().await.metrics.clone()
    }

    pub async fn task_count(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskOutputMetadata;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoExecutor;

    #[async_trait]
    impl TaskExecutor for EchoExecutor {
        async fn execute(&self, task: &Task, extra_context: &str, _cancel: CancellationToken) -> CoreResult<TaskOutput> {
            Ok(TaskOutput::new(
                format!("executed:{}", task.description),
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
            .with_formatted_none_and_context(extra_context))
        }
    }

    // Small helper kept local to tests to avoid widening TaskOutput's public
    // surface just to assert on the context an executor observed.
    trait WithContext {
        fn with_formatted_none_and_context(self, ctx: &str) -> Self;
    }
    impl WithContext for TaskOutput {
        fn with_formatted_none_and_context(mut self, ctx: &str) -> Self {
            if !ctx.is_empty() {
                self.formatted = Some(serde_json::json!({ "seen_context": ctx }));
            }
            self
        }
    }

    fn scheduler(executor: Arc<dyn TaskExecutor>) -> Scheduler {
        Scheduler::new(executor, SchedulerConfig::default(), CancellationToken::new())
    }

    #[tokio::test]
    async fn schedule_then_drain_yields_matching_task_id() {
        let sched = scheduler(Arc::new(EchoExecutor));
        sched.submit(Task::new("t1", "do a thing", "a1"), "").await.unwrap();
        sched.drain().await.unwrap();
        let out = sched.output("t1").await.unwrap().unwrap();
        assert_eq!(out.metadata.task_id, "t1");
    }

    #[tokio::test]
    async fn completion_order_respects_dependencies() {
        let sched = scheduler(Arc::new(EchoExecutor));
        sched.submit(Task::new("t2", "second", "a1").with_dependencies(["t1".to_string()]), "").await.unwrap();
        sched.submit(Task::new("t1", "first", "a1"), "").await.unwrap();
        sched.drain().await.unwrap();
        let order = sched.completion_order().await;
        assert_eq!(order, vec!["t1".to_string(), "t2".to_string()]);
    }

    #[tokio::test]
    async fn running_never_exceeds_concurrency() {
        struct CountingExecutor {
            concurrent: Arc<AtomicU32>,
            max_seen: Arc<AtomicU32>,
        }
        #[async_trait]
        impl TaskExecutor for CountingExecutor {
            async fn execute(&self, task: &Task, _ctx: &str, _cancel: CancellationToken) -> CoreResult<TaskOutput> {
                let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                self.concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(TaskOutput::new(
                    "ok",
                    TaskOutputMetadata {
                        task_id: task.id.clone(),
                        agent_id: task.agent_ref.clone(),
                        execution_time_ms: 5,
                        token_usage: None,
                        iterations: None,
                        cache_hit: None,
                        retries: None,
                    },
                ))
            }
        }
        let max_seen = Arc::new(AtomicU32::new(0));
        let executor = Arc::new(CountingExecutor { concurrent: Arc::new(AtomicU32::new(0)), max_seen: max_seen.clone() });
        let config = SchedulerConfig { concurrency: 2, ..SchedulerConfig::default() };
        let sched = Scheduler::new(executor, config, CancellationToken::new());
        for i in 0..6 {
            sched.submit(Task::new(format!("t{i}"), "d", "a1"), "").await.unwrap();
        }
        sched.drain().await.unwrap();
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failed_dependency_propagates_to_dependents() {
        struct FailingExecutor;
        #[async_trait]
        impl TaskExecutor for FailingExecutor {
            async fn execute(&self, task: &Task, _ctx: &str, _cancel: CancellationToken) -> CoreResult<TaskOutput> {
                Err(CoreError::TaskExecution {
                    task_id: task.id.clone(),
                    agent_id: task.agent_ref.clone(),
                    message: "boom".into(),
                    attempts: 1,
                })
            }
        }
        let sched = Scheduler::new(
            Arc::new(FailingExecutor),
            SchedulerConfig { concurrency: 5, failure_policy: FailurePolicy::PropagateToDependents, ..Default::default() },
            CancellationToken::new(),
        );
        sched.submit(Task::new("t1", "d1", "a1").with_async(false), "").await.unwrap();
        sched.submit(Task::new("t2", "d2", "a1").with_dependencies(["t1".to_string()]), "").await.unwrap();
        sched.drain().await.unwrap();
        assert!(sched.output("t1").await.unwrap().is_err());
        assert!(sched.output("t2").await.unwrap().is_err());
    }

    #[tokio::test]
    async fn cancel_all_rejects_pending_and_waiting() {
        let sched = scheduler(Arc::new(EchoExecutor));
        sched.pause().await;
        sched.submit(Task::new("t1", "d1", "a1"), "").await.unwrap();
        sched.cancel_all().await;
        let out = sched.output("t1").await.unwrap();
        assert_eq!(out.unwrap_err().code(), "cancelled");
    }

    #[tokio::test]
    async fn memory_caching_skips_execution_on_repeat_description() {
        struct CountingExecutor(Arc<AtomicU32>);
        #[async_trait]
        impl TaskExecutor for CountingExecutor {
            async fn execute(&self, task: &Task, _ctx: &str, _cancel: CancellationToken) -> CoreResult<TaskOutput> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(TaskOutput::new(
                    "r",
                    TaskOutputMetadata {
                        task_id: task.id.clone(),
                        agent_id: task.agent_ref.clone(),
                        execution_time_ms: 1,
                        token_usage: None,
                        iterations: None,
                        cache_hit: None,
                        retries: None,
                    },
                ))
            }
        }
        let calls = Arc::new(AtomicU32::new(0));
        let sched = Scheduler::new(Arc::new(CountingExecutor(calls.clone())), SchedulerConfig::default(), CancellationToken::new());

        let mut t1 = Task::new("t1", "same description", "a1");
        t1.caching_strategy = crate::model::CachingStrategy::Memory;
        sched.submit(t1, "").await.unwrap();
        sched.drain().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A later task with the same description and caching strategy, under
        // a fresh id, should hit the cache rather than invoke the executor.
        let mut t2 = Task::new("t2", "same description", "a1");
        t2.caching_strategy = crate::model::CachingStrategy::Memory;
        sched.submit(t2, "").await.unwrap();
        sched.drain().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let out = sched.output("t2").await.unwrap().unwrap();
        assert_eq!(out.metadata.cache_hit, Some(true));
    }
}

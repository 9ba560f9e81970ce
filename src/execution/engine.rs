//! Task Graph Execution Engine
//!
//! The engine that owns registered tasks and drives their execution:
//! - Condition evaluation and skip recording
//! - Concurrent, recursive dependency execution against one shared context
//! - Middleware and retries around every task body (see [`super::step`])
//! - Event-triggered executions
//!
//! Each top-level call gets its own [`Context`], a memo table guaranteeing
//! that every task runs at most once within that call, and an
//! [`ExecutionTimeline`].

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use super::resolver::resolve_dependencies;
use super::step::{execute_with_retries, RetryPolicy};
use crate::config::EngineConfig;
use crate::error::{Result, WorkflowError};
use crate::events::{EventBus, EventHandler};
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::context::EVENT_PAYLOAD_KEY;
use crate::workflow::validator::check_for_cycles;
use crate::workflow::{Context, Middleware, Task, TaskDefinition, TaskId, TaskRegistry};

/// Default total number of attempts per task.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default wait between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Outcome of one task: its result, or `None` when its condition was false.
pub type TaskOutcome = Result<Option<Value>>;

/// Construction-time engine settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Middleware applied around every task body, in order
    pub middlewares: Vec<Middleware>,
    /// Total attempts per task body, including the first
    pub max_retries: u32,
    /// Fixed wait between attempts
    pub retry_delay: Duration,
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget. Zero falls back to the default.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = if max_retries == 0 {
            DEFAULT_MAX_RETRIES
        } else {
            max_retries
        };
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            middlewares: Vec::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl From<EngineConfig> for EngineOptions {
    fn from(config: EngineConfig) -> Self {
        Self::default()
            .with_max_retries(config.max_retries)
            .with_retry_delay(Duration::from_millis(config.retry_delay_ms))
    }
}

/// Result of a top-level execution together with the state it produced.
#[derive(Debug)]
pub struct ExecutionReport {
    /// The task that was executed
    pub task_id: TaskId,
    /// Its result, skip sentinel, or the first unrecoverable failure
    pub outcome: TaskOutcome,
    /// The context shared by the whole dependency tree
    pub context: Context,
    /// Lifecycle events of every task that was touched
    pub timeline: ExecutionTimeline,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns true if the target task was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, Ok(None))
    }

    /// Number of body attempts made for a task during this execution.
    pub fn attempts(&self, task_id: &TaskId) -> u32 {
        self.timeline.attempts(task_id)
    }
}

/// Task graph execution engine.
///
/// Cloning an `Engine` yields another handle to the same registry,
/// middleware list and event bus.
///
/// # Example
///
/// ```rust,no_run
/// use serde_json::json;
/// use taskgraph::{Engine, EngineOptions, TaskDefinition};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = Engine::new(EngineOptions::default());
///
///     let fetch = engine.add_task(TaskDefinition::new("fetch", |ctx| async move {
///         ctx.set("fetched", true);
///         Ok(json!([1, 2, 3]))
///     }));
///     let report = engine.add_task(
///         TaskDefinition::new("report", |ctx| async move {
///             Ok(json!({ "fetched": ctx.get("fetched") }))
///         })
///         .depends_on(fetch),
///     );
///
///     let result = engine.execute(report, json!({})).await?;
///     println!("{:?}", result);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    registry: TaskRegistry,
    middlewares: RwLock<Vec<Middleware>>,
    events: EventBus,
    policy: RetryPolicy,
}

/// Per-call state shared by every task of one top-level execution.
struct ExecutionRun {
    context: Context,
    middlewares: Vec<Middleware>,
    memo: Mutex<HashMap<TaskId, Arc<OnceCell<TaskOutcome>>>>,
    /// Wait-for graph: task -> dependencies whose outcome it awaits
    waits: Mutex<HashMap<TaskId, Vec<TaskId>>>,
    timeline: Mutex<ExecutionTimeline>,
}

impl ExecutionRun {
    fn new(context: Context, middlewares: Vec<Middleware>) -> Self {
        Self {
            context,
            middlewares,
            memo: Mutex::new(HashMap::new()),
            waits: Mutex::new(HashMap::new()),
            timeline: Mutex::new(ExecutionTimeline::new()),
        }
    }

    /// Returns the memo cell of a task, creating it on first request.
    fn cell(&self, task_id: TaskId) -> Arc<OnceCell<TaskOutcome>> {
        Arc::clone(self.memo.lock().entry(task_id).or_default())
    }

    /// Records that `waiter` awaits `task_id`.
    ///
    /// Returns the cycle instead if `task_id` already waits on `waiter`,
    /// directly or through other tasks. The edge is not recorded then.
    fn wait_on(&self, waiter: TaskId, task_id: TaskId) -> Option<Vec<TaskId>> {
        let mut waits = self.waits.lock();

        if let Some(chain) = wait_chain(&waits, task_id, waiter) {
            let mut cycle = Vec::with_capacity(chain.len() + 1);
            cycle.push(waiter);
            cycle.extend(chain);
            return Some(cycle);
        }

        waits.entry(waiter).or_default().push(task_id);
        None
    }
}

/// Finds a chain of waits leading from `from` to `to`, both included.
fn wait_chain(
    waits: &HashMap<TaskId, Vec<TaskId>>,
    from: TaskId,
    to: TaskId,
) -> Option<Vec<TaskId>> {
    let mut seen = HashSet::new();
    let mut stack = vec![vec![from]];

    while let Some(chain) = stack.pop() {
        let Some(&last) = chain.last() else {
            continue;
        };
        if last == to {
            return Some(chain);
        }
        if !seen.insert(last) {
            continue;
        }
        for next in waits.get(&last).into_iter().flatten() {
            let mut extended = chain.clone();
            extended.push(*next);
            stack.push(extended);
        }
    }

    None
}

impl Engine {
    /// Creates an engine with the given options.
    pub fn new(options: EngineOptions) -> Self {
        let policy = options.retry_policy();
        Self {
            inner: Arc::new(EngineInner {
                registry: TaskRegistry::new(),
                middlewares: RwLock::new(options.middlewares),
                events: EventBus::new(),
                policy,
            }),
        }
    }

    /// Creates an engine from a loaded configuration.
    pub fn from_config(config: EngineConfig) -> Self {
        Self::new(config.into())
    }

    /// Registers a task and returns its newly assigned ID.
    ///
    /// One event handler is installed per trigger name. Dependency IDs are
    /// not checked until execution.
    pub fn add_task(&self, definition: TaskDefinition) -> TaskId {
        let task = self.inner.registry.register(definition);

        for trigger in &task.triggers {
            let handler = trigger_handler(Arc::downgrade(&self.inner), task.id);
            self.inner.events.on(trigger, handler);
            debug!("Task '{}' listens for event '{}'", task.name, trigger);
        }

        task.id
    }

    /// Gets a registered task by ID.
    pub fn task(&self, task_id: &TaskId) -> Result<Arc<Task>> {
        self.inner.registry.get(task_id)
    }

    /// Returns the registry of this engine.
    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    /// Appends a middleware, effective for executions started afterwards.
    pub fn use_middleware(&self, middleware: Middleware) {
        self.inner.middlewares.write().push(middleware);
    }

    /// Returns the number of registered middleware.
    pub fn middleware_count(&self) -> usize {
        self.inner.middlewares.read().len()
    }

    /// Returns the retry policy applied to task bodies.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    /// Executes a task and its dependency tree.
    ///
    /// `initial_data` must be a JSON object (or null) and seeds a fresh
    /// context. Returns the task's result, `None` if its condition was false,
    /// or the first unrecoverable failure of the tree.
    pub async fn execute(&self, task_id: TaskId, initial_data: Value) -> TaskOutcome {
        self.run(task_id, initial_data).await?.outcome
    }

    /// Executes a task and returns the outcome along with the context and
    /// timeline of the execution.
    ///
    /// Fails early, without a report, if the initial data is not an object,
    /// the task does not exist, or its dependency graph contains a cycle.
    pub async fn run(&self, task_id: TaskId, initial_data: Value) -> Result<ExecutionReport> {
        let context = Context::from_value(initial_data)?;
        let task = self.inner.registry.get(&task_id)?;

        check_for_cycles(&self.inner.registry, task_id, &context)?;

        info!("Starting execution of task '{}' ({})", task.name, task_id);

        let run = Arc::new(ExecutionRun::new(
            context.clone(),
            self.inner.middlewares.read().clone(),
        ));

        let outcome = run_task(Arc::clone(&self.inner), Arc::clone(&run), task_id, Vec::new()).await;

        let timeline = run.timeline.lock().clone();
        match &outcome {
            Ok(Some(_)) => info!(
                "Task '{}' completed in {:?}",
                task.name,
                timeline.elapsed()
            ),
            Ok(None) => info!("Task '{}' was skipped", task.name),
            Err(e) => error!("Execution of task '{}' failed: {}", task.name, e),
        }

        Ok(ExecutionReport {
            task_id,
            outcome,
            context,
            timeline,
        })
    }

    /// Adds an event handler.
    pub fn on(&self, event: &str, handler: EventHandler) {
        self.inner.events.on(event, handler);
    }

    /// Removes an event handler registered with the exact same handle.
    pub fn off(&self, event: &str, handler: &EventHandler) -> bool {
        self.inner.events.off(event, handler)
    }

    /// Emits an event without waiting for the executions it starts.
    ///
    /// Returns the number of handlers notified. Task triggers need an
    /// ambient tokio runtime to start their executions.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        self.inner.events.emit(event, payload)
    }

    /// Returns the event bus of this engine.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tasks", &self.inner.registry.len())
            .field("middlewares", &self.inner.middlewares.read().len())
            .field("policy", &self.inner.policy)
            .field("events", &self.inner.events)
            .finish()
    }
}

/// Builds the handler that starts `task_id` when one of its triggers fires.
///
/// Holds the engine weakly so registered triggers do not keep it alive.
fn trigger_handler(engine: Weak<EngineInner>, task_id: TaskId) -> EventHandler {
    Arc::new(move |payload: Value| {
        let Some(inner) = engine.upgrade() else {
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    "Dropping event for task {}: no async runtime available",
                    task_id
                );
                return;
            }
        };

        let mut seed = Map::new();
        seed.insert(EVENT_PAYLOAD_KEY.to_string(), payload);
        let engine = Engine { inner };

        runtime.spawn(async move {
            if let Err(e) = engine.execute(task_id, Value::Object(seed)).await {
                error!("Event-triggered execution of task {} failed: {}", task_id, e);
            }
        });
    })
}

/// Runs a task at most once per execution.
///
/// `path` holds the ancestors of this call; reaching one of them again is a
/// cycle, as is awaiting a task that already waits on the requester.
/// Concurrent requests for the same task await the same outcome, including
/// the `Aborted` outcome of a task that panicked.
fn run_task(
    inner: Arc<EngineInner>,
    run: Arc<ExecutionRun>,
    task_id: TaskId,
    path: Vec<TaskId>,
) -> BoxFuture<'static, TaskOutcome> {
    async move {
        if path.contains(&task_id) {
            let mut cycle = path;
            cycle.push(task_id);
            return Err(WorkflowError::CycleDetected { path: cycle });
        }

        if let Some(&waiter) = path.last() {
            if let Some(cycle) = run.wait_on(waiter, task_id) {
                return Err(WorkflowError::CycleDetected { path: cycle });
            }
        }

        let cell = run.cell(task_id);
        cell.get_or_init(|| {
            let execution = execute_task(inner, Arc::clone(&run), task_id, path);
            AssertUnwindSafe(execution).catch_unwind().map(move |caught| {
                caught.unwrap_or_else(|panic| {
                    let reason = panic_reason(panic.as_ref());
                    error!("Task {} aborted: {}", task_id, reason);
                    Err(WorkflowError::Aborted { task_id, reason })
                })
            })
        })
        .await
        .clone()
    }
    .boxed()
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

/// Condition check, dependency execution and the Running phase of one task.
fn execute_task(
    inner: Arc<EngineInner>,
    run: Arc<ExecutionRun>,
    task_id: TaskId,
    path: Vec<TaskId>,
) -> BoxFuture<'static, TaskOutcome> {
    async move {
        let task = match inner.registry.find(&task_id) {
            Some(task) => task,
            None => {
                return Err(match path.last() {
                    Some(parent) => WorkflowError::DependencyNotFound {
                        task_id: *parent,
                        dependency: task_id,
                    },
                    None => WorkflowError::TaskNotFound(task_id),
                })
            }
        };

        if let Some(condition) = &task.condition {
            let should_run = condition(run.context.clone()).await.map_err(|e| {
                WorkflowError::ConditionFailed {
                    task_id,
                    task_name: task.name.clone(),
                    source: Arc::from(e),
                }
            })?;

            if !should_run {
                info!("Task '{}' condition not met, skipping", task.name);
                run.context.set(task_id.skipped_key(), true);
                run.timeline
                    .lock()
                    .add_event(task_id, &task.name, EventType::Skipped, 0);
                return Ok(None);
            }
        }

        let dependencies = resolve_dependencies(&task, &run.context);
        if !dependencies.is_empty() {
            let mut child_path = path;
            child_path.push(task_id);
            execute_dependencies(&inner, &run, dependencies, child_path).await?;
        }

        let value = execute_with_retries(
            &task,
            &run.context,
            &run.middlewares,
            inner.policy,
            &run.timeline,
        )
        .await?;

        Ok(Some(value))
    }
    .boxed()
}

/// Starts every dependency as its own tokio task and waits for all of them.
///
/// Returns on the first failure. The remaining dependencies are not
/// cancelled: they keep running and may still write to the shared context.
async fn execute_dependencies(
    inner: &Arc<EngineInner>,
    run: &Arc<ExecutionRun>,
    dependencies: Vec<TaskId>,
    path: Vec<TaskId>,
) -> Result<()> {
    let mut pending: FuturesUnordered<_> = dependencies
        .into_iter()
        .map(|dependency| {
            let handle = tokio::spawn(run_task(
                Arc::clone(inner),
                Arc::clone(run),
                dependency,
                path.clone(),
            ));
            handle.map(move |joined| (dependency, joined))
        })
        .collect();

    while let Some((dependency, joined)) = pending.next().await {
        match joined {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e),
            Err(join_error) => {
                return Err(WorkflowError::Aborted {
                    task_id: dependency,
                    reason: join_error.to_string(),
                })
            }
        }
    }

    Ok(())
}

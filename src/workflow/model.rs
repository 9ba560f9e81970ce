//! Task Data Model
//!
//! Core data structures describing tasks and the middleware wrapped around
//! them.
//!
//! A task is plain data: a name, a dependency specification, an optional
//! condition, an executable body and a list of trigger event names. All
//! behavior is held in `Arc` closures, so a registered [`Task`] is cheap to
//! share between concurrently running executions.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use taskgraph::{TaskDefinition, TaskId};
//!
//! let upstream = TaskId::new();
//! let task = TaskDefinition::new("process-payment", |ctx| async move {
//!     let order = ctx.get_required("order")?;
//!     Ok(json!({ "order": order, "status": "success" }))
//! })
//! .depends_on(upstream)
//! .when(|ctx| ctx.has("order"))
//! .triggered_by("order.created");
//!
//! assert_eq!(task.name, "process-payment");
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::context::Context;
use crate::error::BoxError;

/// Unique identifier of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Context key under which the engine records this task's result.
    pub fn result_key(&self) -> String {
        format!("{}_result", self.0)
    }

    /// Context key under which the engine marks this task as skipped.
    pub fn skipped_key(&self) -> String {
        format!("{}_skipped", self.0)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Asynchronous task body.
pub type TaskBody = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

/// Predicate deciding whether a task runs at all.
pub type Condition = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<bool, BoxError>> + Send + Sync>;

/// Function computing dependencies from the current context.
pub type DependencyFn = Arc<dyn Fn(&Context) -> Vec<TaskId> + Send + Sync>;

/// Hook run before every task body.
pub type PreHook = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Hook run after every task body, receiving its result.
pub type PostHook =
    Arc<dyn Fn(Context, Value) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// How a task's dependencies are determined.
#[derive(Clone)]
pub enum DependencySpec {
    /// A fixed, ordered list of task IDs.
    Fixed(Vec<TaskId>),
    /// A function of the context, evaluated at execution time.
    Dynamic(DependencyFn),
}

impl DependencySpec {
    /// Returns true for a fixed specification with no entries.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Fixed(ids) if ids.is_empty())
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }
}

impl Default for DependencySpec {
    fn default() -> Self {
        Self::Fixed(Vec::new())
    }
}

impl fmt::Debug for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(ids) => f.debug_tuple("Fixed").field(ids).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

/// Definition of a task prior to registration.
///
/// Built with [`TaskDefinition::new`] and the `with_*` / `depends_on` /
/// `when` / `triggered_by` methods, then handed to
/// [`Engine::add_task`](crate::Engine::add_task), which assigns its ID.
#[derive(Clone)]
pub struct TaskDefinition {
    /// Display name, used in logs and errors
    pub name: String,

    /// Tasks that must run before this one
    pub dependencies: DependencySpec,

    /// Optional predicate; when false the task is skipped
    pub condition: Option<Condition>,

    /// The executable body
    pub body: TaskBody,

    /// Event names that start this task when emitted
    pub triggers: Vec<String>,
}

impl TaskDefinition {
    /// Creates a task definition with the given name and body.
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            dependencies: DependencySpec::default(),
            condition: None,
            body: Arc::new(move |ctx| body(ctx).boxed()),
            triggers: Vec::new(),
        }
    }

    /// Adds a fixed dependency on another task.
    ///
    /// Replaces a dynamic specification, if one was set.
    pub fn depends_on(mut self, task_id: TaskId) -> Self {
        if let DependencySpec::Fixed(ids) = &mut self.dependencies {
            ids.push(task_id);
        } else {
            self.dependencies = DependencySpec::Fixed(vec![task_id]);
        }
        self
    }

    /// Sets a fixed dependency list.
    pub fn with_dependencies(mut self, task_ids: Vec<TaskId>) -> Self {
        self.dependencies = DependencySpec::Fixed(task_ids);
        self
    }

    /// Sets a dependency function evaluated against the context at execution time.
    pub fn with_dynamic_dependencies<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&Context) -> Vec<TaskId> + Send + Sync + 'static,
    {
        self.dependencies = DependencySpec::Dynamic(Arc::new(resolve));
        self
    }

    /// Sets a synchronous, infallible condition.
    pub fn when<F>(self, predicate: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.try_when(move |ctx| Ok(predicate(ctx)))
    }

    /// Sets a synchronous condition that may fail.
    pub fn try_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Context) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(move |ctx| {
            futures::future::ready(predicate(&ctx)).boxed()
        }));
        self
    }

    /// Sets an asynchronous condition.
    pub fn when_async<F, Fut>(mut self, predicate: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, BoxError>> + Send + 'static,
    {
        self.condition = Some(Arc::new(move |ctx| predicate(ctx).boxed()));
        self
    }

    /// Adds an event name that triggers this task.
    pub fn triggered_by(mut self, event: impl Into<String>) -> Self {
        self.triggers.push(event.into());
        self
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("has_condition", &self.condition.is_some())
            .field("triggers", &self.triggers)
            .finish()
    }
}

/// A registered task. Immutable once created.
#[derive(Clone)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub dependencies: DependencySpec,
    pub condition: Option<Condition>,
    pub body: TaskBody,
    pub triggers: Vec<String>,
}

impl Task {
    /// Binds a definition to its assigned identifier.
    pub fn from_definition(id: TaskId, definition: TaskDefinition) -> Self {
        Self {
            id,
            name: definition.name,
            dependencies: definition.dependencies,
            condition: definition.condition,
            body: definition.body,
            triggers: definition.triggers,
        }
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("has_condition", &self.condition.is_some())
            .field("triggers", &self.triggers)
            .finish()
    }
}

/// A pair of hooks applied around every task body.
///
/// Pre-hooks run before the body, post-hooks after it; across middleware,
/// both run in registration order.
#[derive(Clone, Default)]
pub struct Middleware {
    pub pre: Option<PreHook>,
    pub post: Option<PostHook>,
}

impl Middleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hook run before each task body.
    pub fn with_pre<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.pre = Some(Arc::new(move |ctx| hook(ctx).boxed()));
        self
    }

    /// Sets the hook run after each task body.
    pub fn with_post<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Context, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.post = Some(Arc::new(move |ctx, result| hook(ctx, result).boxed()));
        self
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

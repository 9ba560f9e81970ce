//! Error Types
//!
//! Errors surfaced by the execution engine. Task bodies, conditions and
//! middleware hooks report failures as [`BoxError`]; the engine wraps the
//! last one into a [`WorkflowError`] once retries are exhausted.

use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

use crate::workflow::context::ContextError;
use crate::workflow::model::TaskId;

/// Error type returned by task bodies, conditions and middleware hooks.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Shared form of a task-level failure.
///
/// Outcomes are memoized per execution and handed to every task that
/// requested them, so the underlying error has to be shareable.
pub type SharedError = Arc<dyn Error + Send + Sync>;

/// Failures produced while executing a task graph.
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    #[error("Task {0} not found")]
    TaskNotFound(TaskId),

    #[error("Dependency task {dependency} of task {task_id} not found")]
    DependencyNotFound { task_id: TaskId, dependency: TaskId },

    #[error("Task '{task_name}' ({task_id}) failed after {attempts} attempt(s): {source}")]
    TaskFailed {
        task_id: TaskId,
        task_name: String,
        attempts: u32,
        #[source]
        source: SharedError,
    },

    #[error("Condition of task '{task_name}' ({task_id}) failed: {source}")]
    ConditionFailed {
        task_id: TaskId,
        task_name: String,
        #[source]
        source: SharedError,
    },

    #[error("Cyclic dependency detected: {}", format_path(.path))]
    CycleDetected { path: Vec<TaskId> },

    #[error("Execution of task {task_id} aborted: {reason}")]
    Aborted { task_id: TaskId, reason: String },

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl WorkflowError {
    /// Returns the task the error is attributed to, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::TaskNotFound(id) => Some(*id),
            Self::DependencyNotFound { dependency, .. } => Some(*dependency),
            Self::TaskFailed { task_id, .. }
            | Self::ConditionFailed { task_id, .. }
            | Self::Aborted { task_id, .. } => Some(*task_id),
            Self::CycleDetected { path } => path.last().copied(),
            Self::Context(_) => None,
        }
    }

    /// Returns the error raised by the task body, hook or condition.
    ///
    /// Useful for downcasting, e.g. to detect a missing required
    /// [`Context`](crate::Context) key:
    ///
    /// ```
    /// use taskgraph::{ContextError, WorkflowError};
    ///
    /// fn missing_key(err: &WorkflowError) -> bool {
    ///     err.task_error()
    ///         .and_then(|e| e.downcast_ref::<ContextError>())
    ///         .is_some_and(|e| matches!(e, ContextError::MissingKey { .. }))
    /// }
    /// ```
    pub fn task_error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            Self::TaskFailed { source, .. } | Self::ConditionFailed { source, .. } => {
                Some(source.as_ref())
            }
            _ => None,
        }
    }

    /// Returns true if the error is a missing task, either top-level or a dependency.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound(_) | Self::DependencyNotFound { .. }
        )
    }
}

fn format_path(path: &[TaskId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

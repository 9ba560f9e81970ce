//! Dependency Resolution
//!
//! Turns a task's dependency specification into the concrete list of task
//! IDs to execute before it.

use log::debug;

use crate::workflow::{Context, DependencySpec, Task, TaskId};

/// Resolves the dependencies of `task` against the current context.
///
/// Fixed lists are returned verbatim, including duplicates and
/// self-references. Dynamic specifications are invoked exactly once per call,
/// so their result reflects whatever the context holds at that moment.
pub fn resolve_dependencies(task: &Task, context: &Context) -> Vec<TaskId> {
    let resolved = match &task.dependencies {
        DependencySpec::Fixed(ids) => ids.clone(),
        DependencySpec::Dynamic(resolve) => resolve(context),
    };

    if !resolved.is_empty() {
        debug!(
            "Task '{}' resolved {} dependencies: {:?}",
            task.name,
            resolved.len(),
            resolved
        );
    }

    resolved
}

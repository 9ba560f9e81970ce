//! Dependency Graph Validation
//!
//! Pre-flight cycle detection for a single execution. Starting from the
//! target task, the walk follows dependencies depth-first, resolving dynamic
//! specifications against the context as it stands before execution begins.
//!
//! Because dynamic dependencies may change once tasks start writing to the
//! context, this walk is incomplete; the engine also tracks the ancestor path
//! of every recursive call and fails with the same error at runtime.

use std::collections::HashMap;

use log::debug;

use super::context::Context;
use super::model::TaskId;
use super::registry::TaskRegistry;
use crate::error::{Result, WorkflowError};
use crate::execution::resolver::resolve_dependencies;

/// DFS node state.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Visit {
    /// On the current DFS path
    InProgress,
    /// Fully explored, no cycle through it
    Done,
}

/// Checks that no task reachable from `root` depends on itself.
///
/// Unknown task IDs are ignored here; they are reported as
/// [`WorkflowError::DependencyNotFound`] when execution reaches them.
pub fn check_for_cycles(registry: &TaskRegistry, root: TaskId, context: &Context) -> Result<()> {
    let mut visits: HashMap<TaskId, Visit> = HashMap::new();
    let mut path: Vec<TaskId> = Vec::new();

    visit(registry, root, context, &mut visits, &mut path)?;

    debug!(
        "Dependency graph of {} is acyclic ({} tasks reachable)",
        root,
        visits.len()
    );
    Ok(())
}

fn visit(
    registry: &TaskRegistry,
    id: TaskId,
    context: &Context,
    visits: &mut HashMap<TaskId, Visit>,
    path: &mut Vec<TaskId>,
) -> Result<()> {
    match visits.get(&id) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => {
            let start = path.iter().position(|p| *p == id).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(id);
            return Err(WorkflowError::CycleDetected { path: cycle });
        }
        None => {}
    }

    let Some(task) = registry.find(&id) else {
        return Ok(());
    };

    visits.insert(id, Visit::InProgress);
    path.push(id);

    for dependency in resolve_dependencies(&task, context) {
        visit(registry, dependency, context, visits, path)?;
    }

    path.pop();
    visits.insert(id, Visit::Done);
    Ok(())
}

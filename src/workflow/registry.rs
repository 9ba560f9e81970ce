//! Task Registry
//!
//! Holds registered task definitions keyed by their identifier. Dependency
//! references are not validated here; a dangling ID only surfaces when an
//! execution tries to resolve it.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use super::model::{Task, TaskDefinition, TaskId};
use crate::error::{Result, WorkflowError};

/// Thread-safe store of registered tasks.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Arc<Task>>>,
    /// Registration order, used for deterministic listings
    order: RwLock<Vec<TaskId>>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition under a freshly generated identifier.
    pub fn register(&self, definition: TaskDefinition) -> Arc<Task> {
        let id = TaskId::new();
        let task = Arc::new(Task::from_definition(id, definition));

        self.tasks.write().insert(id, Arc::clone(&task));
        self.order.write().push(id);

        debug!("Registered task '{}' as {}", task.name, id);
        task
    }

    /// Gets a task by ID.
    pub fn get(&self, id: &TaskId) -> Result<Arc<Task>> {
        self.find(id).ok_or(WorkflowError::TaskNotFound(*id))
    }

    /// Gets a task by ID, returning `None` when absent.
    pub fn find(&self, id: &TaskId) -> Option<Arc<Task>> {
        self.tasks.read().get(id).cloned()
    }

    /// Gets the first registered task with the given display name.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Task>> {
        let tasks = self.tasks.read();
        self.order
            .read()
            .iter()
            .filter_map(|id| tasks.get(id))
            .find(|task| task.name == name)
            .cloned()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.read().contains_key(id)
    }

    /// Returns all task IDs in registration order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.order.read().clone()
    }

    /// Returns the number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Returns true if no task has been registered.
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn definition(name: &str) -> TaskDefinition {
        TaskDefinition::new(name, |_ctx| async { Ok(Value::Null) })
    }

    #[test]
    fn test_register_assigns_unique_ids() {
        let registry = TaskRegistry::new();
        let a = registry.register(definition("a"));
        let b = registry.register(definition("a"));

        assert_ne!(a.id, b.id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_get_registered_task() {
        let registry = TaskRegistry::new();
        let task = registry.register(definition("fetch"));

        let found = registry.get(&task.id).unwrap();
        assert_eq!(found.name, "fetch");
        assert!(registry.contains(&task.id));
    }

    #[test]
    fn test_get_missing_task() {
        let registry = TaskRegistry::new();
        let missing = TaskId::new();

        let err = registry.get(&missing).unwrap_err();
        assert!(matches!(err, WorkflowError::TaskNotFound(id) if id == missing));
        assert!(registry.find(&missing).is_none());
    }

    #[test]
    fn test_dangling_dependency_accepted() {
        let registry = TaskRegistry::new();
        let task = registry.register(definition("orphan").depends_on(TaskId::new()));
        assert!(registry.contains(&task.id));
    }

    #[test]
    fn test_ids_in_registration_order() {
        let registry = TaskRegistry::new();
        let first = registry.register(definition("first"));
        let second = registry.register(definition("second"));
        let third = registry.register(definition("third"));

        assert_eq!(registry.ids(), vec![first.id, second.id, third.id]);
    }

    #[test]
    fn test_find_by_name_returns_first() {
        let registry = TaskRegistry::new();
        let first = registry.register(definition("dup"));
        registry.register(definition("dup"));

        assert_eq!(registry.find_by_name("dup").unwrap().id, first.id);
        assert!(registry.find_by_name("absent").is_none());
    }

    #[test]
    fn test_empty_registry() {
        let registry = TaskRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.ids().is_empty());
    }
}

//! Event Bus
//!
//! A name-keyed registry of handler closures. Handlers are compared by
//! identity (`Arc` pointer equality), so removing one requires the exact
//! handle that was registered.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use serde_json::Value;

/// Callback invoked with the payload of an emitted event.
///
/// Handlers run synchronously inside [`EventBus::emit`]; long-running work
/// should be spawned onto the runtime.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Registry of event handlers keyed by event name.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler for `event`.
    ///
    /// Registering the same handler twice for one event has no effect.
    pub fn on(&self, event: &str, handler: EventHandler) {
        let mut handlers = self.handlers.write();
        let entry = handlers.entry(event.to_string()).or_default();

        if entry.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            debug!("Handler already registered for event '{}'", event);
            return;
        }
        entry.push(handler);
    }

    /// Removes a previously registered handler.
    ///
    /// Returns false if the handler was not registered for `event`.
    pub fn off(&self, event: &str, handler: &EventHandler) -> bool {
        let mut handlers = self.handlers.write();
        let Some(entry) = handlers.get_mut(event) else {
            return false;
        };

        let before = entry.len();
        entry.retain(|h| !Arc::ptr_eq(h, handler));
        let removed = entry.len() != before;

        if entry.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    /// Invokes every handler registered for `event` with a copy of `payload`.
    ///
    /// Does not wait for any work the handlers start. Returns the number of
    /// handlers invoked.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        // Snapshot so handlers may call back into the bus.
        let handlers: Vec<EventHandler> = match self.handlers.read().get(event) {
            Some(list) => list.clone(),
            None => {
                debug!("No handlers for event '{}'", event);
                return 0;
            }
        };

        debug!("Emitting '{}' to {} handler(s)", event, handlers.len());
        for handler in &handlers {
            handler(payload.clone());
        }
        handlers.len()
    }

    /// Returns the number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }

    /// Returns the names of all events with at least one handler.
    pub fn events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<String, usize> = self
            .handlers
            .read()
            .iter()
            .map(|(name, list)| (name.clone(), list.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

//! Event Bridge Module
//!
//! Maps event names to handlers. The engine installs one handler per task
//! trigger so that emitting an event starts the matching tasks.
//!
//! - [`bus`]: Handler registry and fire-and-forget dispatch

pub mod bus;

pub use bus::{EventBus, EventHandler};

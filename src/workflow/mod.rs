//! Task Graph Definition Module
//!
//! Provides the data structures describing tasks and the shared state they
//! run against.
//!
//! # Structure
//!
//! - [`context`]: Shared key/value store of one execution
//! - [`model`]: Task definitions, dependency specifications, middleware
//! - [`registry`]: ID-keyed store of registered tasks
//! - [`validator`]: Pre-flight cycle detection

pub mod context;
pub mod model;
pub mod registry;
pub mod validator;

pub use context::{Context, ContextError, EVENT_PAYLOAD_KEY};
pub use model::{DependencySpec, Middleware, Task, TaskDefinition, TaskId};
pub use registry::TaskRegistry;
pub use validator::check_for_cycles;

//! TaskGraph - Asynchronous Task Graph Execution Engine
//!
//! Runs user-defined async tasks that depend on one another. Executing a task
//! first runs its dependencies concurrently, recursively, against one shared
//! key/value context; every body is wrapped in middleware and retried with a
//! fixed delay. Tasks may be gated by conditions and started by named events.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`workflow`]: Task definitions, the shared context, the task registry
//!   and cycle validation
//! - [`execution`]: The engine, dependency resolution and the retrying
//!   middleware pipeline
//! - [`events`]: Named event handlers and task triggers
//! - [`monitoring`]: Per-execution timeline of task lifecycle events
//! - [`config`]: YAML engine configuration
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use taskgraph::{Engine, EngineOptions, TaskDefinition};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(EngineOptions::default());
//!
//!     let inventory = engine.add_task(TaskDefinition::new("check-inventory", |ctx| async move {
//!         let order = ctx.get_required("order")?;
//!         Ok(json!({ "items": order["items"], "available": true }))
//!     }));
//!
//!     let payment = engine.add_task(
//!         TaskDefinition::new("process-payment", |_ctx| async move {
//!             Ok(json!({ "status": "success" }))
//!         })
//!         .depends_on(inventory)
//!         .when(|ctx| ctx.has("order")),
//!     );
//!
//!     let result = engine
//!         .execute(payment, json!({ "order": { "items": [1, 2] } }))
//!         .await?;
//!     println!("{:?}", result);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use config::{load_config, parse_config, ConfigError, EngineConfig};
pub use error::{BoxError, WorkflowError};
pub use events::EventHandler;
pub use execution::{Engine, EngineOptions, ExecutionReport};
pub use workflow::{Context, ContextError, Middleware, TaskDefinition, TaskId, EVENT_PAYLOAD_KEY};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

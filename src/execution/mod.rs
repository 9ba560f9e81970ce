//! Task Execution Module
//!
//! Drives a task and its dependency tree to completion.
//!
//! # Architecture
//!
//! - [`engine`]: Task registration, recursive concurrent execution, triggers
//! - [`resolver`]: Fixed or context-dependent dependency resolution
//! - [`step`]: Middleware, body and retries of a single task

pub mod engine;
pub mod resolver;
pub mod step;

pub use engine::{Engine, EngineOptions, ExecutionReport, TaskOutcome};
pub use step::RetryPolicy;

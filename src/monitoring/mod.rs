//! Execution Monitoring Module
//!
//! Provides the per-execution timeline of task lifecycle events.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Task start/retry/finish timing for reports

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};

//! Task Body Execution
//!
//! Runs the Running phase of a single task:
//! - Pre-middleware hooks in registration order
//! - The task body
//! - Result recording into the context
//! - Post-middleware hooks in registration order
//!
//! Any failure in that sequence is retried after a fixed delay until the
//! attempt budget is spent. Conditions and dependencies are not re-evaluated
//! between attempts.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{BoxError, Result, WorkflowError};
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::{Context, Middleware, Task};

/// Attempt budget for task bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Runs the task body with its middleware, retrying on failure.
///
/// # Returns
///
/// * `Ok(value)` - The body's result from the first successful attempt
/// * `Err(WorkflowError::TaskFailed)` - Every attempt failed; carries the last error
pub async fn execute_with_retries(
    task: &Task,
    context: &Context,
    middlewares: &[Middleware],
    policy: RetryPolicy,
    timeline: &Mutex<ExecutionTimeline>,
) -> Result<Value> {
    let mut attempt = 1;

    loop {
        timeline
            .lock()
            .add_event(task.id, &task.name, EventType::Started, attempt);

        match run_attempt(task, context, middlewares).await {
            Ok(value) => {
                timeline
                    .lock()
                    .add_event(task.id, &task.name, EventType::Completed, attempt);
                return Ok(value);
            }
            Err(e) if attempt < policy.max_attempts => {
                warn!(
                    "Task '{}' attempt {}/{} failed: {}. Retrying in {:?}",
                    task.name, attempt, policy.max_attempts, e, policy.delay
                );
                timeline
                    .lock()
                    .add_event(task.id, &task.name, EventType::Retrying, attempt);

                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    "Task '{}' failed after {} attempt(s): {}",
                    task.name, attempt, e
                );
                timeline
                    .lock()
                    .add_event(task.id, &task.name, EventType::Failed, attempt);

                return Err(WorkflowError::TaskFailed {
                    task_id: task.id,
                    task_name: task.name.clone(),
                    attempts: attempt,
                    source: Arc::from(e),
                });
            }
        }
    }
}

/// Runs one attempt: pre-hooks, body, result recording, post-hooks.
async fn run_attempt(
    task: &Task,
    context: &Context,
    middlewares: &[Middleware],
) -> std::result::Result<Value, BoxError> {
    for (index, middleware) in middlewares.iter().enumerate() {
        if let Some(pre) = &middleware.pre {
            debug!("Running pre-hook {} for task '{}'", index, task.name);
            pre(context.clone()).await?;
        }
    }

    let value = (task.body)(context.clone()).await?;
    context.set(task.id.result_key(), value.clone());

    for (index, middleware) in middlewares.iter().enumerate() {
        if let Some(post) = &middleware.post {
            debug!("Running post-hook {} for task '{}'", index, task.name);
            post(context.clone(), value.clone()).await?;
        }
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{TaskDefinition, TaskId};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(5))
    }

    fn task(definition: TaskDefinition) -> Task {
        Task::from_definition(TaskId::new(), definition)
    }

    /// Body failing `failures` times before returning the attempt number.
    fn flaky(failures: u32, calls: Arc<AtomicU32>) -> Task {
        task(TaskDefinition::new("flaky", move |_ctx| {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= failures {
                    return Err("service unavailable".into());
                }
                Ok(json!({ "attempts": n }))
            }
        }))
    }

    #[test]
    fn test_policy_has_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::new(5, Duration::ZERO).max_attempts, 5);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let t = flaky(0, Arc::clone(&calls));
        let ctx = Context::new();
        let timeline = Mutex::new(ExecutionTimeline::new());

        let value = execute_with_retries(&t, &ctx, &[], policy(3), &timeline)
            .await
            .unwrap();

        assert_eq!(value, json!({ "attempts": 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.result_of(&t.id), Some(value));
        assert_eq!(timeline.lock().attempts(&t.id), 1);
    }

    #[tokio::test]
    async fn test_success_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let t = flaky(2, Arc::clone(&calls));
        let timeline = Mutex::new(ExecutionTimeline::new());

        let value = execute_with_retries(&t, &Context::new(), &[], policy(3), &timeline)
            .await
            .unwrap();

        assert_eq!(value["attempts"], 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(timeline.lock().attempts(&t.id), 3);
        assert_eq!(timeline.lock().final_state(&t.id), Some(EventType::Completed));
    }

    #[tokio::test]
    async fn test_exhausts_attempt_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let t = flaky(u32::MAX, Arc::clone(&calls));
        let ctx = Context::new();
        let timeline = Mutex::new(ExecutionTimeline::new());

        let err = execute_with_retries(&t, &ctx, &[], policy(3), &timeline)
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            WorkflowError::TaskFailed {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(source.to_string(), "service unavailable");
            }
            other => panic!("Expected TaskFailed, got {other}"),
        }
        assert!(ctx.result_of(&t.id).is_none());
        assert_eq!(timeline.lock().final_state(&t.id), Some(EventType::Failed));
    }

    #[tokio::test]
    async fn test_retry_waits_fixed_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let t = flaky(2, Arc::clone(&calls));
        let timeline = Mutex::new(ExecutionTimeline::new());
        let started = std::time::Instant::now();

        execute_with_retries(
            &t,
            &Context::new(),
            &[],
            RetryPolicy::new(3, Duration::from_millis(40)),
            &timeline,
        )
        .await
        .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_middleware_order_around_body() {
        let order = Arc::new(Mutex::new(Vec::<String>::new()));

        let tracked = |tag: &'static str| {
            let pre_log = Arc::clone(&order);
            let post_log = Arc::clone(&order);
            Middleware::new()
                .with_pre(move |_ctx| {
                    let log = Arc::clone(&pre_log);
                    async move {
                        log.lock().push(format!("pre-{tag}"));
                        Ok(())
                    }
                })
                .with_post(move |_ctx, result| {
                    let log = Arc::clone(&post_log);
                    async move {
                        log.lock().push(format!("post-{tag}:{result}"));
                        Ok(())
                    }
                })
        };
        let middlewares = vec![tracked("a"), tracked("b")];

        let body_log = Arc::clone(&order);
        let t = task(TaskDefinition::new("body", move |_ctx| {
            let log = Arc::clone(&body_log);
            async move {
                log.lock().push("body".to_string());
                Ok(json!(1))
            }
        }));

        let timeline = Mutex::new(ExecutionTimeline::new());
        execute_with_retries(&t, &Context::new(), &middlewares, policy(1), &timeline)
            .await
            .unwrap();

        assert_eq!(
            order.lock().clone(),
            vec!["pre-a", "pre-b", "body", "post-a:1", "post-b:1"]
        );
    }

    #[tokio::test]
    async fn test_failing_post_hook_retries_whole_sequence() {
        let post_calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&post_calls);
        let middleware = Middleware::new().with_post(move |_ctx, _result| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err("audit log unavailable".into());
                }
                Ok(())
            }
        });

        let body_calls = Arc::new(AtomicU32::new(0));
        let t = flaky(0, Arc::clone(&body_calls));
        let timeline = Mutex::new(ExecutionTimeline::new());

        execute_with_retries(&t, &Context::new(), &[middleware], policy(2), &timeline)
            .await
            .unwrap();

        assert_eq!(body_calls.load(Ordering::SeqCst), 2);
        assert_eq!(post_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_required_key_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let t = task(TaskDefinition::new("needs-order", move |ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let order = ctx.get_required("order")?;
                Ok(order)
            }
        }));

        let timeline = Mutex::new(ExecutionTimeline::new());
        let err = execute_with_retries(&t, &Context::new(), &[], policy(2), &timeline)
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let missing = err
            .task_error()
            .and_then(|e| e.downcast_ref::<crate::ContextError>());
        assert!(matches!(
            missing,
            Some(crate::ContextError::MissingKey { key }) if key == "order"
        ));
    }
}

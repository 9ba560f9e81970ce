//! Execution Timeline
//!
//! Records task lifecycle events of one execution for reports, attempt
//! accounting and Gantt-style summaries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::workflow::TaskId;

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// An attempt of the task body started
    Started,
    /// An attempt failed and another one is scheduled
    Retrying,
    /// Task completed successfully
    Completed,
    /// Task failed for good
    Failed,
    /// Condition was false; task did not run
    Skipped,
}

/// A single event in the execution timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    pub task_id: TaskId,
    pub task_name: String,
    pub event_type: EventType,
    /// Attempt number the event belongs to (0 for skips)
    pub attempt: u32,
    /// Milliseconds since the timeline was created
    pub offset_ms: u128,
    /// Wall-clock time of the event
    pub recorded_at: DateTime<Utc>,
    #[serde(skip)]
    timestamp: Instant,
}

/// Tracks the lifecycle of every task touched by one execution.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event for a task.
    pub fn add_event(
        &mut self,
        task_id: TaskId,
        task_name: impl Into<String>,
        event_type: EventType,
        attempt: u32,
    ) {
        let timestamp = Instant::now();
        self.events.push(TimelineEvent {
            task_id,
            task_name: task_name.into(),
            event_type,
            attempt,
            offset_ms: timestamp.duration_since(self.start_time).as_millis(),
            recorded_at: Utc::now(),
            timestamp,
        });
    }

    /// Returns all recorded events.
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Returns the events of one task, in order.
    pub fn events_for(&self, task_id: &TaskId) -> Vec<&TimelineEvent> {
        self.events.iter().filter(|e| e.task_id == *task_id).collect()
    }

    /// Number of body attempts made for a task.
    pub fn attempts(&self, task_id: &TaskId) -> u32 {
        self.events
            .iter()
            .filter(|e| e.task_id == *task_id && e.event_type == EventType::Started)
            .count() as u32
    }

    /// Returns the terminal event type of a task, if it reached one.
    pub fn final_state(&self, task_id: &TaskId) -> Option<EventType> {
        self.events
            .iter()
            .rev()
            .filter(|e| e.task_id == *task_id)
            .map(|e| e.event_type)
            .find(|t| matches!(t, EventType::Completed | EventType::Failed | EventType::Skipped))
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns task durations in milliseconds, from the first attempt's start
    /// to completion or final failure.
    pub fn durations(&self) -> HashMap<TaskId, u128> {
        let mut starts: HashMap<TaskId, u128> = HashMap::new();
        let mut durations: HashMap<TaskId, u128> = HashMap::new();

        for event in &self.events {
            let elapsed = event.timestamp.duration_since(self.start_time).as_millis();

            match event.event_type {
                EventType::Started => {
                    starts.entry(event.task_id).or_insert(elapsed);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = starts.get(&event.task_id) {
                        durations.insert(event.task_id, elapsed - start);
                    }
                }
                EventType::Retrying | EventType::Skipped => {}
            }
        }

        durations
    }

    /// Generates an ASCII Gantt chart representation.
    ///
    /// Each task is shown as a bar indicating when it ran relative to the
    /// total execution time. Skipped tasks have no bar.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = Instant::now().duration_since(self.start_time).as_millis();

        if total_time == 0 {
            return output;
        }

        // Scale to 50 characters width
        let scale = 50.0 / total_time as f64;

        let mut names: HashMap<TaskId, &str> = HashMap::new();
        let mut task_times: HashMap<TaskId, (u128, u128)> = HashMap::new();

        for event in &self.events {
            let elapsed = event.timestamp.duration_since(self.start_time).as_millis();
            names.entry(event.task_id).or_insert(&event.task_name);

            match event.event_type {
                EventType::Started => {
                    task_times.entry(event.task_id).or_insert((elapsed, 0));
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(times) = task_times.get_mut(&event.task_id) {
                        times.1 = elapsed;
                    }
                }
                EventType::Retrying | EventType::Skipped => {}
            }
        }

        let mut sorted: Vec<_> = task_times.into_iter().collect();
        sorted.sort_by_key(|(_, (start, _))| *start);

        for (task_id, (start, end)) in sorted {
            if end > start {
                let start_pos = (start as f64 * scale) as usize;
                let duration = ((end - start) as f64 * scale).max(1.0) as usize;

                let mut bar = " ".repeat(start_pos);
                bar.push_str(&"#".repeat(duration));

                let name = names.get(&task_id).copied().unwrap_or("?");
                output.push_str(&format!(
                    "{} |{}| ({} ms)\n",
                    truncate(name, 16),
                    bar,
                    end - start
                ));
            }
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or truncates a name to a fixed width.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timeline_creation() {
        let timeline = ExecutionTimeline::new();
        assert!(timeline.events().is_empty());
    }

    #[test]
    fn test_attempt_counting() {
        let mut timeline = ExecutionTimeline::new();
        let id = TaskId::new();

        timeline.add_event(id, "pay", EventType::Started, 1);
        timeline.add_event(id, "pay", EventType::Retrying, 1);
        timeline.add_event(id, "pay", EventType::Started, 2);
        timeline.add_event(id, "pay", EventType::Completed, 2);

        assert_eq!(timeline.attempts(&id), 2);
        assert_eq!(timeline.final_state(&id), Some(EventType::Completed));
        assert_eq!(timeline.events_for(&id).len(), 4);
    }

    #[test]
    fn test_skipped_has_no_attempts() {
        let mut timeline = ExecutionTimeline::new();
        let id = TaskId::new();
        timeline.add_event(id, "gate", EventType::Skipped, 0);

        assert_eq!(timeline.attempts(&id), 0);
        assert_eq!(timeline.final_state(&id), Some(EventType::Skipped));
        assert!(timeline.durations().is_empty());
    }

    #[test]
    fn test_durations_span_retries() {
        let mut timeline = ExecutionTimeline::new();
        let id = TaskId::new();

        timeline.add_event(id, "flaky", EventType::Started, 1);
        thread::sleep(Duration::from_millis(20));
        timeline.add_event(id, "flaky", EventType::Started, 2);
        thread::sleep(Duration::from_millis(20));
        timeline.add_event(id, "flaky", EventType::Failed, 2);

        let durations = timeline.durations();
        assert!(*durations.get(&id).unwrap() >= 40);
    }

    #[test]
    fn test_durations_only_started() {
        let mut timeline = ExecutionTimeline::new();
        let id = TaskId::new();
        timeline.add_event(id, "running", EventType::Started, 1);

        assert!(!timeline.durations().contains_key(&id));
        assert_eq!(timeline.final_state(&id), None);
    }

    #[test]
    fn test_gantt_chart_generation() {
        let mut timeline = ExecutionTimeline::new();
        let first = TaskId::new();
        let second = TaskId::new();

        timeline.add_event(first, "check-inventory", EventType::Started, 1);
        thread::sleep(Duration::from_millis(30));
        timeline.add_event(first, "check-inventory", EventType::Completed, 1);

        timeline.add_event(second, "a-very-long-task-name", EventType::Started, 1);
        thread::sleep(Duration::from_millis(30));
        timeline.add_event(second, "a-very-long-task-name", EventType::Completed, 1);

        let chart = timeline.gantt_chart();
        assert!(chart.contains("check-inventory"));
        assert!(chart.contains("a-very-long-t..."));
        assert!(chart.contains("Total:"));
    }

    #[test]
    fn test_gantt_chart_empty() {
        let timeline = ExecutionTimeline::new();
        let chart = timeline.gantt_chart();
        assert!(chart.contains("Timeline"));
    }

    #[test]
    fn test_event_serialization() {
        let mut timeline = ExecutionTimeline::new();
        let id = TaskId::new();
        timeline.add_event(id, "notify", EventType::Completed, 1);

        let json = serde_json::to_value(&timeline.events()[0]).unwrap();
        assert_eq!(json["event_type"], "completed");
        assert_eq!(json["task_name"], "notify");
        assert_eq!(json["task_id"], id.to_string());
        assert!(json.get("timestamp").is_none());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc  ");
        assert_eq!(truncate("abcdefgh", 6), "abc...");
    }
}

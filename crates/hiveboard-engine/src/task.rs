use hiveboard_types::{Event, EventStatus, EventType};
use serde::{Deserialize, Serialize};

/// Derived state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Completed,
    Failed,
    Escalated,
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Escalated => "escalated",
            TaskState::Cancelled => "cancelled",
        }
    }
}

/// Derive a task's state from its events (ascending). The latest terminal
/// signal wins; a task with no terminal signal is running.
pub fn derive_task_state(events: &[Event]) -> TaskState {
    let mut state = TaskState::Running;
    for event in events {
        match event.event_type {
            EventType::TaskCompleted => {
                state = match event.status {
                    Some(EventStatus::Cancelled) => TaskState::Cancelled,
                    _ => TaskState::Completed,
                };
            }
            EventType::TaskFailed => {
                state = match event.status {
                    Some(EventStatus::Cancelled) => TaskState::Cancelled,
                    _ => TaskState::Failed,
                };
            }
            EventType::Escalated => {
                state = TaskState::Escalated;
            }
            // A restart reopens the task
            EventType::TaskStarted => {
                state = TaskState::Running;
            }
            _ => {}
        }
    }
    state
}

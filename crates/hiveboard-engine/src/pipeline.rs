use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hiveboard_types::{Event, IssueAction, PayloadData, ScheduledItem, TodoAction};
use serde::Serialize;
use serde_json::Value;

/// Latest pending-work queue snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSection {
    pub depth: Option<u64>,
    pub items: Vec<Value>,
    pub snapshot_at: DateTime<Utc>,
}

/// An open manual work item (latest transition per todo_id).
#[derive(Debug, Clone, Serialize)]
pub struct TodoItemView {
    pub todo_id: String,
    pub title: Option<String>,
    pub action: TodoAction,
    pub updated_at: DateTime<Utc>,
}

/// Latest recurring-schedules snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledSection {
    pub items: Vec<ScheduledItem>,
    pub snapshot_at: DateTime<Utc>,
}

/// An unresolved operational issue.
#[derive(Debug, Clone, Serialize)]
pub struct IssueView {
    pub issue_id: String,
    pub severity: Option<String>,
    pub category: Option<String>,
    pub occurrence_count: Option<u64>,
    pub reported_at: DateTime<Utc>,
}

/// An agent's pipeline: queue + todos + scheduled items + active issues,
/// reconstructed from the newest payload-kind events.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineView {
    pub queue: Option<QueueSection>,
    pub todos: Vec<TodoItemView>,
    pub scheduled: Option<ScheduledSection>,
    pub issues: Vec<IssueView>,
}

/// Reconstruct the pipeline from an agent's events sorted ascending.
///
/// Snapshot kinds (queue_snapshot, scheduled) keep only the newest event.
/// Transition kinds (todo, issue) fold to the latest transition per id:
/// todos stay listed until completed or dismissed, issues until resolved.
pub fn build_pipeline(events: &[Event]) -> PipelineView {
    let mut queue: Option<QueueSection> = None;
    let mut scheduled: Option<ScheduledSection> = None;
    let mut todos: HashMap<String, TodoItemView> = HashMap::new();
    let mut todo_order: Vec<String> = Vec::new();
    let mut issues: HashMap<String, (IssueView, IssueAction)> = HashMap::new();
    let mut issue_order: Vec<String> = Vec::new();

    for event in events {
        match event.payload_data() {
            Some(PayloadData::QueueSnapshot(data)) => {
                queue = Some(QueueSection {
                    depth: data.depth,
                    items: data.items.clone(),
                    snapshot_at: event.timestamp,
                });
            }
            Some(PayloadData::Scheduled(data)) => {
                scheduled = Some(ScheduledSection {
                    items: data.items.clone(),
                    snapshot_at: event.timestamp,
                });
            }
            Some(PayloadData::Todo(data)) => {
                let (Some(todo_id), Some(action)) = (data.todo_id.as_ref(), data.action) else {
                    continue;
                };
                if !todos.contains_key(todo_id) {
                    todo_order.push(todo_id.clone());
                }
                let entry = todos.entry(todo_id.clone()).or_insert(TodoItemView {
                    todo_id: todo_id.clone(),
                    title: None,
                    action,
                    updated_at: event.timestamp,
                });
                entry.action = action;
                entry.updated_at = event.timestamp;
                if entry.title.is_none() {
                    entry.title = data
                        .title
                        .clone()
                        .or_else(|| event.payload.as_ref().and_then(|p| p.summary.clone()));
                }
            }
            Some(PayloadData::Issue(data)) => {
                let (Some(issue_id), Some(action)) = (data.issue_id.as_ref(), data.action) else {
                    continue;
                };
                if !issues.contains_key(issue_id) {
                    issue_order.push(issue_id.clone());
                }
                let entry = issues.entry(issue_id.clone()).or_insert((
                    IssueView {
                        issue_id: issue_id.clone(),
                        severity: None,
                        category: None,
                        occurrence_count: None,
                        reported_at: event.timestamp,
                    },
                    action,
                ));
                entry.1 = action;
                if action == IssueAction::Reported {
                    entry.0.reported_at = event.timestamp;
                }
                if data.severity.is_some() {
                    entry.0.severity = data.severity.clone();
                }
                if data.category.is_some() {
                    entry.0.category = data.category.clone();
                }
                if data.occurrence_count.is_some() {
                    entry.0.occurrence_count = data.occurrence_count;
                }
            }
            _ => {}
        }
    }

    let open_todos = todo_order
        .into_iter()
        .filter_map(|id| todos.remove(&id))
        .filter(|t| !matches!(t.action, TodoAction::Completed | TodoAction::Dismissed))
        .collect();

    let active_issues = issue_order
        .into_iter()
        .filter_map(|id| issues.remove(&id))
        .filter(|(_, action)| *action == IssueAction::Reported)
        .map(|(view, _)| view)
        .collect();

    PipelineView {
        queue,
        todos: open_todos,
        scheduled,
        issues: active_issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use hiveboard_types::{EventType, KeyType, Payload, Severity};
    use serde_json::json;
    use uuid::Uuid;

    fn custom_event(payload: serde_json::Value, offset: i64) -> Event {
        let base: DateTime<Utc> = "2026-03-01T12:00:00Z".parse().unwrap();
        Event {
            event_id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            key_type: KeyType::Live,
            timestamp: base + Duration::seconds(offset),
            event_type: EventType::Custom,
            severity: Severity::Info,
            status: None,
            agent_id: "agent-1".to_string(),
            project_id: None,
            task_id: None,
            action_id: None,
            parent_action_id: None,
            environment: None,
            group: None,
            agent_type: None,
            agent_version: None,
            framework: None,
            sdk_version: None,
            duration_ms: None,
            payload: Some(serde_json::from_value::<Payload>(payload).unwrap()),
        }
    }

    #[test]
    fn test_newest_queue_snapshot_wins() {
        let events = vec![
            custom_event(
                json!({"kind": "queue_snapshot", "data": {"depth": 5, "items": ["a"]}}),
                0,
            ),
            custom_event(
                json!({"kind": "queue_snapshot", "data": {"depth": 2, "items": ["b", "c"]}}),
                60,
            ),
        ];

        let pipeline = build_pipeline(&events);
        let queue = pipeline.queue.unwrap();
        assert_eq!(queue.depth, Some(2));
        assert_eq!(queue.items.len(), 2);
    }

    #[test]
    fn test_todo_lifecycle() {
        let events = vec![
            custom_event(
                json!({"kind": "todo", "summary": "refill creds", "data": {"todo_id": "td1", "action": "created"}}),
                0,
            ),
            custom_event(
                json!({"kind": "todo", "data": {"todo_id": "td2", "action": "created"}}),
                10,
            ),
            custom_event(
                json!({"kind": "todo", "data": {"todo_id": "td1", "action": "completed"}}),
                20,
            ),
        ];

        let pipeline = build_pipeline(&events);
        assert_eq!(pipeline.todos.len(), 1);
        assert_eq!(pipeline.todos[0].todo_id, "td2");
    }

    #[test]
    fn test_issue_resolution_removes_from_active() {
        let events = vec![
            custom_event(
                json!({"kind": "issue", "data": {"issue_id": "i1", "action": "reported", "severity": "high", "occurrence_count": 3}}),
                0,
            ),
            custom_event(
                json!({"kind": "issue", "data": {"issue_id": "i2", "action": "reported"}}),
                5,
            ),
            custom_event(
                json!({"kind": "issue", "data": {"issue_id": "i1", "action": "resolved"}}),
                10,
            ),
        ];

        let pipeline = build_pipeline(&events);
        assert_eq!(pipeline.issues.len(), 1);
        assert_eq!(pipeline.issues[0].issue_id, "i2");
    }

    #[test]
    fn test_empty_pipeline() {
        let pipeline = build_pipeline(&[]);
        assert!(pipeline.queue.is_none());
        assert!(pipeline.scheduled.is_none());
        assert!(pipeline.todos.is_empty());
        assert!(pipeline.issues.is_empty());
    }

    #[test]
    fn test_scheduled_snapshot() {
        let events = vec![custom_event(
            json!({"kind": "scheduled", "data": {"items": [
                {"id": "s1", "name": "nightly sync", "interval": "24h", "enabled": true}
            ]}}),
            0,
        )];

        let pipeline = build_pipeline(&events);
        let scheduled = pipeline.scheduled.unwrap();
        assert_eq!(scheduled.items.len(), 1);
        assert_eq!(scheduled.items[0].name.as_deref(), Some("nightly sync"));
    }
}

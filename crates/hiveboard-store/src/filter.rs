use chrono::{DateTime, Utc};
use hiveboard_types::{
    Event, EventType, KeyType, Severity, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT,
};
use serde::Serialize;

/// Column filters for event queries. Every read path goes through this so
/// tenant scoping and test/live visibility cannot be forgotten.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub event_type: Option<EventType>,
    pub severity: Option<Severity>,
    pub payload_kind: Option<String>,
    pub environment: Option<String>,
    pub group: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Heartbeats are noise for most views; on by default.
    pub exclude_heartbeats: bool,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            agent_id: None,
            task_id: None,
            project_id: None,
            event_type: None,
            severity: None,
            payload_kind: None,
            environment: None,
            group: None,
            since: None,
            until: None,
            exclude_heartbeats: true,
            limit: None,
            cursor: None,
        }
    }
}

impl EventFilter {
    pub fn for_agent(agent_id: &str) -> Self {
        Self {
            agent_id: Some(agent_id.to_string()),
            ..Self::default()
        }
    }

    pub fn for_task(task_id: &str) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            exclude_heartbeats: true,
            ..Self::default()
        }
    }

    fn matches(&self, event: &Event) -> bool {
        if self.exclude_heartbeats && event.event_type == EventType::Heartbeat {
            return false;
        }
        if let Some(agent_id) = &self.agent_id {
            if &event.agent_id != agent_id {
                return false;
            }
        }
        if let Some(task_id) = &self.task_id {
            if event.task_id.as_ref() != Some(task_id) {
                return false;
            }
        }
        if let Some(project_id) = &self.project_id {
            if event.project_id.as_ref() != Some(project_id) {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if event.severity != severity {
                return false;
            }
        }
        if let Some(kind) = &self.payload_kind {
            if event.payload_kind() != Some(kind.as_str()) {
                return false;
            }
        }
        if let Some(environment) = &self.environment {
            if event.environment.as_ref() != Some(environment) {
                return false;
            }
        }
        if let Some(group) = &self.group {
            if event.group.as_ref() != Some(group) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Whether a viewer authenticated with `viewer` may see `event`.
/// Test keys see everything; live and read keys never see test rows.
pub fn visible_to(event: &Event, viewer: KeyType) -> bool {
    viewer.sees_test_data() || event.key_type != KeyType::Test
}

/// Apply tenant scoping, visibility and column filters. Sorted by timestamp,
/// descending unless `ascending` (timelines read oldest-first).
pub fn filter_events(
    rows: &[Event],
    tenant_id: &str,
    viewer: KeyType,
    filter: &EventFilter,
    ascending: bool,
) -> Vec<Event> {
    let mut matched: Vec<Event> = rows
        .iter()
        .filter(|e| e.tenant_id == tenant_id)
        .filter(|e| visible_to(e, viewer))
        .filter(|e| filter.matches(e))
        .cloned()
        .collect();

    matched.sort_by(|a, b| {
        if ascending {
            a.timestamp.cmp(&b.timestamp)
        } else {
            b.timestamp.cmp(&a.timestamp)
        }
    });
    matched
}

/// One page of rows plus the cursor to fetch the next page.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub cursor: Option<String>,
    pub has_more: bool,
}

/// Cut a page out of a fully filtered result set. The cursor is an opaque
/// offset token minted by the previous page.
pub fn paginate<T>(mut rows: Vec<T>, limit: Option<usize>, cursor: Option<&str>) -> Page<T> {
    let offset = cursor.and_then(decode_cursor).unwrap_or(0);
    let limit = limit
        .unwrap_or(DEFAULT_QUERY_LIMIT)
        .clamp(1, MAX_QUERY_LIMIT);

    let total = rows.len();
    let start = offset.min(total);
    let end = (start + limit).min(total);
    let data: Vec<T> = rows.drain(start..end).collect();

    let has_more = end < total;
    Page {
        data,
        cursor: has_more.then(|| encode_cursor(end)),
        has_more,
    }
}

fn encode_cursor(offset: usize) -> String {
    format!("o{}", offset)
}

fn decode_cursor(cursor: &str) -> Option<usize> {
    cursor.strip_prefix('o')?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn event(event_type: EventType, key_type: KeyType, offset: i64) -> Event {
        let base: DateTime<Utc> = "2026-03-01T12:00:00Z".parse().unwrap();
        Event {
            event_id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            key_type,
            timestamp: base + Duration::seconds(offset),
            event_type,
            severity: event_type.default_severity(),
            status: None,
            agent_id: "agent-1".to_string(),
            project_id: None,
            task_id: None,
            action_id: None,
            parent_action_id: None,
            environment: Some("prod".to_string()),
            group: None,
            agent_type: None,
            agent_version: None,
            framework: None,
            sdk_version: None,
            duration_ms: None,
            payload: None,
        }
    }

    #[test]
    fn test_tenant_scoping() {
        let mut foreign = event(EventType::TaskStarted, KeyType::Live, 0);
        foreign.tenant_id = "t2".to_string();
        let rows = vec![event(EventType::TaskStarted, KeyType::Live, 0), foreign];

        let matched = filter_events(&rows, "t1", KeyType::Live, &EventFilter::default(), false);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].tenant_id, "t1");
    }

    #[test]
    fn test_test_data_visibility() {
        let rows = vec![
            event(EventType::TaskStarted, KeyType::Live, 0),
            event(EventType::TaskStarted, KeyType::Test, 1),
        ];

        let live_view = filter_events(&rows, "t1", KeyType::Live, &EventFilter::default(), false);
        assert_eq!(live_view.len(), 1);
        assert_eq!(live_view[0].key_type, KeyType::Live);

        let test_view = filter_events(&rows, "t1", KeyType::Test, &EventFilter::default(), false);
        assert_eq!(test_view.len(), 2);

        let read_view = filter_events(&rows, "t1", KeyType::Read, &EventFilter::default(), false);
        assert_eq!(read_view.len(), 1);
    }

    #[test]
    fn test_heartbeats_excluded_by_default() {
        let rows = vec![
            event(EventType::Heartbeat, KeyType::Live, 0),
            event(EventType::TaskStarted, KeyType::Live, 1),
        ];

        let matched = filter_events(&rows, "t1", KeyType::Live, &EventFilter::default(), false);
        assert_eq!(matched.len(), 1);

        let include = EventFilter {
            exclude_heartbeats: false,
            ..EventFilter::default()
        };
        assert_eq!(filter_events(&rows, "t1", KeyType::Live, &include, false).len(), 2);
    }

    #[test]
    fn test_sort_direction() {
        let rows = vec![
            event(EventType::TaskStarted, KeyType::Live, 0),
            event(EventType::TaskCompleted, KeyType::Live, 10),
        ];

        let desc = filter_events(&rows, "t1", KeyType::Live, &EventFilter::default(), false);
        assert_eq!(desc[0].event_type, EventType::TaskCompleted);

        let asc = filter_events(&rows, "t1", KeyType::Live, &EventFilter::default(), true);
        assert_eq!(asc[0].event_type, EventType::TaskStarted);
    }

    #[test]
    fn test_time_window() {
        let base: DateTime<Utc> = "2026-03-01T12:00:00Z".parse().unwrap();
        let rows = vec![
            event(EventType::TaskStarted, KeyType::Live, 0),
            event(EventType::TaskStarted, KeyType::Live, 100),
            event(EventType::TaskStarted, KeyType::Live, 200),
        ];

        let filter = EventFilter {
            since: Some(base + Duration::seconds(50)),
            until: Some(base + Duration::seconds(150)),
            ..EventFilter::default()
        };
        let matched = filter_events(&rows, "t1", KeyType::Live, &filter, true);
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn test_pagination_cursor_walk() {
        let rows: Vec<u32> = (0..25).collect();

        let first = paginate(rows.clone(), Some(10), None);
        assert_eq!(first.data.len(), 10);
        assert!(first.has_more);

        let second = paginate(rows.clone(), Some(10), first.cursor.as_deref());
        assert_eq!(second.data[0], 10);

        let third = paginate(rows.clone(), Some(10), second.cursor.as_deref());
        assert_eq!(third.data.len(), 5);
        assert!(!third.has_more);
        assert!(third.cursor.is_none());
    }

    #[test]
    fn test_bogus_cursor_starts_over() {
        let rows: Vec<u32> = (0..5).collect();
        let page = paginate(rows, Some(10), Some("garbage"));
        assert_eq!(page.data.len(), 5);
    }
}

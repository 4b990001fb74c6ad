use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use hiveboard_engine::StuckTracker;
use hiveboard_server::auth::AuthContext;
use hiveboard_server::broadcast::{Broadcaster, StatusChange, StuckNotice};
use hiveboard_server::config::ServerConfig;
use hiveboard_server::ingest::{process_batch, Envelope, IngestRequest};
use hiveboard_server::rate_limit::RateLimiter;
use hiveboard_server::state::AppState;
use hiveboard_store::Store;
use hiveboard_types::{AgentStatus, Event, KeyType, Severity};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Captures everything the ingestion pipeline pushes at the bus.
#[derive(Default)]
struct RecordingBus {
    events: Mutex<Vec<Event>>,
    status_changes: Mutex<Vec<StatusChange>>,
    stuck: Mutex<Vec<StuckNotice>>,
    cleared: Mutex<Vec<String>>,
}

#[async_trait]
impl Broadcaster for RecordingBus {
    async fn broadcast_events(&self, _tenant_id: &str, events: &[Event]) {
        self.events.lock().await.extend(events.iter().cloned());
    }

    async fn broadcast_agent_status_change(&self, _tenant_id: &str, change: &StatusChange) {
        self.status_changes.lock().await.push(change.clone());
    }

    async fn broadcast_agent_stuck(&self, _tenant_id: &str, notice: &StuckNotice) {
        self.stuck.lock().await.push(notice.clone());
    }

    async fn clear_stuck(&self, _tenant_id: &str, agent_id: &str) {
        self.cleared.lock().await.push(agent_id.to_string());
    }
}

struct Harness {
    _dir: TempDir,
    state: AppState,
    bus: Arc<RecordingBus>,
    auth: AuthContext,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::open(dir.path()).unwrap());
    let mut config = ServerConfig::default();
    config.data_dir = dir.path().to_path_buf();
    let bus = Arc::new(RecordingBus::default());

    let state = AppState {
        store,
        config: Arc::new(config),
        bus: bus.clone(),
        native: None,
        bridge: None,
        rate_limiter: Arc::new(RateLimiter::new()),
        stuck: Arc::new(Mutex::new(StuckTracker::new())),
    };
    let auth = AuthContext {
        tenant_id: "acme".to_string(),
        key_id: "k1".to_string(),
        key_type: KeyType::Live,
    };
    Harness {
        _dir: dir,
        state,
        bus,
        auth,
    }
}

fn envelope() -> Envelope {
    Envelope {
        agent_id: Some("agent-1".to_string()),
        agent_type: Some("worker".to_string()),
        agent_version: Some("1.2.0".to_string()),
        framework: Some("langgraph".to_string()),
        sdk_version: Some("0.9.1".to_string()),
        environment: Some("prod".to_string()),
        group: Some("crawlers".to_string()),
    }
}

fn wire_event(event_type: &str, ts: &str, extra: Value) -> Value {
    let mut event = json!({
        "event_id": Uuid::new_v4().to_string(),
        "timestamp": ts,
        "event_type": event_type,
    });
    if let (Some(obj), Some(extra_obj)) = (event.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            obj.insert(k.clone(), v.clone());
        }
    }
    event
}

#[tokio::test]
async fn test_basic_ingest_and_broadcast() {
    let h = harness();

    let request = IngestRequest {
        envelope: envelope(),
        events: vec![
            wire_event("task_started", "2026-03-01T12:00:00+00:00", json!({"task_id": "t1"})),
            wire_event(
                "custom",
                "2026-03-01T12:00:01Z",
                json!({"task_id": "t1", "payload": {
                    "kind": "llm_call",
                    "data": {"model": "m", "tokens_in": 100, "tokens_out": 50}
                }}),
            ),
            wire_event(
                "task_completed",
                "2026-03-01T12:00:02Z",
                json!({"task_id": "t1", "duration_ms": 1500}),
            ),
        ],
    };

    let (status, response) = process_batch(&h.state, &h.auth, request).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.accepted, 3);
    assert_eq!(response.rejected, 0);
    assert!(response.warnings.is_empty());

    // Envelope inheritance and tenant stamping
    let stored = h.state.store.tenant_events("acme").await;
    assert_eq!(stored.len(), 3);
    for event in &stored {
        assert_eq!(event.tenant_id, "acme");
        assert_eq!(event.key_type, KeyType::Live);
        assert_eq!(event.environment.as_deref(), Some("prod"));
        assert_eq!(event.group.as_deref(), Some("crawlers"));
        assert_eq!(event.framework.as_deref(), Some("langgraph"));
    }
    // +00:00 canonicalized to Z
    let serialized = serde_json::to_string(&stored[0]).unwrap();
    assert!(!serialized.contains("+00:00"));

    // All three events hit the bus
    assert_eq!(h.bus.events.lock().await.len(), 3);
}

#[tokio::test]
async fn test_partial_failure_batch() {
    let h = harness();

    let oversize = "x".repeat(40 * 1024);
    let request = IngestRequest {
        envelope: envelope(),
        events: vec![
            wire_event("task_started", "2026-03-01T12:00:00Z", json!({"task_id": "t1"})),
            wire_event(
                "task_completed",
                "2026-03-01T12:00:01Z",
                json!({"task_id": "t1", "severity": "critical"}),
            ),
            wire_event(
                "custom",
                "2026-03-01T12:00:02Z",
                json!({"payload": {"kind": "blob", "data": {"body": oversize}}}),
            ),
        ],
    };

    let (status, response) = process_batch(&h.state, &h.auth, request).await.unwrap();
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(response.accepted, 2);
    assert_eq!(response.rejected, 1);
    assert_eq!(response.accepted + response.rejected, 3);

    assert!(response
        .warnings
        .iter()
        .any(|w| w.code == "invalid_severity"));
    assert!(response
        .errors
        .iter()
        .any(|e| e.code == "payload_too_large"));

    // Both valid events stored; the invalid severity fell back to default
    let stored = h.state.store.tenant_events("acme").await;
    assert_eq!(stored.len(), 2);
    let completed = stored
        .iter()
        .find(|e| e.event_type == hiveboard_types::EventType::TaskCompleted)
        .unwrap();
    assert_eq!(completed.severity, Severity::Info);
}

#[tokio::test]
async fn test_payload_size_boundary() {
    let h = harness();

    // Pad the payload so its serialized form is exactly the 32 KiB limit
    let shell = json!({"data": {"blob": ""}});
    let overhead = serde_json::to_string(&shell).unwrap().len();
    let pad = "y".repeat(32 * 1024 - overhead);
    let exact = json!({"data": {"blob": pad}});
    assert_eq!(serde_json::to_string(&exact).unwrap().len(), 32 * 1024);

    let request = IngestRequest {
        envelope: envelope(),
        events: vec![wire_event(
            "custom",
            "2026-03-01T12:00:00Z",
            json!({"payload": exact}),
        )],
    };
    let (_, response) = process_batch(&h.state, &h.auth, request).await.unwrap();
    assert_eq!(response.accepted, 1);
    assert_eq!(response.rejected, 0);

    // One byte over rejects that event only
    let shell = json!({"data": {"blob": ""}});
    let overhead = serde_json::to_string(&shell).unwrap().len();
    let pad = "y".repeat(32 * 1024 - overhead + 1);
    let over = json!({"data": {"blob": pad}});

    let request = IngestRequest {
        envelope: envelope(),
        events: vec![wire_event(
            "custom",
            "2026-03-01T12:00:10Z",
            json!({"payload": over}),
        )],
    };
    let (_, response) = process_batch(&h.state, &h.auth, request).await.unwrap();
    assert_eq!(response.accepted, 0);
    assert_eq!(response.rejected, 1);
}

#[tokio::test]
async fn test_empty_batch_is_ok() {
    let h = harness();
    let request = IngestRequest {
        envelope: envelope(),
        events: Vec::new(),
    };
    let (status, response) = process_batch(&h.state, &h.auth, request).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.accepted, 0);
    assert_eq!(response.rejected, 0);
}

#[tokio::test]
async fn test_batch_size_limit() {
    let h = harness();

    let full: Vec<Value> = (0..500)
        .map(|i| {
            wire_event(
                "heartbeat",
                &format!("2026-03-01T12:{:02}:{:02}Z", i / 60, i % 60),
                json!({}),
            )
        })
        .collect();
    let request = IngestRequest {
        envelope: envelope(),
        events: full,
    };
    let (_, response) = process_batch(&h.state, &h.auth, request).await.unwrap();
    assert_eq!(response.accepted, 500);

    let too_many: Vec<Value> = (0..501)
        .map(|_| wire_event("heartbeat", "2026-03-01T12:00:00Z", json!({})))
        .collect();
    let request = IngestRequest {
        envelope: envelope(),
        events: too_many,
    };
    let err = process_batch(&h.state, &h.auth, request).await.unwrap_err();
    assert_eq!(err.error, "bad_request");
}

#[tokio::test]
async fn test_missing_envelope_agent_id() {
    let h = harness();
    let request = IngestRequest {
        envelope: Envelope::default(),
        events: vec![wire_event("heartbeat", "2026-03-01T12:00:00Z", json!({}))],
    };
    let err = process_batch(&h.state, &h.auth, request).await.unwrap_err();
    assert_eq!(err.error, "bad_request");
}

#[tokio::test]
async fn test_schema_rejections() {
    let h = harness();
    let request = IngestRequest {
        envelope: envelope(),
        events: vec![
            json!({"event_id": "not-a-uuid", "timestamp": "2026-03-01T12:00:00Z", "event_type": "heartbeat"}),
            json!({"event_id": Uuid::new_v4().to_string(), "timestamp": "soonish", "event_type": "heartbeat"}),
            json!({"event_id": Uuid::new_v4().to_string(), "timestamp": "2026-03-01T12:00:00Z", "event_type": "task_imploded"}),
        ],
    };

    let (status, response) = process_batch(&h.state, &h.auth, request).await.unwrap();
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(response.accepted, 0);
    assert_eq!(response.rejected, 3);

    let codes: Vec<&str> = response.errors.iter().map(|e| e.code).collect();
    assert!(codes.contains(&"invalid_event_id"));
    assert!(codes.contains(&"invalid_timestamp"));
    assert!(codes.contains(&"invalid_event_type"));
}

#[tokio::test]
async fn test_unknown_project_rejects_event() {
    let h = harness();
    let request = IngestRequest {
        envelope: envelope(),
        events: vec![wire_event(
            "task_started",
            "2026-03-01T12:00:00Z",
            json!({"task_id": "t1", "project_id": "ghost-project"}),
        )],
    };
    let (_, response) = process_batch(&h.state, &h.auth, request).await.unwrap();
    assert_eq!(response.rejected, 1);
    assert_eq!(response.errors[0].code, "unknown_project");
}

#[tokio::test]
async fn test_duplicate_batch_leaves_state_unchanged() {
    let h = harness();
    let events = vec![
        wire_event("task_started", "2026-03-01T12:00:00Z", json!({"task_id": "t1"})),
        wire_event("task_completed", "2026-03-01T12:00:05Z", json!({"task_id": "t1"})),
    ];

    let request = IngestRequest {
        envelope: envelope(),
        events: events.clone(),
    };
    process_batch(&h.state, &h.auth, request).await.unwrap();
    let first = h.state.store.tenant_events("acme").await.len();

    // Retry with the same event_ids: accepted (idempotent), nothing new
    // stored, nothing re-broadcast
    let broadcast_before = h.bus.events.lock().await.len();
    let request = IngestRequest {
        envelope: envelope(),
        events,
    };
    let (_, response) = process_batch(&h.state, &h.auth, request).await.unwrap();
    assert_eq!(response.accepted, 2);
    assert_eq!(h.state.store.tenant_events("acme").await.len(), first);
    assert_eq!(h.bus.events.lock().await.len(), broadcast_before);
}

#[tokio::test]
async fn test_status_change_broadcast() {
    let h = harness();

    let request = IngestRequest {
        envelope: envelope(),
        events: vec![wire_event(
            "task_started",
            &hiveboard_types::format_timestamp(Utc::now()),
            json!({"task_id": "t1"}),
        )],
    };
    process_batch(&h.state, &h.auth, request).await.unwrap();

    let changes = h.bus.status_changes.lock().await;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].agent_id, "agent-1");
    assert_eq!(changes[0].previous_status, AgentStatus::Offline);
    assert_eq!(changes[0].new_status, AgentStatus::Processing);
    assert_eq!(changes[0].current_task_id.as_deref(), Some("t1"));
}

#[tokio::test]
async fn test_stuck_fires_once_and_clears_on_heartbeat() {
    let h = harness();

    // A task started ten minutes ago, no heartbeat since
    let stale = Utc::now() - Duration::minutes(10);
    let request = IngestRequest {
        envelope: envelope(),
        events: vec![wire_event(
            "task_started",
            &hiveboard_types::format_timestamp(stale),
            json!({"task_id": "t1"}),
        )],
    };
    process_batch(&h.state, &h.auth, request).await.unwrap();
    assert_eq!(h.bus.stuck.lock().await.len(), 1);

    // More stale activity in the same period: no second agent.stuck
    let request = IngestRequest {
        envelope: envelope(),
        events: vec![wire_event(
            "action_started",
            &hiveboard_types::format_timestamp(stale + Duration::seconds(1)),
            json!({"task_id": "t1", "action_id": "a1"}),
        )],
    };
    process_batch(&h.state, &h.auth, request).await.unwrap();
    assert_eq!(h.bus.stuck.lock().await.len(), 1);

    // A fresh heartbeat ends the period
    let request = IngestRequest {
        envelope: envelope(),
        events: vec![wire_event(
            "heartbeat",
            &hiveboard_types::format_timestamp(Utc::now()),
            json!({}),
        )],
    };
    process_batch(&h.state, &h.auth, request).await.unwrap();
    assert_eq!(h.bus.cleared.lock().await.len(), 1);
    assert!(!h
        .state
        .stuck
        .lock()
        .await
        .is_fired("acme", "agent-1"));
}

#[tokio::test]
async fn test_read_key_cannot_ingest() {
    let h = harness();
    let read_auth = AuthContext {
        tenant_id: "acme".to_string(),
        key_id: "k2".to_string(),
        key_type: KeyType::Read,
    };
    let request = IngestRequest {
        envelope: envelope(),
        events: Vec::new(),
    };
    let err = process_batch(&h.state, &read_auth, request).await.unwrap_err();
    assert_eq!(err.error, "forbidden");
}

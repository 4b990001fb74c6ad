use chrono::{DateTime, Duration, Utc};
use hiveboard_store::Store;
use hiveboard_types::{Event, EventType, KeyType, PlanTier, Tenant, MAX_BATCH_EVENTS};
use tempfile::TempDir;
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    "2026-03-10T12:00:00Z".parse().unwrap()
}

fn event(event_type: EventType, ts: DateTime<Utc>) -> Event {
    Event {
        event_id: Uuid::new_v4(),
        tenant_id: "acme".to_string(),
        key_type: KeyType::Live,
        timestamp: ts,
        event_type,
        severity: event_type.default_severity(),
        status: None,
        agent_id: "agent-1".to_string(),
        project_id: None,
        task_id: Some("task-1".to_string()),
        action_id: None,
        parent_action_id: None,
        environment: None,
        group: None,
        agent_type: None,
        agent_version: None,
        framework: None,
        sdk_version: None,
        duration_ms: None,
        payload: None,
    }
}

async fn seed(store: &Store, events: Vec<Event>) {
    for chunk in events.chunks(MAX_BATCH_EVENTS) {
        store
            .insert_batch("acme", "agent-1", chunk.to_vec(), now(), Duration::seconds(300))
            .await
            .unwrap();
    }
}

async fn free_tenant(store: &Store) {
    store
        .ensure_tenant(Tenant {
            tenant_id: "acme".to_string(),
            name: "Acme".to_string(),
            plan: PlanTier::Free,
            created_at: now(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_retention_sweep() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    free_tenant(&store).await;

    // A backlog well past the free tier's 7 day window
    let old_ts = now() - Duration::days(8);
    let mut events: Vec<Event> = (0..2000)
        .map(|i| event(EventType::TaskCompleted, old_ts + Duration::seconds(i)))
        .collect();

    // Recent heartbeats: inside the TTL window but past the 10 minute cold
    // window
    let hb_ts = now() - Duration::minutes(15);
    events.extend((0..500).map(|i| event(EventType::Heartbeat, hb_ts + Duration::seconds(i / 10))));

    // And live work that must survive both phases
    events.push(event(EventType::TaskStarted, now() - Duration::minutes(2)));
    events.push(event(EventType::Heartbeat, now() - Duration::minutes(1)));

    seed(&store, events).await;
    assert_eq!(store.event_count().await, 2502);

    let report = store.prune(now()).await.unwrap();
    assert_eq!(report.ttl_pruned, 2000);
    assert_eq!(report.cold_pruned, 500);
    assert_eq!(report.total_pruned, 2500);
    assert_eq!(store.event_count().await, 2);

    // Queries stay correct after the sweep
    let remaining = store.tenant_events("acme").await;
    assert!(remaining
        .iter()
        .all(|e| e.timestamp >= now() - Duration::days(7)));
    assert!(remaining
        .iter()
        .filter(|e| e.event_type == EventType::Heartbeat)
        .all(|e| e.timestamp >= now() - Duration::minutes(10)));
}

#[tokio::test]
async fn test_prune_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    free_tenant(&store).await;

    let events = vec![
        event(EventType::TaskCompleted, now() - Duration::days(8)),
        event(EventType::Heartbeat, now() - Duration::minutes(20)),
        event(EventType::ActionStarted, now() - Duration::hours(25)),
        event(EventType::TaskStarted, now() - Duration::minutes(1)),
    ];
    seed(&store, events).await;

    let first = store.prune(now()).await.unwrap();
    assert_eq!(first.ttl_pruned, 1);
    assert_eq!(first.cold_pruned, 2);

    let second = store.prune(now()).await.unwrap();
    assert_eq!(second.total_pruned, 0);
    assert_eq!(store.event_count().await, 1);
}

#[tokio::test]
async fn test_unknown_tenant_is_kept() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    // No tenant row at all: TTL cannot be determined, so nothing is dropped
    // by phase 1. Cold pruning still applies.

    let events = vec![
        event(EventType::TaskCompleted, now() - Duration::days(400)),
        event(EventType::Heartbeat, now() - Duration::minutes(20)),
    ];
    seed(&store, events).await;

    let report = store.prune(now()).await.unwrap();
    assert_eq!(report.ttl_pruned, 0);
    assert_eq!(report.cold_pruned, 1);
    assert_eq!(store.event_count().await, 1);
}

#[tokio::test]
async fn test_enterprise_window_is_wider() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    store
        .ensure_tenant(Tenant {
            tenant_id: "acme".to_string(),
            name: "Acme".to_string(),
            plan: PlanTier::Enterprise,
            created_at: now(),
        })
        .await
        .unwrap();

    let events = vec![
        event(EventType::TaskCompleted, now() - Duration::days(8)),
        event(EventType::TaskCompleted, now() - Duration::days(91)),
    ];
    seed(&store, events).await;

    let report = store.prune(now()).await.unwrap();
    assert_eq!(report.ttl_pruned, 1);
    assert_eq!(store.event_count().await, 1);
}

#[tokio::test]
async fn test_dedup_makes_resubmission_safe() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    free_tenant(&store).await;

    let batch = vec![
        event(EventType::TaskStarted, now() - Duration::minutes(5)),
        event(EventType::TaskCompleted, now() - Duration::minutes(4)),
    ];

    seed(&store, batch.clone()).await;
    let first_count = store.event_count().await;

    // Client retries the whole batch after a timeout
    seed(&store, batch).await;
    assert_eq!(store.event_count().await, first_count);
}

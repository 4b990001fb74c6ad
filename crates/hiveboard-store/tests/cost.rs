use chrono::{DateTime, Duration, Utc};
use hiveboard_store::{CostCallOrder, EventFilter, Store};
use hiveboard_types::{Event, EventType, KeyType, Severity};
use tempfile::TempDir;
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    "2026-03-10T12:00:00Z".parse().unwrap()
}

fn llm_call(model: &str, cost: Option<f64>, ts: DateTime<Utc>) -> Event {
    let mut data = serde_json::json!({
        "model": model,
        "tokens_in": 100,
        "tokens_out": 50,
    });
    if let Some(cost) = cost {
        data["cost"] = serde_json::json!(cost);
    }
    Event {
        event_id: Uuid::new_v4(),
        tenant_id: "acme".to_string(),
        key_type: KeyType::Live,
        timestamp: ts,
        event_type: EventType::Custom,
        severity: Severity::Info,
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
        payload: Some(
            serde_json::from_value(serde_json::json!({
                "kind": "llm_call",
                "data": data,
            }))
            .unwrap(),
        ),
    }
}

async fn seed(store: &Store, events: Vec<Event>) {
    store
        .insert_batch("acme", "agent-1", events, now(), Duration::seconds(300))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cost_breakdown_by_model() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    seed(
        &store,
        vec![
            llm_call("m1", Some(0.10), now() - Duration::hours(2)),
            llm_call("m1", Some(0.05), now() - Duration::hours(2)),
            llm_call("m2", Some(0.20), now() - Duration::minutes(10)),
        ],
    )
    .await;

    let summary = store
        .get_cost_summary("acme", KeyType::Live, Duration::hours(3), now())
        .await;

    assert!((summary.total_cost - 0.35).abs() < 1e-9);
    assert_eq!(summary.total_calls, 3);
    assert_eq!(summary.total_tokens_in, 300);
    assert_eq!(summary.total_tokens_out, 150);
    assert!(!summary.estimated);

    assert_eq!(summary.by_model.len(), 2);
    let m1 = summary.by_model.iter().find(|r| r.key == "m1").unwrap();
    assert_eq!(m1.call_count, 2);
    assert!((m1.cost - 0.15).abs() < 1e-9);
    let m2 = summary.by_model.iter().find(|r| r.key == "m2").unwrap();
    assert_eq!(m2.call_count, 1);
    assert!((m2.cost - 0.20).abs() < 1e-9);

    // Narrowing the window past the m1 calls leaves a single m2 row
    let narrow = store
        .get_cost_summary("acme", KeyType::Live, Duration::hours(1), now())
        .await;
    assert_eq!(narrow.by_model.len(), 1);
    assert_eq!(narrow.by_model[0].key, "m2");
    assert!((narrow.total_cost - 0.20).abs() < 1e-9);
}

#[tokio::test]
async fn test_estimated_costs_are_flagged() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    // No explicit cost; gpt-4o is in the price table
    seed(
        &store,
        vec![llm_call("gpt-4o", None, now() - Duration::minutes(5))],
    )
    .await;

    let summary = store
        .get_cost_summary("acme", KeyType::Live, Duration::hours(1), now())
        .await;
    assert!(summary.estimated);
    assert!(summary.total_cost > 0.0);
}

#[tokio::test]
async fn test_cost_calls_ordering() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    seed(
        &store,
        vec![
            llm_call("m1", Some(0.05), now() - Duration::minutes(30)),
            llm_call("m2", Some(0.50), now() - Duration::minutes(20)),
            llm_call("m3", Some(0.10), now() - Duration::minutes(10)),
        ],
    )
    .await;

    let by_cost = store
        .get_cost_calls(
            "acme",
            KeyType::Live,
            &EventFilter::default(),
            CostCallOrder::Cost,
            None,
            None,
        )
        .await;
    let costs: Vec<f64> = by_cost.data.iter().map(|c| c.cost.unwrap()).collect();
    assert_eq!(costs, vec![0.50, 0.10, 0.05]);

    let newest = store
        .get_cost_calls(
            "acme",
            KeyType::Live,
            &EventFilter::default(),
            CostCallOrder::Newest,
            None,
            None,
        )
        .await;
    assert_eq!(newest.data[0].model.as_deref(), Some("m3"));
}

#[tokio::test]
async fn test_cost_timeseries_buckets() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    seed(
        &store,
        vec![
            llm_call("m1", Some(0.10), now() - Duration::minutes(90)),
            llm_call("m2", Some(0.20), now() - Duration::minutes(30)),
        ],
    )
    .await;

    let (buckets, by_model) = store
        .get_cost_timeseries(
            "acme",
            KeyType::Live,
            Duration::hours(2),
            Duration::hours(1),
            true,
            now(),
        )
        .await;

    assert_eq!(buckets.len(), 2);
    assert!((buckets[0].cost - 0.10).abs() < 1e-9);
    assert!((buckets[1].cost - 0.20).abs() < 1e-9);
    assert_eq!(buckets[0].call_count, 1);
    assert_eq!(buckets[0].tokens_in, 100);

    let series = by_model.unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].model, "m1");
    assert_eq!(series[1].model, "m2");
}

#[tokio::test]
async fn test_test_key_calls_invisible_to_live() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let mut test_call = llm_call("m1", Some(0.10), now() - Duration::minutes(5));
    test_call.key_type = KeyType::Test;
    seed(&store, vec![test_call]).await;

    let live_view = store
        .get_cost_summary("acme", KeyType::Live, Duration::hours(1), now())
        .await;
    assert_eq!(live_view.total_calls, 0);

    let test_view = store
        .get_cost_summary("acme", KeyType::Test, Duration::hours(1), now())
        .await;
    assert_eq!(test_view.total_calls, 1);
}

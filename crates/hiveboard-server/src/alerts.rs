use chrono::{DateTime, Utc};
use hiveboard_store::{effective_cost, Store};
use hiveboard_types::{
    AlertConditionType, AlertHistoryEntry, AlertRule, Event, EventType, PayloadData,
};
use uuid::Uuid;

/// Evaluate the tenant's enabled rules against one accepted batch,
/// appending to alert history for every rule that fires.
///
/// Runs after persistence and never fails ingestion; the caller logs
/// errors and moves on.
pub async fn evaluate_rules(
    store: &Store,
    tenant_id: &str,
    events: &[Event],
    now: DateTime<Utc>,
) -> Result<usize, hiveboard_store::Error> {
    if events.is_empty() {
        return Ok(0);
    }

    let rules = store.list_alert_rules(tenant_id).await;
    let mut fired = 0;

    for rule in rules.iter().filter(|r| r.enabled) {
        if let Some(triggering) = check_rule(rule, events) {
            store
                .append_alert_history(AlertHistoryEntry {
                    event_id: Uuid::new_v4(),
                    rule_id: rule.rule_id.clone(),
                    tenant_id: tenant_id.to_string(),
                    fired_at: now,
                    triggering_event_ids: triggering,
                    resolved_at: None,
                })
                .await?;
            fired += 1;
            tracing::info!(tenant = tenant_id, rule = %rule.rule_id, "alert fired");
        }
    }
    Ok(fired)
}

/// Returns the triggering event ids when the rule's condition holds for
/// this batch.
fn check_rule(rule: &AlertRule, events: &[Event]) -> Option<Vec<Uuid>> {
    match rule.condition_type {
        AlertConditionType::EventCount => {
            let wanted_type = rule
                .condition_params
                .get("event_type")
                .and_then(|v| v.as_str())
                .and_then(EventType::parse);
            let threshold = threshold_u64(rule)?;

            let matching: Vec<Uuid> = events
                .iter()
                .filter(|e| wanted_type.map_or(true, |t| e.event_type == t))
                .map(|e| e.event_id)
                .collect();
            (matching.len() as u64 >= threshold).then_some(matching)
        }
        AlertConditionType::ErrorRate => {
            let threshold = threshold_f64(rule)?;
            let completed = events
                .iter()
                .filter(|e| e.event_type == EventType::TaskCompleted)
                .count();
            let failed: Vec<Uuid> = events
                .iter()
                .filter(|e| e.event_type == EventType::TaskFailed)
                .map(|e| e.event_id)
                .collect();

            let finished = completed + failed.len();
            if finished == 0 {
                return None;
            }
            let rate = failed.len() as f64 / finished as f64;
            (rate >= threshold).then_some(failed)
        }
        AlertConditionType::CostThreshold => {
            let threshold = threshold_f64(rule)?;
            let mut total = 0.0;
            let mut calls: Vec<Uuid> = Vec::new();
            for event in events {
                if let Some(PayloadData::LlmCall(call)) = event.payload_data() {
                    if let (Some(cost), _) = effective_cost(call) {
                        total += cost;
                        calls.push(event.event_id);
                    }
                }
            }
            (total >= threshold && !calls.is_empty()).then_some(calls)
        }
    }
}

fn threshold_u64(rule: &AlertRule) -> Option<u64> {
    rule.condition_params.get("threshold").and_then(|v| v.as_u64())
}

fn threshold_f64(rule: &AlertRule) -> Option<f64> {
    rule.condition_params.get("threshold").and_then(|v| v.as_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiveboard_types::{KeyType, Severity};
    use serde_json::json;

    fn event(event_type: EventType) -> Event {
        Event {
            event_id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            key_type: KeyType::Live,
            timestamp: "2026-03-01T12:00:00Z".parse().unwrap(),
            event_type,
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
            payload: None,
        }
    }

    fn rule(condition_type: AlertConditionType, params: serde_json::Value) -> AlertRule {
        AlertRule {
            rule_id: "r1".to_string(),
            tenant_id: "t1".to_string(),
            name: "rule".to_string(),
            condition_type,
            condition_params: params,
            severity: Severity::Warn,
            channels: vec!["dashboard".to_string()],
            enabled: true,
        }
    }

    #[test]
    fn test_event_count_condition() {
        let r = rule(
            AlertConditionType::EventCount,
            json!({"event_type": "task_failed", "threshold": 2}),
        );

        let below = vec![event(EventType::TaskFailed)];
        assert!(check_rule(&r, &below).is_none());

        let at = vec![event(EventType::TaskFailed), event(EventType::TaskFailed)];
        let triggering = check_rule(&r, &at).unwrap();
        assert_eq!(triggering.len(), 2);
    }

    #[test]
    fn test_error_rate_condition() {
        let r = rule(AlertConditionType::ErrorRate, json!({"threshold": 0.5}));

        let healthy = vec![
            event(EventType::TaskCompleted),
            event(EventType::TaskCompleted),
            event(EventType::TaskFailed),
        ];
        assert!(check_rule(&r, &healthy).is_none());

        let failing = vec![event(EventType::TaskCompleted), event(EventType::TaskFailed)];
        assert!(check_rule(&r, &failing).is_some());
    }

    #[test]
    fn test_cost_threshold_condition() {
        let r = rule(AlertConditionType::CostThreshold, json!({"threshold": 0.3}));

        let mut call = event(EventType::Custom);
        call.payload = Some(
            serde_json::from_value(json!({
                "kind": "llm_call",
                "data": {"model": "m", "tokens_in": 1, "tokens_out": 1, "cost": 0.35}
            }))
            .unwrap(),
        );

        assert!(check_rule(&r, std::slice::from_ref(&call)).is_some());

        let r_high = rule(AlertConditionType::CostThreshold, json!({"threshold": 10.0}));
        assert!(check_rule(&r_high, &[call]).is_none());
    }

    #[test]
    fn test_missing_threshold_never_fires() {
        let r = rule(AlertConditionType::EventCount, json!({}));
        assert!(check_rule(&r, &[event(EventType::TaskFailed)]).is_none());
    }
}

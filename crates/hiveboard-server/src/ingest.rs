use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use hiveboard_engine::heartbeat_age_seconds;
use hiveboard_types::{
    exceeds, parse_timestamp, truncate, AgentStatus, Event, EventStatus, EventType, KeyType,
    Payload, Severity, MAX_BATCH_EVENTS, MAX_ENVIRONMENT_LEN, MAX_GROUP_LEN, MAX_ID_LEN,
    MAX_PAYLOAD_BYTES, MAX_SUMMARY_LEN,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::broadcast::{StatusChange, StuckNotice};
use crate::error::ApiError;
use crate::state::AppState;

/// Per-batch header; its fields are inherited onto events that lack them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    pub agent_id: Option<String>,
    pub agent_type: Option<String>,
    pub agent_version: Option<String>,
    pub framework: Option<String>,
    pub sdk_version: Option<String>,
    pub environment: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub envelope: Envelope,
    #[serde(default)]
    pub events: Vec<Value>,
}

/// Wire shape of one submitted event, before validation. Everything is
/// optional here; validation decides what is fatal for the event.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawEvent {
    event_id: Option<String>,
    timestamp: Option<String>,
    event_type: Option<String>,
    severity: Option<String>,
    status: Option<String>,
    agent_id: Option<String>,
    project_id: Option<String>,
    task_id: Option<String>,
    action_id: Option<String>,
    parent_action_id: Option<String>,
    environment: Option<String>,
    group: Option<String>,
    agent_type: Option<String>,
    agent_version: Option<String>,
    framework: Option<String>,
    sdk_version: Option<String>,
    duration_ms: Option<u64>,
    payload: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestIssue {
    pub event_id: Option<String>,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub warnings: Vec<IngestIssue>,
    pub errors: Vec<IngestIssue>,
}

pub async fn ingest_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let request: IngestRequest = serde_json::from_value(body)
        .map_err(|err| ApiError::bad_request(format!("malformed ingest body: {}", err)))?;
    let (status, response) = process_batch(&state, &auth, request).await?;
    Ok((status, Json(response)))
}

/// The ingestion pipeline: batch checks, fail-open per-event validation,
/// envelope enrichment, chronological ordering, state side-effects,
/// broadcast and alert evaluation.
pub async fn process_batch(
    state: &AppState,
    auth: &AuthContext,
    request: IngestRequest,
) -> Result<(StatusCode, IngestResponse), ApiError> {
    if auth.key_type == KeyType::Read {
        return Err(ApiError::forbidden("read keys cannot ingest events"));
    }
    if request.events.len() > MAX_BATCH_EVENTS {
        return Err(ApiError::bad_request(format!(
            "batch of {} events exceeds the {} event limit",
            request.events.len(),
            MAX_BATCH_EVENTS
        )));
    }
    let Some(envelope_agent_id) = request.envelope.agent_id.clone().filter(|id| !id.is_empty())
    else {
        return Err(ApiError::bad_request("envelope.agent_id is required"));
    };

    let mut warnings: Vec<IngestIssue> = Vec::new();
    let mut errors: Vec<IngestIssue> = Vec::new();
    let mut accepted: Vec<Event> = Vec::new();

    for raw_value in request.events {
        match validate_event(
            state,
            auth,
            &request.envelope,
            &envelope_agent_id,
            raw_value,
            &mut warnings,
        )
        .await
        {
            Ok(event) => accepted.push(event),
            Err(issue) => errors.push(issue),
        }
    }

    // Side-effects read the batch in chronological order, not submission
    // order
    accepted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let accepted_count = accepted.len();
    let rejected_count = errors.len();
    let now = Utc::now();

    if accepted_count > 0 {
        let had_heartbeat = accepted
            .iter()
            .any(|e| e.event_type == EventType::Heartbeat);

        let outcome = state
            .store
            .insert_batch(
                &auth.tenant_id,
                &envelope_agent_id,
                accepted,
                now,
                state.config.stuck_threshold(),
            )
            .await?;

        if outcome.new_status != outcome.previous_status {
            state
                .bus
                .broadcast_agent_status_change(
                    &auth.tenant_id,
                    &StatusChange {
                        agent_id: envelope_agent_id.clone(),
                        previous_status: outcome.previous_status,
                        new_status: outcome.new_status,
                        current_task_id: outcome.current_task_id.clone(),
                        current_project_id: outcome.current_project_id.clone(),
                        heartbeat_age_seconds: heartbeat_age_seconds(outcome.last_heartbeat, now),
                    },
                )
                .await;
        }

        {
            let mut tracker = state.stuck.lock().await;
            if outcome.new_status == AgentStatus::Stuck {
                if tracker.should_fire(&auth.tenant_id, &envelope_agent_id, now) {
                    state
                        .bus
                        .broadcast_agent_stuck(
                            &auth.tenant_id,
                            &StuckNotice {
                                agent_id: envelope_agent_id.clone(),
                                last_heartbeat: outcome.last_heartbeat,
                                stuck_threshold_seconds: state.config.stuck_threshold_seconds,
                                task_id: outcome.current_task_id.clone(),
                            },
                        )
                        .await;
                }
            } else if had_heartbeat && tracker.is_fired(&auth.tenant_id, &envelope_agent_id) {
                tracker.clear(&auth.tenant_id, &envelope_agent_id);
                state
                    .bus
                    .clear_stuck(&auth.tenant_id, &envelope_agent_id)
                    .await;
            }
        }

        state
            .bus
            .broadcast_events(&auth.tenant_id, &outcome.inserted)
            .await;

        // Fire-and-forget: a failing rule never fails the batch
        if let Err(err) =
            crate::alerts::evaluate_rules(&state.store, &auth.tenant_id, &outcome.inserted, now)
                .await
        {
            tracing::warn!(tenant = %auth.tenant_id, error = %err, "alert evaluation failed");
        }
    }

    let response = IngestResponse {
        accepted: accepted_count,
        rejected: rejected_count,
        warnings,
        errors,
    };
    let status = if response.rejected == 0 && response.warnings.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, response))
}

/// Validate and enrich one submitted event. Ok(event) means stored;
/// Err(issue) rejects this event only.
async fn validate_event(
    state: &AppState,
    auth: &AuthContext,
    envelope: &Envelope,
    envelope_agent_id: &str,
    raw_value: Value,
    warnings: &mut Vec<IngestIssue>,
) -> Result<Event, IngestIssue> {
    let submitted_id = raw_value
        .get("event_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let raw: RawEvent = serde_json::from_value(raw_value).map_err(|err| IngestIssue {
        event_id: submitted_id.clone(),
        code: "invalid_event",
        message: format!("event does not match the schema: {}", err),
    })?;

    // Schema: id, timestamp, type
    let event_id = raw
        .event_id
        .as_deref()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| IngestIssue {
            event_id: submitted_id.clone(),
            code: "invalid_event_id",
            message: "event_id must be a UUID".to_string(),
        })?;

    let timestamp = raw
        .timestamp
        .as_deref()
        .and_then(parse_timestamp)
        .ok_or_else(|| IngestIssue {
            event_id: submitted_id.clone(),
            code: "invalid_timestamp",
            message: "timestamp must be RFC-3339".to_string(),
        })?;

    let event_type = raw
        .event_type
        .as_deref()
        .and_then(EventType::parse)
        .ok_or_else(|| IngestIssue {
            event_id: submitted_id.clone(),
            code: "invalid_event_type",
            message: format!(
                "unknown event_type '{}'",
                raw.event_type.as_deref().unwrap_or("")
            ),
        })?;

    // Size limits: identifiers truncate with a warning, oversize payloads
    // reject this event only
    let mut agent_id = raw
        .agent_id
        .clone()
        .unwrap_or_else(|| envelope_agent_id.to_string());
    if exceeds(&agent_id, MAX_ID_LEN) {
        agent_id = truncate(&agent_id, MAX_ID_LEN);
        push_truncation_warning(warnings, &submitted_id, "agent_id", MAX_ID_LEN);
    }

    let mut task_id = raw.task_id.clone();
    if let Some(ref mut id) = task_id {
        if exceeds(id, MAX_ID_LEN) {
            *id = truncate(id, MAX_ID_LEN);
            push_truncation_warning(warnings, &submitted_id, "task_id", MAX_ID_LEN);
        }
    }

    let mut environment = raw.environment.clone().or_else(|| envelope.environment.clone());
    if let Some(ref mut value) = environment {
        if exceeds(value, MAX_ENVIRONMENT_LEN) {
            *value = truncate(value, MAX_ENVIRONMENT_LEN);
            push_truncation_warning(warnings, &submitted_id, "environment", MAX_ENVIRONMENT_LEN);
        }
    }

    let mut group = raw.group.clone().or_else(|| envelope.group.clone());
    if let Some(ref mut value) = group {
        if exceeds(value, MAX_GROUP_LEN) {
            *value = truncate(value, MAX_GROUP_LEN);
            push_truncation_warning(warnings, &submitted_id, "group", MAX_GROUP_LEN);
        }
    }

    let payload = validate_payload(raw.payload.clone(), &submitted_id, warnings)?;

    // Severity: default per event type, refined per payload kind for custom
    // events; an invalid value keeps the event with a warning
    let default_severity = match (&payload, event_type) {
        (Some(payload), EventType::Custom) => payload
            .data
            .default_severity()
            .unwrap_or_else(|| event_type.default_severity()),
        _ => event_type.default_severity(),
    };
    let severity = match raw.severity.as_deref() {
        None => default_severity,
        Some(s) => Severity::parse(s).unwrap_or_else(|| {
            warnings.push(IngestIssue {
                event_id: submitted_id.clone(),
                code: "invalid_severity",
                message: format!("unknown severity '{}', defaulted to {}", s, default_severity.as_str()),
            });
            default_severity
        }),
    };

    let status = match raw.status.as_deref() {
        None => None,
        Some(s) => match EventStatus::parse(s) {
            Some(status) => Some(status),
            None => {
                warnings.push(IngestIssue {
                    event_id: submitted_id.clone(),
                    code: "invalid_status",
                    message: format!("unknown status '{}', dropped", s),
                });
                None
            }
        },
    };

    // Project: an unknown project rejects the event, the rest of the batch
    // is unaffected
    if let Some(project_id) = raw.project_id.as_deref() {
        if !state.store.project_known(&auth.tenant_id, project_id).await {
            return Err(IngestIssue {
                event_id: submitted_id.clone(),
                code: "unknown_project",
                message: format!("unknown project '{}'", project_id),
            });
        }
    }

    Ok(Event {
        event_id,
        tenant_id: auth.tenant_id.clone(),
        key_type: auth.key_type,
        timestamp,
        event_type,
        severity,
        status,
        agent_id,
        project_id: raw.project_id,
        task_id,
        action_id: raw.action_id,
        parent_action_id: raw.parent_action_id,
        environment,
        group,
        agent_type: raw.agent_type.or_else(|| envelope.agent_type.clone()),
        agent_version: raw.agent_version.or_else(|| envelope.agent_version.clone()),
        framework: raw.framework.or_else(|| envelope.framework.clone()),
        sdk_version: raw.sdk_version.or_else(|| envelope.sdk_version.clone()),
        duration_ms: raw.duration_ms,
        payload,
    })
}

fn validate_payload(
    raw: Option<Value>,
    submitted_id: &Option<String>,
    warnings: &mut Vec<IngestIssue>,
) -> Result<Option<Payload>, IngestIssue> {
    let Some(value) = raw else {
        return Ok(None);
    };

    let serialized_len = serde_json::to_string(&value).map(|s| s.len()).unwrap_or(0);
    if serialized_len > MAX_PAYLOAD_BYTES {
        return Err(IngestIssue {
            event_id: submitted_id.clone(),
            code: "payload_too_large",
            message: format!(
                "payload is {} bytes, limit is {}",
                serialized_len, MAX_PAYLOAD_BYTES
            ),
        });
    }

    if !value.is_object() {
        warnings.push(IngestIssue {
            event_id: submitted_id.clone(),
            code: "payload_not_object",
            message: "payload must be a JSON object, dropped".to_string(),
        });
        return Ok(None);
    }

    // Parsing never fails from here: unknown shapes land in the Unknown
    // variant verbatim
    let mut payload: Payload =
        serde_json::from_value(value).unwrap_or_else(|_| Payload {
            summary: None,
            tags: Vec::new(),
            data: hiveboard_types::PayloadData::Unknown {
                kind: None,
                data: None,
            },
        });

    if let Some(ref mut summary) = payload.summary {
        if exceeds(summary, MAX_SUMMARY_LEN) {
            *summary = truncate(summary, MAX_SUMMARY_LEN);
            push_truncation_warning(warnings, submitted_id, "payload.summary", MAX_SUMMARY_LEN);
        }
    }

    // Payload convention: a known kind with missing conventional fields is
    // an advisory warning, never a rejection
    let missing = payload.data.missing_fields();
    if !missing.is_empty() {
        warnings.push(IngestIssue {
            event_id: submitted_id.clone(),
            code: "payload_missing_fields",
            message: format!(
                "payload kind '{}' is missing: {}",
                payload.data.kind().unwrap_or("?"),
                missing.join(", ")
            ),
        });
    }

    Ok(Some(payload))
}

fn push_truncation_warning(
    warnings: &mut Vec<IngestIssue>,
    submitted_id: &Option<String>,
    field: &str,
    limit: usize,
) {
    warnings.push(IngestIssue {
        event_id: submitted_id.clone(),
        code: "truncated",
        message: format!("{} exceeded {} characters and was truncated", field, limit),
    });
}

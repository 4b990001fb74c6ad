use axum::extract::{Query, State};
use axum::{Extension, Json};
use hiveboard_store::{filter_events, paginate, EventFilter};
use hiveboard_types::{parse_timestamp, Event, EventType, Severity};
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::AppState;

use super::Paginated;

#[derive(Debug, Default, Deserialize)]
pub struct EventsParams {
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub event_type: Option<String>,
    pub severity: Option<String>,
    pub payload_kind: Option<String>,
    pub environment: Option<String>,
    pub group: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub exclude_heartbeats: Option<bool>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<EventsParams>,
) -> Result<Json<Paginated<Event>>, ApiError> {
    let event_type = match params.event_type.as_deref() {
        None => None,
        Some(raw) => Some(
            EventType::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown event_type '{}'", raw)))?,
        ),
    };
    let severity = match params.severity.as_deref() {
        None => None,
        Some(raw) => Some(
            Severity::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown severity '{}'", raw)))?,
        ),
    };
    let since = match params.since.as_deref() {
        None => None,
        Some(raw) => Some(
            parse_timestamp(raw)
                .ok_or_else(|| ApiError::bad_request("since must be RFC-3339"))?,
        ),
    };
    let until = match params.until.as_deref() {
        None => None,
        Some(raw) => Some(
            parse_timestamp(raw)
                .ok_or_else(|| ApiError::bad_request("until must be RFC-3339"))?,
        ),
    };

    let filter = EventFilter {
        agent_id: params.agent_id,
        task_id: params.task_id,
        project_id: params.project_id,
        event_type,
        severity,
        payload_kind: params.payload_kind,
        environment: params.environment,
        group: params.group,
        since,
        until,
        exclude_heartbeats: params.exclude_heartbeats.unwrap_or(true),
        limit: params.limit,
        cursor: params.cursor.clone(),
    };

    let rows = state.store.tenant_events(&auth.tenant_id).await;
    let matched = filter_events(&rows, &auth.tenant_id, auth.key_type, &filter, false);
    let page = paginate(matched, params.limit, params.cursor.as_deref());
    Ok(Json(page.into()))
}

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use hiveboard_store::{TaskQuery, TaskSummary, TaskTimeline};
use hiveboard_types::parse_timestamp;
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::AppState;

use super::Paginated;

#[derive(Debug, Default, Deserialize)]
pub struct TasksParams {
    pub agent_id: Option<String>,
    pub project_id: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<TasksParams>,
) -> Result<Json<Paginated<TaskSummary>>, ApiError> {
    let since = parse_optional_ts(params.since.as_deref(), "since")?;
    let until = parse_optional_ts(params.until.as_deref(), "until")?;

    let query = TaskQuery {
        agent_id: params.agent_id,
        project_id: params.project_id,
        since,
        until,
        limit: params.limit,
        cursor: params.cursor,
    };

    let page = state
        .store
        .list_tasks(&auth.tenant_id, auth.key_type, &query)
        .await;
    Ok(Json(page.into()))
}

pub async fn get_timeline(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskTimeline>, ApiError> {
    state
        .store
        .get_timeline(&auth.tenant_id, auth.key_type, &task_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("task {}", task_id)))
}

fn parse_optional_ts(
    raw: Option<&str>,
    field: &str,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => parse_timestamp(s)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("{} must be RFC-3339", field))),
    }
}

use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use hiveboard_store::{CostBucket, CostCall, CostCallOrder, CostSummary, EventFilter, ModelSeries};
use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::AppState;

use super::{parse_interval, parse_range, Paginated};

#[derive(Debug, Default, Deserialize)]
pub struct CostParams {
    pub range: Option<String>,
}

pub async fn get_summary(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<CostParams>,
) -> Result<Json<CostSummary>, ApiError> {
    let range = parse_range(params.range.as_deref())?;
    let summary = state
        .store
        .get_cost_summary(&auth.tenant_id, auth.key_type, range, Utc::now())
        .await;
    Ok(Json(summary))
}

#[derive(Debug, Default, Deserialize)]
pub struct CallsParams {
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub order: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

pub async fn get_calls(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<CallsParams>,
) -> Result<Json<Paginated<CostCall>>, ApiError> {
    let order = match params.order.as_deref() {
        None | Some("newest") => CostCallOrder::Newest,
        Some("cost") => CostCallOrder::Cost,
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "order must be 'cost' or 'newest', got '{}'",
                other
            )))
        }
    };

    let filter = EventFilter {
        agent_id: params.agent_id,
        task_id: params.task_id,
        ..EventFilter::default()
    };

    let page = state
        .store
        .get_cost_calls(
            &auth.tenant_id,
            auth.key_type,
            &filter,
            order,
            params.limit,
            params.cursor.as_deref(),
        )
        .await;
    Ok(Json(page.into()))
}

#[derive(Debug, Default, Deserialize)]
pub struct TimeseriesParams {
    pub range: Option<String>,
    pub interval: Option<String>,
    pub split_by_model: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TimeseriesResponse {
    pub buckets: Vec<CostBucket>,
    pub by_model: Option<Vec<ModelSeries>>,
}

pub async fn get_timeseries(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<TimeseriesParams>,
) -> Result<Json<TimeseriesResponse>, ApiError> {
    let range = parse_range(params.range.as_deref())?;
    let interval = parse_interval(params.interval.as_deref(), range)?;

    let (buckets, by_model) = state
        .store
        .get_cost_timeseries(
            &auth.tenant_id,
            auth.key_type,
            range,
            interval,
            params.split_by_model.unwrap_or(false),
            Utc::now(),
        )
        .await;
    Ok(Json(TimeseriesResponse { buckets, by_model }))
}

use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use hiveboard_store::{GroupBy, MetricsReport};
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::AppState;

use super::{parse_interval, parse_range};

#[derive(Debug, Default, Deserialize)]
pub struct MetricsParams {
    pub range: Option<String>,
    pub interval: Option<String>,
    pub group_by: Option<String>,
    /// Accepted for dashboard compatibility; every bucket carries all
    /// metrics, so nothing is filtered server-side.
    #[allow(dead_code)]
    pub metric: Option<String>,
}

pub async fn get_metrics(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<MetricsParams>,
) -> Result<Json<MetricsReport>, ApiError> {
    let range = parse_range(params.range.as_deref())?;
    let interval = parse_interval(params.interval.as_deref(), range)?;

    let group_by = match params.group_by.as_deref() {
        None => None,
        Some("agent") => Some(GroupBy::Agent),
        Some("model") => Some(GroupBy::Model),
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "group_by must be 'agent' or 'model', got '{}'",
                other
            )))
        }
    };

    let report = state
        .store
        .get_metrics(
            &auth.tenant_id,
            auth.key_type,
            range,
            interval,
            group_by,
            Utc::now(),
        )
        .await;
    Ok(Json(report))
}

use axum::routing::{get, patch};
use axum::Router;
use chrono::Duration;
use hiveboard_store::Page;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

pub mod agents;
pub mod alerts;
pub mod bridge;
pub mod cost;
pub mod events;
pub mod metrics;
pub mod projects;
pub mod stream;
pub mod tasks;

/// The authenticated read/CRUD surface under /v1.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/agents", get(agents::list_agents))
        .route("/v1/agents/{id}", get(agents::get_agent))
        .route("/v1/agents/{id}/pipeline", get(agents::get_pipeline))
        .route("/v1/tasks", get(tasks::list_tasks))
        .route("/v1/tasks/{id}/timeline", get(tasks::get_timeline))
        .route("/v1/events", get(events::list_events))
        .route("/v1/metrics", get(metrics::get_metrics))
        .route("/v1/cost", get(cost::get_summary))
        .route("/v1/cost/calls", get(cost::get_calls))
        .route("/v1/cost/timeseries", get(cost::get_timeseries))
        .route("/v1/llm-calls", get(cost::get_calls))
        .route("/v1/projects", get(projects::list).post(projects::create))
        .route(
            "/v1/projects/{id}",
            patch(projects::update).delete(projects::remove),
        )
        .route("/v1/alerts/rules", get(alerts::list_rules).post(alerts::create_rule))
        .route(
            "/v1/alerts/rules/{id}",
            patch(alerts::update_rule).delete(alerts::delete_rule),
        )
        .route("/v1/alerts/history", get(alerts::list_history))
}

/// Standard list envelope: `{data, pagination: {cursor, has_more}}`.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub cursor: Option<String>,
    pub has_more: bool,
}

impl<T> From<Page<T>> for Paginated<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            data: page.data,
            pagination: Pagination {
                cursor: page.cursor,
                has_more: page.has_more,
            },
        }
    }
}

/// Unpaginated list envelope for small collections (agents, projects).
#[derive(Debug, Clone, Serialize)]
pub struct Listed<T> {
    pub data: Vec<T>,
}

/// Parse a `range` query value ("15m", "1h", "24h", "7d", "30d").
pub fn parse_range(raw: Option<&str>) -> Result<Duration, ApiError> {
    match raw.unwrap_or("24h") {
        "15m" => Ok(Duration::minutes(15)),
        "1h" => Ok(Duration::hours(1)),
        "6h" => Ok(Duration::hours(6)),
        "24h" => Ok(Duration::hours(24)),
        "7d" => Ok(Duration::days(7)),
        "30d" => Ok(Duration::days(30)),
        other => Err(ApiError::bad_request(format!("unknown range '{}'", other))),
    }
}

/// Parse an `interval` query value; defaults scale with the range.
pub fn parse_interval(raw: Option<&str>, range: Duration) -> Result<Duration, ApiError> {
    match raw {
        None => Ok(default_interval(range)),
        Some("minute") => Ok(Duration::minutes(1)),
        Some("hour") => Ok(Duration::hours(1)),
        Some("day") => Ok(Duration::days(1)),
        Some(other) => Err(ApiError::bad_request(format!(
            "unknown interval '{}'",
            other
        ))),
    }
}

fn default_interval(range: Duration) -> Duration {
    if range <= Duration::hours(1) {
        Duration::minutes(1)
    } else if range <= Duration::hours(24) {
        Duration::hours(1)
    } else {
        Duration::days(1)
    }
}

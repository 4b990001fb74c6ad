use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use hiveboard_types::{AlertConditionType, AlertHistoryEntry, AlertRule, KeyType, Severity};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::AppState;

use super::Listed;

pub async fn list_rules(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Listed<AlertRule>>, ApiError> {
    let data = state.store.list_alert_rules(&auth.tenant_id).await;
    Ok(Json(Listed { data }))
}

#[derive(Debug, Deserialize)]
pub struct CreateRule {
    pub name: String,
    pub condition_type: AlertConditionType,
    #[serde(default)]
    pub condition_params: serde_json::Value,
    pub severity: Option<Severity>,
    #[serde(default)]
    pub channels: Vec<String>,
    pub enabled: Option<bool>,
}

pub async fn create_rule(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<CreateRule>,
) -> Result<(StatusCode, Json<AlertRule>), ApiError> {
    require_write(&auth)?;

    let rule = AlertRule {
        rule_id: Uuid::new_v4().to_string(),
        tenant_id: auth.tenant_id.clone(),
        name: body.name,
        condition_type: body.condition_type,
        condition_params: body.condition_params,
        severity: body.severity.unwrap_or(Severity::Warn),
        channels: body.channels,
        enabled: body.enabled.unwrap_or(true),
    };
    let rule = state.store.create_alert_rule(rule).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRule {
    pub name: Option<String>,
    pub condition_type: Option<AlertConditionType>,
    pub condition_params: Option<serde_json::Value>,
    pub severity: Option<Severity>,
    pub channels: Option<Vec<String>>,
    pub enabled: Option<bool>,
}

pub async fn update_rule(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(rule_id): Path<String>,
    Json(body): Json<UpdateRule>,
) -> Result<Json<AlertRule>, ApiError> {
    require_write(&auth)?;

    let rules = state.store.list_alert_rules(&auth.tenant_id).await;
    let mut rule = rules
        .into_iter()
        .find(|r| r.rule_id == rule_id)
        .ok_or_else(|| ApiError::not_found(format!("alert rule {}", rule_id)))?;

    if let Some(name) = body.name {
        rule.name = name;
    }
    if let Some(condition_type) = body.condition_type {
        rule.condition_type = condition_type;
    }
    if let Some(condition_params) = body.condition_params {
        rule.condition_params = condition_params;
    }
    if let Some(severity) = body.severity {
        rule.severity = severity;
    }
    if let Some(channels) = body.channels {
        rule.channels = channels;
    }
    if let Some(enabled) = body.enabled {
        rule.enabled = enabled;
    }

    let rule = state.store.update_alert_rule(rule).await?;
    Ok(Json(rule))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(rule_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_write(&auth)?;
    state
        .store
        .delete_alert_rule(&auth.tenant_id, &rule_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

pub async fn list_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Listed<AlertHistoryEntry>>, ApiError> {
    let data = state
        .store
        .list_alert_history(&auth.tenant_id, params.limit.unwrap_or(100))
        .await;
    Ok(Json(Listed { data }))
}

fn require_write(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.key_type == KeyType::Read {
        return Err(ApiError::forbidden("read keys cannot modify alert rules"));
    }
    Ok(())
}

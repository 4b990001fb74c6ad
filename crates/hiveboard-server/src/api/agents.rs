use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use hiveboard_engine::PipelineView;
use hiveboard_store::{AgentQuery, AgentSummary};
use hiveboard_types::AgentStatus;
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::broadcast::StuckNotice;
use crate::error::ApiError;
use crate::state::AppState;

use super::Listed;

#[derive(Debug, Default, Deserialize)]
pub struct AgentsParams {
    pub environment: Option<String>,
    pub group: Option<String>,
    pub project_id: Option<String>,
    pub sort: Option<String>,
}

pub async fn list_agents(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<AgentsParams>,
) -> Result<Json<Listed<AgentSummary>>, ApiError> {
    let query = AgentQuery {
        environment: params.environment,
        group: params.group,
        project_id: params.project_id,
        sort_attention: params.sort.as_deref() == Some("attention"),
    };

    let agents = state
        .store
        .list_agents(
            &auth.tenant_id,
            auth.key_type,
            &query,
            Utc::now(),
            state.config.stuck_threshold(),
        )
        .await;

    announce_stuck(&state, &auth.tenant_id, &agents).await;
    Ok(Json(Listed { data: agents }))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentSummary>, ApiError> {
    let agent = state
        .store
        .get_agent(
            &auth.tenant_id,
            auth.key_type,
            &agent_id,
            Utc::now(),
            state.config.stuck_threshold(),
        )
        .await
        .ok_or_else(|| ApiError::not_found(format!("agent {}", agent_id)))?;

    announce_stuck(&state, &auth.tenant_id, std::slice::from_ref(&agent)).await;
    Ok(Json(agent))
}

pub async fn get_pipeline(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(agent_id): Path<String>,
) -> Result<Json<PipelineView>, ApiError> {
    if state
        .store
        .get_agent_record(&auth.tenant_id, &agent_id)
        .await
        .is_none()
    {
        return Err(ApiError::not_found(format!("agent {}", agent_id)));
    }

    let pipeline = state
        .store
        .get_pipeline(&auth.tenant_id, auth.key_type, &agent_id)
        .await;
    Ok(Json(pipeline))
}

/// Stuck detection also runs at query time: a freshly observed stuck agent
/// fires `agent.stuck` once for the contiguous period.
async fn announce_stuck(state: &AppState, tenant_id: &str, agents: &[AgentSummary]) {
    let now = Utc::now();
    for agent in agents {
        if agent.derived_status != AgentStatus::Stuck {
            continue;
        }
        let fire = {
            let mut tracker = state.stuck.lock().await;
            tracker.should_fire(tenant_id, &agent.agent_id, now)
        };
        if fire {
            state
                .bus
                .broadcast_agent_stuck(
                    tenant_id,
                    &StuckNotice {
                        agent_id: agent.agent_id.clone(),
                        last_heartbeat: agent.last_heartbeat,
                        stuck_threshold_seconds: state.config.stuck_threshold_seconds,
                        task_id: agent.current_task_id.clone(),
                    },
                )
                .await;
        }
    }
}

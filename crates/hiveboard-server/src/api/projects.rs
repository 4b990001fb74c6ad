use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use hiveboard_types::{KeyType, Project, ProjectStatus};
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::AppState;

use super::Listed;

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Listed<Project>>, ApiError> {
    let data = state.store.list_projects(&auth.tenant_id).await;
    Ok(Json(Listed { data }))
}

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub slug: String,
    pub name: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<CreateProject>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    require_write(&auth)?;
    if body.slug.is_empty() {
        return Err(ApiError::bad_request("slug must not be empty"));
    }

    let name = body.name.unwrap_or_else(|| body.slug.clone());
    let project = state
        .store
        .create_project(&auth.tenant_id, &body.slug, &name)
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub status: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(project_id): Path<String>,
    Json(body): Json<UpdateProject>,
) -> Result<Json<Project>, ApiError> {
    require_write(&auth)?;

    let status = match body.status.as_deref() {
        None => None,
        Some("open") => Some(ProjectStatus::Open),
        Some("archived") => Some(ProjectStatus::Archived),
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "status must be 'open' or 'archived', got '{}'",
                other
            )))
        }
    };

    let project = state
        .store
        .update_project(&auth.tenant_id, &project_id, body.name, status)
        .await?;
    Ok(Json(project))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(project_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_write(&auth)?;
    state
        .store
        .delete_project(&auth.tenant_id, &project_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn require_write(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.key_type == KeyType::Read {
        return Err(ApiError::forbidden("read keys cannot modify projects"));
    }
    Ok(())
}

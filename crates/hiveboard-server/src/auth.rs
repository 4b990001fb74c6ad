use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use hiveboard_types::{ApiKey, KeyType, PlanTier, Tenant};
use uuid::Uuid;

use crate::error::ApiError;
use crate::rate_limit::RateClass;
use crate::state::AppState;

/// What authentication resolved for this request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub tenant_id: String,
    pub key_id: String,
    pub key_type: KeyType,
}

/// Paths the bearer middleware leaves alone: liveness, static assets, and
/// the streaming surfaces, which authenticate their own tokens.
fn skips_auth(path: &str) -> bool {
    path == "/healthz"
        || path.starts_with("/static")
        || path.starts_with("/v1/stream")
        || path.starts_with("/ws/")
}

/// Bearer-key middleware: resolves the key, applies the per-key rate limit
/// and attaches an [`AuthContext`] extension.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if skips_auth(&path) {
        return next.run(req).await;
    }

    let Some(token) = bearer_token(&req) else {
        return ApiError::unauthorized().into_response();
    };
    let Some(key) = state.store.find_key_by_hash(&ApiKey::hash_raw(&token)).await else {
        return ApiError::unauthorized().into_response();
    };

    let class = if path == "/v1/ingest" {
        RateClass::Ingest
    } else {
        RateClass::Query
    };
    if let Err(retry_after) = state.rate_limiter.check(&key.key_id, class) {
        return ApiError::rate_limited(retry_after).into_response();
    }

    req.extensions_mut().insert(AuthContext {
        tenant_id: key.tenant_id,
        key_id: key.key_id,
        key_type: key.key_type,
    });
    next.run(req).await
}

fn bearer_token(req: &Request) -> Option<String> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

/// Resolve a raw stream token (`?token=`) into an auth context.
pub async fn authenticate_token(state: &AppState, token: &str) -> Option<AuthContext> {
    let key = state.store.find_key_by_hash(&ApiKey::hash_raw(token)).await?;
    Some(AuthContext {
        tenant_id: key.tenant_id,
        key_id: key.key_id,
        key_type: key.key_type,
    })
}

/// Seed the dev tenant and its live key from configuration. No-ops when no
/// dev_key is configured or when the key already exists.
pub async fn bootstrap_dev_tenant(state: &AppState) -> anyhow::Result<()> {
    let Some(dev_key) = state.config.dev_key.as_deref() else {
        return Ok(());
    };

    state
        .store
        .ensure_tenant(Tenant {
            tenant_id: "dev".to_string(),
            name: "Development".to_string(),
            // Widest retention window; dev data should not vanish mid-demo
            plan: PlanTier::Enterprise,
            created_at: Utc::now(),
        })
        .await?;

    state
        .store
        .insert_api_key(ApiKey {
            key_id: Uuid::new_v4().to_string(),
            tenant_id: "dev".to_string(),
            key_hash: ApiKey::hash_raw(dev_key),
            key_type: KeyType::Live,
            name: "dev bootstrap key".to_string(),
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!("dev tenant bootstrapped from configuration");
    Ok(())
}

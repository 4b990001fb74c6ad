use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use hiveboard_types::ApiKey;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::broadcast::ClientMessage;
use crate::error::ApiError;
use crate::rate_limit::RateClass;
use crate::state::AppState;

// The gateway-facing surface. These endpoints authenticate internally (the
// auth middleware skips /ws/); the gateway identifies the socket with a
// `connectionId` header.

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// `POST /ws/connect`
pub async fn ws_connect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
) -> Result<Json<Value>, ApiError> {
    let bridge = state
        .bridge
        .clone()
        .ok_or_else(|| ApiError::not_found("bridge is not active in this mode"))?;
    let connection_id = connection_id(&headers)?;

    let Some(token) = params.token else {
        return Err(ApiError::unauthorized());
    };
    let Some(key) = state
        .store
        .find_key_by_hash(&ApiKey::hash_raw(&token))
        .await
    else {
        return Err(ApiError::unauthorized());
    };

    if let Err(retry_after) = state.rate_limiter.check(&key.key_id, RateClass::WsConnect) {
        return Err(ApiError::rate_limited(retry_after));
    }

    bridge.register(&connection_id, &key).await;
    Ok(Json(json!({"ok": true})))
}

/// `POST /ws/disconnect`
pub async fn ws_disconnect(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let bridge = state
        .bridge
        .clone()
        .ok_or_else(|| ApiError::not_found("bridge is not active in this mode"))?;
    let connection_id = connection_id(&headers)?;
    bridge.unregister(&connection_id).await;
    Ok(Json(json!({"ok": true})))
}

/// `POST /ws/message`: the body is the client's subscribe/unsubscribe/ping.
/// Unknown connections re-register defensively when the body carries a
/// token (the gateway may be talking to a restarted server).
pub async fn ws_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(message): Json<ClientMessage>,
) -> Result<Json<Value>, ApiError> {
    let bridge = state
        .bridge
        .clone()
        .ok_or_else(|| ApiError::not_found("bridge is not active in this mode"))?;
    let connection_id = connection_id(&headers)?;

    if bridge
        .handle_message(&state.store, &connection_id, &message)
        .await
    {
        Ok(Json(json!({"ok": true})))
    } else {
        Err(ApiError::unauthorized())
    }
}

fn connection_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("connectionId")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| ApiError::bad_request("connectionId header is required"))
}

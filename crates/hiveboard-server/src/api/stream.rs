use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc::unbounded_channel;

use crate::auth::{authenticate_token, AuthContext};
use crate::broadcast::{ClientAction, ClientMessage, NativeBus};
use crate::error::ApiError;
use crate::rate_limit::RateClass;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    pub token: Option<String>,
}

/// `WS /v1/stream?token=...`: the native streaming surface. The middleware
/// skips this path; the token authenticates here.
pub async fn stream_handler(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(native) = state.native.clone() else {
        return ApiError::not_found("native streaming is disabled in this mode").into_response();
    };
    let Some(token) = params.token else {
        return ApiError::unauthorized().into_response();
    };
    let Some(auth) = authenticate_token(&state, &token).await else {
        return ApiError::unauthorized().into_response();
    };
    if let Err(retry_after) = state.rate_limiter.check(&auth.key_id, RateClass::WsConnect) {
        return ApiError::rate_limited(retry_after).into_response();
    }

    ws.on_upgrade(move |socket| run_stream(native, auth, socket))
}

async fn run_stream(native: Arc<NativeBus>, auth: AuthContext, mut socket: WebSocket) {
    let (tx, mut rx) = unbounded_channel();
    let id = native.register(&auth.tenant_id, tx).await;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                let Ok(text) = serde_json::to_string(&message) else { continue };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(client_message) =
                            serde_json::from_str::<ClientMessage>(text.as_str())
                        else {
                            continue;
                        };
                        // Any client traffic proves liveness for the ping loop
                        if client_message.action == ClientAction::Ping {
                            native.note_pong(id).await;
                        }
                        if let Some(reply) =
                            native.handle_client_message(id, &client_message).await
                        {
                            let Ok(reply_text) = serde_json::to_string(&reply) else {
                                continue;
                            };
                            if socket.send(Message::Text(reply_text.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => native.note_pong(id).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    native.unregister(id).await;
}

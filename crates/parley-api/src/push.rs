use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use tracing::{debug, error};

use parley_types::api::RegisterTokenRequest;

use crate::AppState;

/// Register a device push token for an existing user. Re-registering the
/// same token is a no-op that still reports success.
pub async fn register_token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<RegisterTokenRequest>,
) -> Result<Json<Value>, StatusCode> {
    if !state.token_limit.allow(addr.ip()) {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    if req.username.is_empty() || req.fcm_token.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let added = state
        .db
        .add_push_token(&req.username, &req.fcm_token)
        .map_err(|e| {
            error!("Token registration failed for {}: {}", req.username, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if !added {
        return Err(StatusCode::NOT_FOUND);
    }

    debug!("Registered push token for {}", req.username);
    Ok(Json(json!({ "success": true })))
}

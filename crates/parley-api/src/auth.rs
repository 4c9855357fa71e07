use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tracing::{error, info};

use parley_auth::{TOKEN_TTL_DAYS, hash_password, verify_password};
use parley_types::api::{AuthResponse, LoginRequest, SignupRequest};

use crate::AppState;

pub async fn signup(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if !state.auth_limit.allow(addr.ip()) {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let password_hash = hash_password(&req.password).map_err(|_| {
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let created = state
        .db
        .create_user(username, &password_hash)
        .map_err(|e| {
            error!("Signup failed for {}: {}", username, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if !created {
        return Err(StatusCode::CONFLICT);
    }

    let token = state
        .signer
        .sign(username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    info!("{} signed up via HTTP", username);
    Ok((
        StatusCode::CREATED,
        session_cookie(&token),
        Json(AuthResponse {
            success: true,
            username: username.to_string(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if !state.auth_limit.allow(addr.ip()) {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    let user = state
        .db
        .get_user_by_username(&req.username)
        .map_err(|e| {
            error!("Login lookup failed for {}: {}", req.username, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    verify_password(&req.password, &user.password).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let token = state
        .signer
        .sign(&user.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((
        session_cookie(&token),
        Json(AuthResponse {
            success: true,
            username: user.username,
        }),
    ))
}

/// Session token as an HttpOnly cookie so page scripts never see it.
/// Max-Age matches the token's own expiry.
fn session_cookie(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value = format!(
        "token={}; HttpOnly; Secure; SameSite=Strict; Max-Age={}",
        token,
        TOKEN_TTL_DAYS * 86_400
    );
    if let Ok(value) = value.parse() {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

//! HTTP surface: signup/login and push-token registration. Everything else
//! in the protocol happens over the WebSocket gateway.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use parley_auth::TokenSigner;
use parley_db::Database;

use crate::limit::RateLimiter;

pub mod auth;
pub mod limit;
pub mod messages;
pub mod push;

pub type AppState = Arc<ApiState>;

pub struct ApiState {
    pub db: Arc<Database>,
    pub signer: TokenSigner,
    /// 20 auth attempts per IP per minute.
    pub auth_limit: RateLimiter,
    /// 100 token registrations per IP per 15 minutes.
    pub token_limit: RateLimiter,
}

impl ApiState {
    pub fn new(db: Arc<Database>, signer: TokenSigner) -> AppState {
        Arc::new(Self {
            db,
            signer,
            auth_limit: RateLimiter::per_minute(20),
            token_limit: RateLimiter::new(100, std::time::Duration::from_secs(15 * 60)),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/signup", post(auth::signup))
        .route("/api/login", post(auth::login))
        .route("/api/register-token", post(push::register_token))
        .route("/api/messages", get(messages::recent))
        .with_state(state)
}

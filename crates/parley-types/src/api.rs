use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// JWT claims shared by the HTTP auth routes (parley-api) and the WebSocket
/// gateway (`token login`). Canonical definition lives here to avoid drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated username.
    pub sub: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub username: String,
}

// -- Push token registration --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterTokenRequest {
    pub username: String,
    #[serde(rename = "fcmToken")]
    pub fcm_token: String,
}

/// Notification payload handed to the push transport. Delivery is
/// best-effort; the transport may drop it entirely.
#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub link: String,
}

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use parley_db::Database;
use parley_types::api::PushPayload;

/// Best-effort web-push transport. Absent configuration disables it
/// entirely; every failure is swallowed and logged — a dropped
/// notification never affects message delivery.
#[derive(Clone)]
pub struct PushNotifier {
    client: reqwest::Client,
    endpoint: String,
    server_key: Option<String>,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    tokens: &'a [String],
    notification: &'a PushPayload,
}

impl PushNotifier {
    /// Build from `PARLEY_PUSH_URL` / `PARLEY_PUSH_KEY`. Returns `None`
    /// when no endpoint is configured.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("PARLEY_PUSH_URL").ok()?;
        let server_key = std::env::var("PARLEY_PUSH_KEY").ok();
        Some(Self {
            client: reqwest::Client::new(),
            endpoint,
            server_key,
        })
    }

    /// Send `payload` to every registered device token. Zero registered
    /// tokens is not an error.
    pub async fn notify_all(&self, db: Arc<Database>, payload: PushPayload) {
        let tokens = match tokio::task::spawn_blocking(move || db.all_push_tokens()).await {
            Ok(Ok(tokens)) => tokens,
            Ok(Err(e)) => {
                warn!("Push skipped, token query failed: {}", e);
                return;
            }
            Err(e) => {
                warn!("Push skipped, join error: {}", e);
                return;
            }
        };

        if tokens.is_empty() {
            debug!("No tokens registered to send notifications");
            return;
        }

        let body = PushRequest {
            tokens: &tokens,
            notification: &payload,
        };

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.server_key {
            req = req.header("Authorization", format!("key={}", key));
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("Push notification sent to {} tokens", tokens.len());
            }
            Ok(resp) => {
                warn!("Push endpoint returned {}", resp.status());
            }
            Err(e) => {
                warn!("Error sending push notification: {}", e);
            }
        }
    }
}

use axum::{Json, extract::State, http::StatusCode};
use tracing::error;

use parley_types::models::MessageView;

use crate::AppState;

/// Most recent 100 group messages, oldest first. HTTP mirror of the
/// socket-side group history fetch for clients that poll before the
/// gateway connects.
pub async fn recent(
    State(state): State<AppState>,
) -> Result<Json<Vec<MessageView>>, StatusCode> {
    let msgs = state.db.recent_group_messages(100).map_err(|e| {
        error!("Group history fetch failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(msgs))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parley_auth::TokenSigner;
    use parley_db::Database;
    use parley_types::models::MessageKind;

    use super::*;
    use crate::ApiState;

    #[tokio::test]
    async fn returns_recent_group_messages_ascending() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_message(MessageKind::Group, "ava", None, "first")
            .unwrap();
        db.insert_message(MessageKind::Group, "ben", None, "second")
            .unwrap();
        db.insert_message(MessageKind::Dm, "ava", Some("ben"), "private")
            .unwrap();

        let state = ApiState::new(db, TokenSigner::new("test-secret"));
        let Json(msgs) = recent(State(state)).await.unwrap();

        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].text, "first");
        assert_eq!(msgs[1].text, "second");
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a message lives in the shared group room or a pairwise DM thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Group,
    Dm,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Group => "group",
            MessageKind::Dm => "dm",
        }
    }
}

/// A fully hydrated message as sent to clients.
///
/// Group and direct messages share one shape: `to` is `None` for group
/// messages. `text` is stored sanitized; clients decode the fixed entity
/// set before rendering through a text-only sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: i64,
    pub kind: MessageKind,
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub delivered_to: Vec<String>,
    pub seen_by: Vec<String>,
    pub reactions: ReactionMap,
    pub edited: bool,
}

/// emoji -> usernames who applied it. BTreeMap keeps serialization stable.
/// An emoji key never maps to an empty set: the map is materialized from
/// reaction rows, so removing the last user drops the key.
pub type ReactionMap = BTreeMap<String, Vec<String>>;

/// Friends / pending-request snapshot for one user's sidebar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sidebar {
    pub friends: Vec<String>,
    pub friend_requests: Vec<String>,
}

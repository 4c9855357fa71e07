use serde::{Deserialize, Serialize};

use crate::models::{MessageKind, MessageView, ReactionMap, Sidebar};

/// Events sent FROM clients TO the server over the WebSocket gateway.
///
/// This is a closed union: payloads that fail to deserialize (unknown type,
/// missing required fields) are rejected and logged, never silently ignored.
/// Variant names are the wire names the deployed clients already speak.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "sign up")]
    SignUp { username: String, password: String },

    #[serde(rename = "sign in")]
    SignIn { username: String, password: String },

    /// Re-authenticate with a previously issued session token.
    #[serde(rename = "token login")]
    TokenLogin(String),

    #[serde(rename = "chat message")]
    ChatMessage { text: String },

    #[serde(rename = "direct message")]
    DirectMessage { to: String, text: String },

    #[serde(rename = "edit message")]
    EditMessage {
        id: i64,
        #[serde(rename = "newText")]
        new_text: String,
    },

    #[serde(rename = "edit dm")]
    EditDm {
        to: String,
        id: i64,
        #[serde(rename = "newText")]
        new_text: String,
    },

    #[serde(rename = "delete message")]
    DeleteMessage(i64),

    #[serde(rename = "delete dm")]
    DeleteDm { to: String, id: i64 },

    #[serde(rename = "add reaction")]
    AddReaction {
        #[serde(rename = "msgId")]
        msg_id: i64,
        emoji: String,
    },

    #[serde(rename = "remove reaction")]
    RemoveReaction {
        #[serde(rename = "msgId")]
        msg_id: i64,
        emoji: String,
    },

    /// Legacy single-id form; resolves the message kind server-side.
    #[serde(rename = "message seen")]
    MessageSeen(i64),

    #[serde(rename = "seen")]
    Seen {
        #[serde(rename = "msgId")]
        msg_id: i64,
        #[serde(rename = "type")]
        kind: MessageKind,
    },

    #[serde(rename = "delivered")]
    Delivered {
        #[serde(rename = "msgId")]
        msg_id: i64,
        #[serde(rename = "type")]
        kind: MessageKind,
    },

    #[serde(rename = "typing")]
    Typing,

    #[serde(rename = "stop typing")]
    StopTyping,

    #[serde(rename = "send friend request")]
    SendFriendRequest(String),

    #[serde(rename = "accept friend request")]
    AcceptFriendRequest(String),

    #[serde(rename = "decline friend request")]
    DeclineFriendRequest(String),

    #[serde(rename = "get sidebar")]
    GetSidebar,

    #[serde(rename = "get group messages")]
    GetGroupMessages,

    #[serde(rename = "get direct messages")]
    GetDirectMessages(String),
}

/// Events sent FROM the server TO clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "sign in success")]
    SignInSuccess(String),

    #[serde(rename = "sign in error")]
    SignInError(String),

    #[serde(rename = "sign up success")]
    SignUpSuccess(String),

    #[serde(rename = "sign up error")]
    SignUpError(String),

    /// Fresh session token for the client to store client-side.
    #[serde(rename = "set-cookie")]
    SetCookie(String),

    /// Most recent group history, ascending by id (oldest first).
    #[serde(rename = "previous messages")]
    PreviousMessages(Vec<MessageView>),

    #[serde(rename = "chat message")]
    ChatMessage(MessageView),

    #[serde(rename = "direct message")]
    DirectMessage(MessageView),

    #[serde(rename = "direct messages")]
    DirectMessages {
        friend: String,
        msgs: Vec<MessageView>,
    },

    #[serde(rename = "message deleted")]
    MessageDeleted(i64),

    #[serde(rename = "message edited")]
    MessageEdited(MessageView),

    #[serde(rename = "reaction updated")]
    ReactionUpdated {
        #[serde(rename = "msgId")]
        msg_id: i64,
        reactions: ReactionMap,
    },

    #[serde(rename = "delivered update")]
    DeliveredUpdate {
        #[serde(rename = "msgId")]
        msg_id: i64,
        username: String,
        #[serde(rename = "type")]
        kind: MessageKind,
    },

    #[serde(rename = "seen update")]
    SeenUpdate {
        #[serde(rename = "msgId")]
        msg_id: i64,
        username: String,
        #[serde(rename = "type")]
        kind: MessageKind,
    },

    /// Full current online set, re-broadcast on every membership change.
    #[serde(rename = "online users")]
    OnlineUsers(Vec<String>),

    #[serde(rename = "sidebar data")]
    SidebarData(Sidebar),

    #[serde(rename = "sidebar update")]
    SidebarUpdate(String),

    #[serde(rename = "typing")]
    Typing(String),

    #[serde(rename = "stop typing")]
    StopTyping(String),

    /// Rate-limit / anti-spam verdict, sent only to the offending sender.
    #[serde(rename = "spam warning")]
    SpamWarning(String),

    #[serde(rename = "error")]
    Error(String),
}

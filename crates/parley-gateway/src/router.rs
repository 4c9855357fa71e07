use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_auth::{AuthError, TokenSigner, hash_password, verify_password};
use parley_db::Database;
use parley_types::api::PushPayload;
use parley_types::events::{ClientEvent, ServerEvent};
use parley_types::models::{MessageKind, MessageView};

use crate::dispatcher::Dispatcher;
use crate::push::PushNotifier;
use crate::sanitize::sanitize;
use crate::spam::{MAX_MESSAGE_CHARS, SpamGuard};

/// How many history entries "previous messages" and DM fetches return.
const HISTORY_LIMIT: u32 = 100;

/// An authenticated connection: the session username plus the specific
/// socket it arrived on (for sender-only replies).
#[derive(Debug, Clone)]
pub struct Actor {
    pub username: String,
    pub conn_id: Uuid,
}

/// Outcome of an in-band authentication attempt.
pub enum AuthAttempt {
    /// Authenticated; `replies` go to this connection before it joins its
    /// room (success acks, session token, initial history).
    Success {
        username: String,
        replies: Vec<ServerEvent>,
    },
    /// Rejected; the reply goes to this connection only.
    Failure(ServerEvent),
    /// Not an authentication event at all.
    NotAuth,
}

/// The single authority for turning an inbound event into persisted state
/// plus a fan-out plan. Every handler follows the same shape: validate the
/// payload, apply the domain rule, persist, compute the audience, emit.
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    spam: SpamGuard,
    signer: TokenSigner,
    push: Option<PushNotifier>,
}

impl EventRouter {
    pub fn new(
        db: Arc<Database>,
        dispatcher: Dispatcher,
        signer: TokenSigner,
        push: Option<PushNotifier>,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                db,
                dispatcher,
                spam: SpamGuard::new(),
                signer,
                push,
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    // -- Authentication --

    /// Handle a `sign up` / `sign in` / `token login` event. Connections
    /// call this until it succeeds; nothing else is honored before then.
    pub async fn authenticate(&self, event: &ClientEvent) -> AuthAttempt {
        match event {
            ClientEvent::SignUp { username, password } => {
                self.sign_up(username, password).await
            }
            ClientEvent::SignIn { username, password } => {
                self.sign_in(username, password).await
            }
            ClientEvent::TokenLogin(token) => self.token_login(token).await,
            _ => AuthAttempt::NotAuth,
        }
    }

    async fn sign_up(&self, username: &str, password: &str) -> AuthAttempt {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return AuthAttempt::Failure(ServerEvent::SignUpError(
                "Missing username or password".into(),
            ));
        }

        let hashed = match hash_password(password) {
            Ok(h) => h,
            Err(_) => {
                return AuthAttempt::Failure(ServerEvent::SignUpError(
                    "Server error during sign-up".into(),
                ));
            }
        };

        match self.inner.db.create_user(username, &hashed) {
            Ok(true) => {}
            Ok(false) => {
                return AuthAttempt::Failure(ServerEvent::SignUpError(
                    "Username already taken".into(),
                ));
            }
            Err(e) => {
                error!("Sign-up failed for {}: {}", username, e);
                return AuthAttempt::Failure(ServerEvent::SignUpError(
                    "Server error during sign-up".into(),
                ));
            }
        }

        match self.inner.signer.sign(username) {
            Ok(token) => {
                info!("{} signed up", username);
                AuthAttempt::Success {
                    username: username.to_string(),
                    replies: vec![
                        ServerEvent::SignUpSuccess(username.to_string()),
                        ServerEvent::SetCookie(token),
                    ],
                }
            }
            Err(_) => AuthAttempt::Failure(ServerEvent::SignUpError(
                "Server error during sign-up".into(),
            )),
        }
    }

    async fn sign_in(&self, username: &str, password: &str) -> AuthAttempt {
        let user = match self.inner.db.get_user_by_username(username) {
            Ok(Some(user)) => user,
            Ok(None) => {
                return AuthAttempt::Failure(ServerEvent::SignInError(
                    "Invalid username or password.".into(),
                ));
            }
            Err(e) => {
                error!("Sign-in lookup failed for {}: {}", username, e);
                return AuthAttempt::Failure(ServerEvent::SignInError(
                    "Server error during sign-in".into(),
                ));
            }
        };

        if verify_password(password, &user.password).is_err() {
            return AuthAttempt::Failure(ServerEvent::SignInError(
                "Invalid username or password.".into(),
            ));
        }

        let token = match self.inner.signer.sign(&user.username) {
            Ok(token) => token,
            Err(_) => {
                return AuthAttempt::Failure(ServerEvent::SignInError(
                    "Server error during sign-in".into(),
                ));
            }
        };

        let history = self.group_history().await.unwrap_or_else(|e| {
            warn!("Could not load history for {}: {}", user.username, e);
            vec![]
        });

        info!("{} signed in", user.username);
        AuthAttempt::Success {
            username: user.username.clone(),
            replies: vec![
                ServerEvent::SignInSuccess(user.username),
                ServerEvent::SetCookie(token),
                ServerEvent::PreviousMessages(history),
            ],
        }
    }

    async fn token_login(&self, token: &str) -> AuthAttempt {
        let username = match self.inner.signer.verify(token) {
            Ok(username) => username,
            Err(AuthError::TokenExpired) | Err(AuthError::TokenInvalid) | Err(_) => {
                return AuthAttempt::Failure(ServerEvent::SignInError(
                    "Token expired or invalid".into(),
                ));
            }
        };

        // The token may outlive the account.
        match self.inner.db.user_exists(&username) {
            Ok(true) => {}
            Ok(false) => {
                return AuthAttempt::Failure(ServerEvent::SignInError("Invalid token".into()));
            }
            Err(e) => {
                error!("Token login lookup failed for {}: {}", username, e);
                return AuthAttempt::Failure(ServerEvent::SignInError(
                    "Server error during sign-in".into(),
                ));
            }
        }

        let history = self.group_history().await.unwrap_or_else(|e| {
            warn!("Could not load history for {}: {}", username, e);
            vec![]
        });

        info!("{} signed in via token", username);
        AuthAttempt::Success {
            username: username.clone(),
            replies: vec![
                ServerEvent::SignInSuccess(username),
                ServerEvent::PreviousMessages(history),
            ],
        }
    }

    // -- Event dispatch --

    /// Route one post-authentication event. Failures are handled here and
    /// surfaced to the acting connection only; nothing propagates far
    /// enough to take down the connection or another session.
    pub async fn handle(&self, actor: &Actor, event: ClientEvent) {
        let result = match event {
            // Handled during connection setup; a second attempt on a live
            // session is ignored.
            ClientEvent::SignUp { .. }
            | ClientEvent::SignIn { .. }
            | ClientEvent::TokenLogin(_) => Ok(()),

            ClientEvent::ChatMessage { text } => self.chat_message(actor, text).await,
            ClientEvent::DirectMessage { to, text } => {
                self.direct_message(actor, to, text).await
            }
            ClientEvent::EditMessage { id, new_text }
            | ClientEvent::EditDm { id, new_text, .. } => {
                self.edit_message(actor, id, new_text).await
            }
            ClientEvent::DeleteMessage(id) | ClientEvent::DeleteDm { id, .. } => {
                self.delete_message(actor, id).await
            }
            ClientEvent::AddReaction { msg_id, emoji } => {
                self.react(actor, msg_id, emoji, true).await
            }
            ClientEvent::RemoveReaction { msg_id, emoji } => {
                self.react(actor, msg_id, emoji, false).await
            }
            ClientEvent::MessageSeen(msg_id) => self.message_seen(actor, msg_id).await,
            ClientEvent::Seen { msg_id, .. } => self.mark_receipt(actor, msg_id, true).await,
            ClientEvent::Delivered { msg_id, .. } => {
                self.mark_receipt(actor, msg_id, false).await
            }
            ClientEvent::Typing => {
                self.inner.dispatcher.broadcast_except(
                    actor.conn_id,
                    ServerEvent::Typing(actor.username.clone()),
                );
                Ok(())
            }
            ClientEvent::StopTyping => {
                self.inner.dispatcher.broadcast_except(
                    actor.conn_id,
                    ServerEvent::StopTyping(actor.username.clone()),
                );
                Ok(())
            }
            ClientEvent::SendFriendRequest(to) => self.send_friend_request(actor, to).await,
            ClientEvent::AcceptFriendRequest(from) => {
                self.accept_friend_request(actor, from).await
            }
            ClientEvent::DeclineFriendRequest(from) => {
                self.decline_friend_request(actor, from).await
            }
            ClientEvent::GetSidebar => self.get_sidebar(actor).await,
            ClientEvent::GetGroupMessages => self.get_group_messages(actor).await,
            ClientEvent::GetDirectMessages(friend) => {
                self.get_direct_messages(actor, friend).await
            }
        };

        if let Err(e) = result {
            error!("{}: event handling failed: {}", actor.username, e);
            self.reply(actor, ServerEvent::Error("Internal server error".into()))
                .await;
        }
    }

    // -- Message events --

    async fn chat_message(&self, actor: &Actor, text: String) -> anyhow::Result<()> {
        let verdict = self.inner.spam.check(&actor.username, &text);
        if let Some(warning) = verdict.warning() {
            debug!("{}: message rejected ({:?})", actor.username, verdict);
            self.reply(actor, ServerEvent::SpamWarning(warning.into()))
                .await;
            return Ok(());
        }

        if text.trim().is_empty() {
            self.reply(actor, ServerEvent::Error("Message text must not be empty".into()))
                .await;
            return Ok(());
        }

        let sanitized = sanitize(&text);
        let view = self
            .persist_message(MessageKind::Group, actor.username.clone(), None, sanitized)
            .await?;
        let msg_id = view.id;
        let body = view.text.clone();

        self.inner
            .dispatcher
            .broadcast(ServerEvent::ChatMessage(view));
        self.inner
            .dispatcher
            .broadcast(ServerEvent::DeliveredUpdate {
                msg_id,
                username: actor.username.clone(),
                kind: MessageKind::Group,
            });

        if let Some(push) = &self.inner.push {
            let push = push.clone();
            let db = self.inner.db.clone();
            let payload = PushPayload {
                title: format!("New message from {}", actor.username),
                body,
                icon: "/icon-192.png".into(),
                link: "/".into(),
            };
            // Best-effort, off the hot path.
            tokio::spawn(async move {
                push.notify_all(db, payload).await;
            });
        }

        Ok(())
    }

    async fn direct_message(&self, actor: &Actor, to: String, text: String) -> anyhow::Result<()> {
        if to.is_empty() || text.trim().is_empty() {
            debug!("{}: dropping dm with empty recipient or text", actor.username);
            return Ok(());
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            self.reply(
                actor,
                ServerEvent::Error("Message too long! Max 300 characters.".into()),
            )
            .await;
            return Ok(());
        }

        let sanitized = sanitize(&text);
        let view = self
            .persist_message(
                MessageKind::Dm,
                actor.username.clone(),
                Some(to.clone()),
                sanitized,
            )
            .await?;
        let msg_id = view.id;

        self.fan_out(
            MessageKind::Dm,
            &actor.username,
            Some(&to),
            ServerEvent::DirectMessage(view),
        )
        .await;
        self.fan_out(
            MessageKind::Dm,
            &actor.username,
            Some(&to),
            ServerEvent::DeliveredUpdate {
                msg_id,
                username: actor.username.clone(),
                kind: MessageKind::Dm,
            },
        )
        .await;

        Ok(())
    }

    // TODO: restrict edit/delete to the original author; today any
    // authenticated user can edit or delete any message by id.
    async fn edit_message(&self, actor: &Actor, id: i64, new_text: String) -> anyhow::Result<()> {
        if new_text.trim().is_empty() {
            debug!("{}: dropping empty edit for message {}", actor.username, id);
            return Ok(());
        }
        if new_text.chars().count() > MAX_MESSAGE_CHARS {
            self.reply(
                actor,
                ServerEvent::Error("Message too long! Max 300 characters.".into()),
            )
            .await;
            return Ok(());
        }

        let Some((kind, sender, recipient)) = self.inner.db.message_header(id)? else {
            debug!("Edit for missing message {} ignored", id);
            return Ok(());
        };

        let sanitized = sanitize(&new_text);
        if !self.inner.db.update_message_text(id, &sanitized)? {
            return Ok(());
        }

        let Some(view) = self.inner.db.message_view(id)? else {
            return Ok(());
        };

        self.fan_out(
            kind,
            &sender,
            recipient.as_deref(),
            ServerEvent::MessageEdited(view),
        )
        .await;
        Ok(())
    }

    async fn delete_message(&self, actor: &Actor, id: i64) -> anyhow::Result<()> {
        let Some((kind, sender, recipient)) = self.inner.db.message_header(id)? else {
            debug!("Delete for missing message {} ignored", id);
            return Ok(());
        };

        if !self.inner.db.delete_message(id)? {
            return Ok(());
        }

        info!("{} deleted message {}", actor.username, id);
        self.fan_out(
            kind,
            &sender,
            recipient.as_deref(),
            ServerEvent::MessageDeleted(id),
        )
        .await;
        Ok(())
    }

    async fn react(
        &self,
        actor: &Actor,
        msg_id: i64,
        emoji: String,
        add: bool,
    ) -> anyhow::Result<()> {
        let Some((kind, sender, recipient)) = self.inner.db.message_header(msg_id)? else {
            debug!("Reaction for missing message {} ignored", msg_id);
            return Ok(());
        };

        let updated = if add {
            self.inner.db.add_reaction(msg_id, &actor.username, &emoji)?
        } else {
            self.inner
                .db
                .remove_reaction(msg_id, &actor.username, &emoji)?
        };

        let Some(reactions) = updated else {
            return Ok(());
        };

        self.fan_out(
            kind,
            &sender,
            recipient.as_deref(),
            ServerEvent::ReactionUpdated { msg_id, reactions },
        )
        .await;
        Ok(())
    }

    /// Legacy `message seen` event: single id, kind resolved server-side,
    /// update broadcast only when the set actually grew.
    async fn message_seen(&self, actor: &Actor, msg_id: i64) -> anyhow::Result<()> {
        let Some((kind, sender, recipient)) = self.inner.db.message_header(msg_id)? else {
            debug!("Seen for missing message {} ignored", msg_id);
            return Ok(());
        };

        if self.inner.db.add_seen(msg_id, &actor.username)? == Some(true) {
            self.fan_out(
                kind,
                &sender,
                recipient.as_deref(),
                ServerEvent::SeenUpdate {
                    msg_id,
                    username: actor.username.clone(),
                    kind,
                },
            )
            .await;
        }
        Ok(())
    }

    /// `seen` / `delivered` receipts. Set-union semantics: re-acknowledging
    /// is harmless and still re-broadcasts the update; a missing id is a
    /// silent no-op.
    async fn mark_receipt(&self, actor: &Actor, msg_id: i64, seen: bool) -> anyhow::Result<()> {
        let Some((kind, sender, recipient)) = self.inner.db.message_header(msg_id)? else {
            debug!("Receipt for missing message {} ignored", msg_id);
            return Ok(());
        };

        let applied = if seen {
            self.inner.db.add_seen(msg_id, &actor.username)?
        } else {
            self.inner.db.add_delivered(msg_id, &actor.username)?
        };
        if applied.is_none() {
            return Ok(());
        }

        let event = if seen {
            ServerEvent::SeenUpdate {
                msg_id,
                username: actor.username.clone(),
                kind,
            }
        } else {
            ServerEvent::DeliveredUpdate {
                msg_id,
                username: actor.username.clone(),
                kind,
            }
        };

        self.fan_out(kind, &sender, recipient.as_deref(), event).await;
        Ok(())
    }

    // -- Social graph --

    async fn send_friend_request(&self, actor: &Actor, to: String) -> anyhow::Result<()> {
        if to.is_empty() || to == actor.username {
            return Ok(());
        }

        if !self.inner.db.user_exists(&to)? {
            self.reply(actor, ServerEvent::Error("User not found".into()))
                .await;
            return Ok(());
        }

        if self.inner.db.add_friend_request(&to, &actor.username)? {
            info!("{} sent a friend request to {}", actor.username, to);
            self.inner
                .dispatcher
                .send_to_user(&to, ServerEvent::SidebarUpdate(to.clone()))
                .await;
        }
        Ok(())
    }

    async fn accept_friend_request(&self, actor: &Actor, from: String) -> anyhow::Result<()> {
        if self
            .inner
            .db
            .accept_friend_request(&actor.username, &from)?
        {
            info!("{} accepted a friend request from {}", actor.username, from);
            self.inner
                .dispatcher
                .send_to_user(
                    &actor.username,
                    ServerEvent::SidebarUpdate(actor.username.clone()),
                )
                .await;
            self.inner
                .dispatcher
                .send_to_user(&from, ServerEvent::SidebarUpdate(from.clone()))
                .await;
        }
        Ok(())
    }

    async fn decline_friend_request(&self, actor: &Actor, from: String) -> anyhow::Result<()> {
        if self
            .inner
            .db
            .decline_friend_request(&actor.username, &from)?
        {
            self.inner
                .dispatcher
                .send_to_user(
                    &actor.username,
                    ServerEvent::SidebarUpdate(actor.username.clone()),
                )
                .await;
        }
        Ok(())
    }

    async fn get_sidebar(&self, actor: &Actor) -> anyhow::Result<()> {
        if let Some(sidebar) = self.inner.db.sidebar(&actor.username)? {
            self.reply(actor, ServerEvent::SidebarData(sidebar)).await;
        }
        Ok(())
    }

    // -- History --

    async fn get_group_messages(&self, actor: &Actor) -> anyhow::Result<()> {
        let history = self.group_history().await?;
        self.reply(actor, ServerEvent::PreviousMessages(history))
            .await;
        Ok(())
    }

    async fn get_direct_messages(&self, actor: &Actor, friend: String) -> anyhow::Result<()> {
        let db = self.inner.db.clone();
        let me = actor.username.clone();
        let other = friend.clone();
        let msgs =
            tokio::task::spawn_blocking(move || db.direct_message_history(&me, &other, HISTORY_LIMIT))
                .await??;

        self.reply(actor, ServerEvent::DirectMessages { friend, msgs })
            .await;
        Ok(())
    }

    async fn group_history(&self) -> anyhow::Result<Vec<MessageView>> {
        let db = self.inner.db.clone();
        // Run blocking DB reads off the async runtime
        Ok(tokio::task::spawn_blocking(move || db.recent_group_messages(HISTORY_LIMIT)).await??)
    }

    // -- Plumbing --

    async fn persist_message(
        &self,
        kind: MessageKind,
        sender: String,
        recipient: Option<String>,
        text: String,
    ) -> anyhow::Result<MessageView> {
        let db = self.inner.db.clone();
        tokio::task::spawn_blocking(move || {
            let id = db.insert_message(kind, &sender, recipient.as_deref(), &text)?;
            db.message_view(id)?
                .ok_or_else(|| anyhow::anyhow!("message {} vanished after insert", id))
        })
        .await?
    }

    /// Compute the audience for a message-scoped event and emit: group
    /// messages broadcast to everyone, DMs reach only the two rooms.
    async fn fan_out(
        &self,
        kind: MessageKind,
        sender: &str,
        recipient: Option<&str>,
        event: ServerEvent,
    ) {
        match kind {
            MessageKind::Group => self.inner.dispatcher.broadcast(event),
            MessageKind::Dm => {
                self.inner
                    .dispatcher
                    .send_to_user(sender, event.clone())
                    .await;
                if let Some(to) = recipient {
                    if to != sender {
                        self.inner.dispatcher.send_to_user(to, event).await;
                    }
                }
            }
        }
    }

    /// Sender-only response on the connection the event arrived on.
    async fn reply(&self, actor: &Actor, event: ServerEvent) {
        self.inner
            .dispatcher
            .send_to_conn(&actor.username, actor.conn_id, event)
            .await;
    }
}

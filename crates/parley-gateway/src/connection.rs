use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use parley_types::events::{ClientEvent, ServerEvent};

use crate::router::{Actor, AuthAttempt, EventRouter};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long an unauthenticated socket may sit before it is closed.
const AUTH_TIMEOUT: Duration = Duration::from_secs(60);

/// Drive one WebSocket connection for its whole lifetime.
///
/// Phase 1 is in-band authentication: the only events honored are
/// `sign up`, `sign in` and `token login`, and everything the client
/// receives goes only to this socket. Phase 2 registers the connection
/// with the dispatcher and runs the split send/recv loop until either
/// side ends.
pub async fn handle_connection(socket: WebSocket, router: EventRouter) {
    let (mut sender, mut receiver) = socket.split();

    let (username, replies) = match wait_for_auth(&mut sender, &mut receiver, &router).await {
        Some(outcome) => outcome,
        None => return,
    };

    info!("{} connected to gateway", username);

    // Subscribe before joining so this socket sees its own join broadcast.
    let mut broadcast_rx = router.dispatcher().subscribe();
    let (conn_id, mut user_rx) = router.dispatcher().join(&username).await;

    for event in replies {
        if send_event(&mut sender, &event).await.is_err() {
            router.dispatcher().leave(&username, conn_id).await;
            return;
        }
    }

    // A second device does not change the online set, so the join above may
    // not have broadcast anything. Always hand this client the current set.
    let online = ServerEvent::OnlineUsers(router.dispatcher().online_users().await);
    if send_event(&mut sender, &online).await.is_err() {
        router.dispatcher().leave(&username, conn_id).await;
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if msg.exclude == Some(conn_id) {
                        continue;
                    }

                    if send_event(&mut sender, &msg.event).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };

                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let actor = Actor {
        username: username.clone(),
        conn_id,
    };
    let router_recv = router.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        router_recv.handle(&actor, event).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} bad event: {} -- raw: {}",
                            actor.username,
                            e,
                            clip_for_log(&text)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    router.dispatcher().leave(&username, conn_id).await;
    info!("{} disconnected from gateway", username);
}

/// Run the authentication phase. Returns the session username plus the
/// queued success replies (acks, token, initial history) to send once the
/// connection has joined its room, or `None` when the socket closed or the
/// auth window expired without a successful attempt.
async fn wait_for_auth(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
    router: &EventRouter,
) -> Option<(String, Vec<ServerEvent>)> {
    let auth = tokio::time::timeout(AUTH_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => return None,
                _ => continue,
            };

            let event = match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        "Unauthenticated client sent bad event: {} -- raw: {}",
                        e,
                        clip_for_log(&text)
                    );
                    continue;
                }
            };

            match router.authenticate(&event).await {
                AuthAttempt::Success { username, replies } => {
                    return Some((username, replies));
                }
                AuthAttempt::Failure(reply) => {
                    if send_event(sender, &reply).await.is_err() {
                        return None;
                    }
                }
                AuthAttempt::NotAuth => {
                    debug!("Dropping pre-auth event: {:?}", event);
                }
            }
        }
        None
    });

    match auth.await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("WebSocket client failed to authenticate in time, closing");
            None
        }
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).unwrap_or_default();
    sender.send(Message::Text(text.into())).await
}

/// Clip a raw frame to 200 characters for logging. Cutting on a char
/// boundary, never a byte offset, so multibyte input cannot panic the
/// connection task.
fn clip_for_log(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_handles_multibyte_at_the_cutoff() {
        // 199 ASCII chars then an emoji: byte 200 falls inside the emoji
        let frame = format!("{}👍 and more", "a".repeat(199));
        let clipped = clip_for_log(&frame);
        assert_eq!(clipped.chars().count(), 200);
        assert!(clipped.ends_with('👍'));
    }

    #[test]
    fn clip_leaves_short_frames_alone() {
        assert_eq!(clip_for_log("hello"), "hello");
        assert_eq!(clip_for_log(""), "");
    }

    #[test]
    fn clip_caps_long_ascii_frames() {
        let frame = "x".repeat(500);
        assert_eq!(clip_for_log(&frame).len(), 200);
    }
}

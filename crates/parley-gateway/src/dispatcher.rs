use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use parley_types::events::ServerEvent;

/// A broadcast-channel payload: the event plus an optional connection to
/// skip (typing indicators go to everyone except the typist's own socket).
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub event: ServerEvent,
    pub exclude: Option<Uuid>,
}

/// Tracks live connections per username and fans events out to them.
///
/// A username's "room" is the set of its live connection handles, so a
/// targeted send reaches all of that user's devices. Purely in-memory,
/// scoped to the process lifetime; online status does not survive a
/// restart and is not reconciled against history.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Global fan-out — every connected client receives every broadcast.
    broadcast_tx: broadcast::Sender<Broadcast>,

    /// username -> conn_id -> targeted sender. A user is online while it
    /// has at least one handle.
    rooms: RwLock<HashMap<String, HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to global broadcasts. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.inner.broadcast_tx.send(Broadcast {
            event,
            exclude: None,
        });
    }

    /// Broadcast to everyone except one connection.
    pub fn broadcast_except(&self, conn_id: Uuid, event: ServerEvent) {
        let _ = self.inner.broadcast_tx.send(Broadcast {
            event,
            exclude: Some(conn_id),
        });
    }

    /// Register a connection handle for `username` and subscribe it to the
    /// user's room. Re-broadcasts the online set when the user transitions
    /// to online. Note the full-list broadcast is O(users) per membership
    /// change — fine at chat-app scale.
    pub async fn join(&self, username: &str) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let came_online = {
            let mut rooms = self.inner.rooms.write().await;
            let handles = rooms.entry(username.to_string()).or_default();
            let was_offline = handles.is_empty();
            handles.insert(conn_id, tx);
            was_offline
        };

        if came_online {
            self.broadcast_online_users().await;
        }

        (conn_id, rx)
    }

    /// Drop a connection handle. When it was the user's last handle, the
    /// user goes offline and the online set is re-broadcast.
    pub async fn leave(&self, username: &str, conn_id: Uuid) {
        let went_offline = {
            let mut rooms = self.inner.rooms.write().await;
            match rooms.get_mut(username) {
                Some(handles) => {
                    handles.remove(&conn_id);
                    if handles.is_empty() {
                        rooms.remove(username);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if went_offline {
            self.broadcast_online_users().await;
        }
    }

    /// Send a targeted event to every live connection of one user.
    /// Delivery to an offline user is simply dropped — persisted state is
    /// picked up on their next history fetch.
    pub async fn send_to_user(&self, username: &str, event: ServerEvent) {
        let rooms = self.inner.rooms.read().await;
        if let Some(handles) = rooms.get(username) {
            for tx in handles.values() {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Send to exactly one connection of one user.
    pub async fn send_to_conn(&self, username: &str, conn_id: Uuid, event: ServerEvent) {
        let rooms = self.inner.rooms.read().await;
        if let Some(tx) = rooms.get(username).and_then(|h| h.get(&conn_id)) {
            let _ = tx.send(event);
        }
    }

    /// Current online usernames, sorted for stable output.
    pub async fn online_users(&self) -> Vec<String> {
        let rooms = self.inner.rooms.read().await;
        let mut users: Vec<String> = rooms.keys().cloned().collect();
        users.sort();
        users
    }

    async fn broadcast_online_users(&self) {
        let users = self.online_users().await;
        self.broadcast(ServerEvent::OnlineUsers(users));
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_and_leave_track_the_online_set() {
        let dispatcher = Dispatcher::new();
        let mut events = dispatcher.subscribe();

        let (conn, _rx) = dispatcher.join("ava").await;
        assert_eq!(dispatcher.online_users().await, vec!["ava"]);

        let msg = events.recv().await.unwrap();
        match msg.event {
            ServerEvent::OnlineUsers(users) => assert_eq!(users, vec!["ava"]),
            other => panic!("unexpected event: {:?}", other),
        }

        dispatcher.leave("ava", conn).await;
        assert!(dispatcher.online_users().await.is_empty());

        let msg = events.recv().await.unwrap();
        match msg.event {
            ServerEvent::OnlineUsers(users) => assert!(users.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn second_device_keeps_user_online() {
        let dispatcher = Dispatcher::new();
        let (conn_a, _rx_a) = dispatcher.join("ava").await;
        let mut events = dispatcher.subscribe();
        let (_conn_b, _rx_b) = dispatcher.join("ava").await;

        // membership did not change: no extra broadcast
        assert!(events.try_recv().is_err());

        dispatcher.leave("ava", conn_a).await;
        assert_eq!(dispatcher.online_users().await, vec!["ava"]);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn targeted_send_reaches_all_devices() {
        let dispatcher = Dispatcher::new();
        let (_conn_a, mut rx_a) = dispatcher.join("ava").await;
        let (_conn_b, mut rx_b) = dispatcher.join("ava").await;
        let (_conn_c, mut rx_c) = dispatcher.join("ben").await;

        dispatcher
            .send_to_user("ava", ServerEvent::SidebarUpdate("ava".into()))
            .await;

        assert!(matches!(
            rx_a.recv().await,
            Some(ServerEvent::SidebarUpdate(_))
        ));
        assert!(matches!(
            rx_b.recv().await,
            Some(ServerEvent::SidebarUpdate(_))
        ));
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_offline_user_is_dropped() {
        let dispatcher = Dispatcher::new();
        // no panic, no error
        dispatcher
            .send_to_user("ghost", ServerEvent::SidebarUpdate("ghost".into()))
            .await;
    }
}

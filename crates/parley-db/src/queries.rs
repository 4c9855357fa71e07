use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::warn;

use parley_types::models::{MessageKind, MessageView, ReactionMap, Sidebar};

use crate::Database;
use crate::models::{MessageRow, UserRow};

impl Database {
    // -- Users --

    /// Create a user. Returns `Ok(false)` when the username is already
    /// taken — uniqueness is serialized on the PRIMARY KEY, so two racing
    /// sign-ups cannot both succeed.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            match conn.execute(
                "INSERT INTO users (username, password) VALUES (?1, ?2)",
                (username, password_hash),
            ) {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, password, created_at FROM users WHERE username = ?1",
            )?;
            let row = stmt
                .query_row([username], |row| {
                    Ok(UserRow {
                        username: row.get(0)?,
                        password: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| user_exists(conn, username))
    }

    // -- Push tokens --

    /// Add a device token to a user's set. Returns `Ok(false)` when the
    /// user does not exist; re-registering an existing token is a no-op.
    pub fn add_push_token(&self, username: &str, token: &str) -> Result<bool> {
        self.with_conn(|conn| {
            if !user_exists(conn, username)? {
                return Ok(false);
            }
            conn.execute(
                "INSERT OR IGNORE INTO push_tokens (username, token) VALUES (?1, ?2)",
                (username, token),
            )?;
            Ok(true)
        })
    }

    pub fn all_push_tokens(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT token FROM push_tokens")?;
            let tokens = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(tokens)
        })
    }

    // -- Social graph --

    /// Record a pending friend request from `from` to `to`. No-op (returns
    /// false) when the target is missing, the request is already pending,
    /// or the two are already friends.
    pub fn add_friend_request(&self, to: &str, from: &str) -> Result<bool> {
        self.with_conn(|conn| {
            if !user_exists(conn, to)? {
                return Ok(false);
            }
            let already_friends: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM friends WHERE username = ?1 AND friend = ?2)",
                (to, from),
                |row| row.get(0),
            )?;
            if already_friends {
                return Ok(false);
            }
            let changed = conn.execute(
                "INSERT OR IGNORE INTO friend_requests (username, from_user) VALUES (?1, ?2)",
                (to, from),
            )?;
            Ok(changed > 0)
        })
    }

    /// Accept a pending request: remove the pending entry on both sides
    /// and make the friendship symmetric, all in one transaction. Returns
    /// false when no such request is pending.
    pub fn accept_friend_request(&self, to: &str, from: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let pending: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM friend_requests WHERE username = ?1 AND from_user = ?2)",
                (to, from),
                |row| row.get(0),
            )?;
            if !pending {
                return Ok(false);
            }

            tx.execute(
                "DELETE FROM friend_requests WHERE username = ?1 AND from_user = ?2",
                (to, from),
            )?;
            tx.execute(
                "DELETE FROM friend_requests WHERE username = ?1 AND from_user = ?2",
                (from, to),
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO friends (username, friend) VALUES (?1, ?2)",
                (to, from),
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO friends (username, friend) VALUES (?1, ?2)",
                (from, to),
            )?;

            tx.commit()?;
            Ok(true)
        })
    }

    /// Drop a pending request without befriending. Returns false when no
    /// such request is pending.
    pub fn decline_friend_request(&self, to: &str, from: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM friend_requests WHERE username = ?1 AND from_user = ?2",
                (to, from),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn sidebar(&self, username: &str) -> Result<Option<Sidebar>> {
        self.with_conn(|conn| {
            if !user_exists(conn, username)? {
                return Ok(None);
            }
            let mut stmt =
                conn.prepare("SELECT friend FROM friends WHERE username = ?1 ORDER BY friend")?;
            let friends = stmt
                .query_map([username], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            let mut stmt = conn.prepare(
                "SELECT from_user FROM friend_requests WHERE username = ?1 ORDER BY from_user",
            )?;
            let friend_requests = stmt
                .query_map([username], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(Some(Sidebar {
                friends,
                friend_requests,
            }))
        })
    }

    // -- Messages --

    /// Persist a new message with the sender already in `deliveredTo`.
    /// Returns the assigned sequence id.
    pub fn insert_message(
        &self,
        kind: MessageKind,
        sender: &str,
        recipient: Option<&str>,
        text: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (kind, sender, recipient, text) VALUES (?1, ?2, ?3, ?4)",
                (kind.as_str(), sender, recipient, text),
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT OR IGNORE INTO message_delivered (message_id, username) VALUES (?1, ?2)",
                (id, sender),
            )?;
            tx.commit()?;
            Ok(id)
        })
    }

    /// Kind, sender and recipient of a message — used to compute fan-out
    /// audiences without hydrating the full view.
    pub fn message_header(
        &self,
        id: i64,
    ) -> Result<Option<(MessageKind, String, Option<String>)>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT kind, sender, recipient FROM messages WHERE id = ?1")?;
            let row = stmt
                .query_row([id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })
                .optional()?;
            Ok(row.map(|(kind, sender, recipient)| (parse_kind(&kind), sender, recipient)))
        })
    }

    pub fn message_view(&self, id: i64) -> Result<Option<MessageView>> {
        self.with_conn(|conn| {
            let rows = query_message_rows(
                conn,
                "SELECT id, kind, sender, recipient, text, created_at, edited
                 FROM messages WHERE id = ?1",
                &[&id],
            )?;
            let mut views = hydrate(conn, rows)?;
            Ok(views.pop())
        })
    }

    /// Most recent `limit` group messages, ascending by id (oldest first).
    pub fn recent_group_messages(&self, limit: u32) -> Result<Vec<MessageView>> {
        self.with_conn(|conn| {
            let rows = query_message_rows(
                conn,
                "SELECT id, kind, sender, recipient, text, created_at, edited
                 FROM messages WHERE kind = 'group'
                 ORDER BY id DESC LIMIT ?1",
                &[&limit],
            )?;
            let mut views = hydrate(conn, rows)?;
            views.reverse();
            Ok(views)
        })
    }

    /// Most recent `limit` messages between two users, ascending by id.
    pub fn direct_message_history(
        &self,
        a: &str,
        b: &str,
        limit: u32,
    ) -> Result<Vec<MessageView>> {
        self.with_conn(|conn| {
            let rows = query_message_rows(
                conn,
                "SELECT id, kind, sender, recipient, text, created_at, edited
                 FROM messages
                 WHERE kind = 'dm'
                   AND ((sender = ?1 AND recipient = ?2) OR (sender = ?2 AND recipient = ?1))
                 ORDER BY id DESC LIMIT ?3",
                &[&a, &b, &limit],
            )?;
            let mut views = hydrate(conn, rows)?;
            views.reverse();
            Ok(views)
        })
    }

    /// Replace a message's text (already sanitized) and mark it edited.
    /// Returns false when the id does not exist.
    pub fn update_message_text(&self, id: i64, text: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET text = ?2, edited = 1 WHERE id = ?1",
                (id, text),
            )?;
            Ok(changed > 0)
        })
    }

    /// Hard delete; side tables cascade. Returns false when the id does
    /// not exist.
    pub fn delete_message(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    /// Add `username` to the message's deliveredTo set. `None` means the
    /// message does not exist (idempotent miss); `Some(changed)` reports
    /// whether the set actually grew.
    pub fn add_delivered(&self, id: i64, username: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| add_to_user_set(conn, "message_delivered", id, username))
    }

    /// Add `username` to the message's seenBy set. Same contract as
    /// [`Database::add_delivered`].
    pub fn add_seen(&self, id: i64, username: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| add_to_user_set(conn, "message_seen", id, username))
    }

    /// Apply a reaction and return the message's updated reaction map.
    /// `None` means the message does not exist.
    pub fn add_reaction(
        &self,
        id: i64,
        username: &str,
        emoji: &str,
    ) -> Result<Option<ReactionMap>> {
        self.with_conn(|conn| {
            if !message_exists(conn, id)? {
                return Ok(None);
            }
            conn.execute(
                "INSERT OR IGNORE INTO reactions (message_id, username, emoji) VALUES (?1, ?2, ?3)",
                (id, username, emoji),
            )?;
            Ok(Some(reactions_for(conn, id)?))
        })
    }

    /// Remove a reaction and return the updated map. Empty emoji keys
    /// disappear because the map is rebuilt from the remaining rows.
    pub fn remove_reaction(
        &self,
        id: i64,
        username: &str,
        emoji: &str,
    ) -> Result<Option<ReactionMap>> {
        self.with_conn(|conn| {
            if !message_exists(conn, id)? {
                return Ok(None);
            }
            conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND username = ?2 AND emoji = ?3",
                (id, username, emoji),
            )?;
            Ok(Some(reactions_for(conn, id)?))
        })
    }
}

fn user_exists(conn: &Connection, username: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
        [username],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn message_exists(conn: &Connection, id: i64) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn add_to_user_set(
    conn: &Connection,
    table: &str,
    id: i64,
    username: &str,
) -> Result<Option<bool>> {
    if !message_exists(conn, id)? {
        return Ok(None);
    }
    // table name comes from the two call sites above, never from input
    let changed = conn.execute(
        &format!("INSERT OR IGNORE INTO {table} (message_id, username) VALUES (?1, ?2)"),
        (id, username),
    )?;
    Ok(Some(changed > 0))
}

fn reactions_for(conn: &Connection, id: i64) -> Result<ReactionMap> {
    let mut stmt = conn.prepare(
        "SELECT emoji, username FROM reactions WHERE message_id = ?1 ORDER BY rowid",
    )?;
    let mut map = ReactionMap::new();
    let rows = stmt.query_map([id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (emoji, username) = row?;
        map.entry(emoji).or_default().push(username);
    }
    Ok(map)
}

fn query_message_rows(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                sender: row.get(2)?,
                recipient: row.get(3)?,
                text: row.get(4)?,
                created_at: row.get(5)?,
                edited: row.get::<_, i64>(6)? != 0,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Attach deliveredTo / seenBy / reactions to a batch of message rows with
/// three IN queries (no per-message round trips).
fn hydrate(conn: &Connection, rows: Vec<MessageRow>) -> Result<Vec<MessageView>> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let delivered = user_sets_for(conn, "message_delivered", &ids)?;
    let seen = user_sets_for(conn, "message_seen", &ids)?;
    let reactions = reaction_maps_for(conn, &ids)?;

    Ok(rows
        .into_iter()
        .map(|row| MessageView {
            id: row.id,
            kind: parse_kind(&row.kind),
            from: row.sender,
            to: row.recipient,
            text: row.text,
            created_at: parse_timestamp(&row.created_at, row.id),
            delivered_to: delivered.get(&row.id).cloned().unwrap_or_default(),
            seen_by: seen.get(&row.id).cloned().unwrap_or_default(),
            reactions: reactions.get(&row.id).cloned().unwrap_or_default(),
            edited: row.edited,
        })
        .collect())
}

fn user_sets_for(
    conn: &Connection,
    table: &str,
    ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>> {
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT message_id, username FROM {table} WHERE message_id IN ({}) ORDER BY rowid",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut out: HashMap<i64, Vec<String>> = HashMap::new();
    let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (id, username) = row?;
        out.entry(id).or_default().push(username);
    }
    Ok(out)
}

fn reaction_maps_for(conn: &Connection, ids: &[i64]) -> Result<HashMap<i64, ReactionMap>> {
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT message_id, emoji, username FROM reactions WHERE message_id IN ({}) ORDER BY rowid",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut out: HashMap<i64, ReactionMap> = HashMap::new();
    let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in rows {
        let (id, emoji, username) = row?;
        out.entry(id)
            .or_default()
            .entry(emoji)
            .or_default()
            .push(username);
    }
    Ok(out)
}

fn parse_kind(kind: &str) -> MessageKind {
    match kind {
        "dm" => MessageKind::Dm,
        _ => MessageKind::Group,
    }
}

fn parse_timestamp(raw: &str, id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without
            // timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on message {}: {}", raw, id, e);
            DateTime::default()
        })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            username    TEXT PRIMARY KEY,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Symmetric friendship: both (a, b) and (b, a) rows exist.
        CREATE TABLE IF NOT EXISTS friends (
            username    TEXT NOT NULL REFERENCES users(username),
            friend      TEXT NOT NULL REFERENCES users(username),
            UNIQUE(username, friend)
        );

        -- Pending inbound requests, keyed by the recipient.
        CREATE TABLE IF NOT EXISTS friend_requests (
            username    TEXT NOT NULL REFERENCES users(username),
            from_user   TEXT NOT NULL REFERENCES users(username),
            UNIQUE(username, from_user)
        );

        CREATE TABLE IF NOT EXISTS push_tokens (
            username    TEXT NOT NULL REFERENCES users(username),
            token       TEXT NOT NULL,
            UNIQUE(username, token)
        );

        -- Group and direct messages share one table so every message id
        -- lives in a single monotonic sequence; recipient is NULL for
        -- group messages. The rowid doubles as the ordering key.
        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            kind        TEXT NOT NULL CHECK (kind IN ('group', 'dm')),
            sender      TEXT NOT NULL,
            recipient   TEXT,
            text        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            edited      INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_kind
            ON messages(kind, id);
        CREATE INDEX IF NOT EXISTS idx_messages_dm_pair
            ON messages(sender, recipient) WHERE kind = 'dm';

        -- Set-valued message fields. UNIQUE + INSERT OR IGNORE gives the
        -- atomic add-to-set the delivery/seen/reaction paths rely on.
        CREATE TABLE IF NOT EXISTS message_delivered (
            message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            username    TEXT NOT NULL,
            UNIQUE(message_id, username)
        );

        CREATE TABLE IF NOT EXISTS message_seen (
            message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            username    TEXT NOT NULL,
            UNIQUE(message_id, username)
        );

        CREATE TABLE IF NOT EXISTS reactions (
            message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            username    TEXT NOT NULL,
            emoji       TEXT NOT NULL,
            UNIQUE(message_id, username, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

//! Database row types — these map directly to SQLite rows.
//! Distinct from the parley-types wire models to keep the DB layer
//! independent.

pub struct UserRow {
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub kind: String,
    pub sender: String,
    pub recipient: Option<String>,
    pub text: String,
    pub created_at: String,
    pub edited: bool,
}

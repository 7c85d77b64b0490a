//! Database row types — these map directly to SQLite rows.
//! Distinct from nova-types API models to keep the DB layer independent.

use nova_types::models::Role;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: String,
    pub filename: String,
    pub content: String,
    pub upload_date: String,
    pub user_id: String,
}

/// Which of a user's documents to fetch.
#[derive(Debug, Clone, Copy)]
pub enum DocumentScope<'a> {
    All,
    /// Documents count as associated with a chat when any message in that
    /// chat starts with `marker`. There is no explicit document/chat link.
    AssociatedWith { chat_id: &'a str, marker: &'a str },
}

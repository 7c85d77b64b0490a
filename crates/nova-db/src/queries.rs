use crate::Database;
use crate::models::{ChatRow, DocumentRow, DocumentScope, MessageRow, UserRow};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use nova_types::models::Role;
use rusqlite::{Connection, OptionalExtension, Row};

/// RFC 3339 with microseconds and a `Z` suffix, so that text order in SQLite
/// matches chronological order.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    // -- Users --

    /// Returns `false` when the username is already taken. No second row is
    /// ever written for an existing username.
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(username) DO NOTHING",
                (id, username, password_hash, now_timestamp()),
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
                [username],
                map_user,
            )
            .optional()
            .map_err(Into::into)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE id = ?1",
                [id],
                map_user,
            )
            .optional()
            .map_err(Into::into)
        })
    }

    // -- Chats --

    pub fn create_chat(&self, id: &str, user_id: &str, title: &str) -> Result<ChatRow> {
        self.with_conn_mut(|conn| {
            let created_at = now_timestamp();
            conn.execute(
                "INSERT INTO chats (id, title, created_at, user_id) VALUES (?1, ?2, ?3, ?4)",
                (id, title, &created_at, user_id),
            )?;
            Ok(ChatRow {
                id: id.to_string(),
                title: title.to_string(),
                created_at,
                user_id: user_id.to_string(),
            })
        })
    }

    pub fn get_chat(&self, user_id: &str, chat_id: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| query_chat(conn, user_id, chat_id))
    }

    /// Returns `false` when the chat does not exist or belongs to someone else.
    pub fn rename_chat(&self, user_id: &str, chat_id: &str, title: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE chats SET title = ?1 WHERE id = ?2 AND user_id = ?3",
                (title, chat_id, user_id),
            )?;
            Ok(updated == 1)
        })
    }

    /// Deletes one chat and its messages in a single transaction.
    pub fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM messages WHERE chat_id IN
                    (SELECT id FROM chats WHERE id = ?1 AND user_id = ?2)",
                (chat_id, user_id),
            )?;
            let deleted = tx.execute(
                "DELETE FROM chats WHERE id = ?1 AND user_id = ?2",
                (chat_id, user_id),
            )?;
            tx.commit()?;
            Ok(deleted == 1)
        })
    }

    /// Deletes every chat the user owns, with their messages, in a single
    /// transaction. Returns the number of chats removed.
    pub fn clear_history(&self, user_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM messages WHERE chat_id IN (SELECT id FROM chats WHERE user_id = ?1)",
                [user_id],
            )?;
            let deleted = tx.execute("DELETE FROM chats WHERE user_id = ?1", [user_id])?;
            tx.commit()?;
            Ok(deleted)
        })
    }

    /// Newest first.
    pub fn list_chats(&self, user_id: &str) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, created_at, user_id FROM chats
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_chat)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append-only. Returns `None` without writing when the chat is not
    /// owned by `user_id`.
    pub fn append_message(
        &self,
        user_id: &str,
        chat_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_chat(&tx, user_id, chat_id)?.is_none() {
                return Ok(None);
            }

            let row = insert_message(&tx, chat_id, role, content)?;
            tx.commit()?;
            Ok(Some(row))
        })
    }

    /// Conversational order: timestamp, then insertion sequence.
    pub fn list_messages(&self, user_id: &str, chat_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.chat_id, m.role, m.content, m.timestamp
                 FROM messages m
                 JOIN chats c ON c.id = m.chat_id
                 WHERE m.chat_id = ?1 AND c.user_id = ?2
                 ORDER BY m.timestamp ASC, m.id ASC",
            )?;
            let rows = stmt
                .query_map((chat_id, user_id), map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Documents --

    pub fn insert_document(
        &self,
        id: &str,
        user_id: &str,
        filename: &str,
        content: &str,
    ) -> Result<DocumentRow> {
        self.with_conn_mut(|conn| insert_document_row(conn, id, user_id, filename, content))
    }

    /// Stores a document and, when `attach` is `Some((chat_id, marker))`,
    /// appends `marker` to that chat as a system message. Both writes share
    /// one transaction; returns `None` without writing when the chat is not
    /// owned by `user_id`.
    pub fn insert_document_with_marker(
        &self,
        id: &str,
        user_id: &str,
        filename: &str,
        content: &str,
        attach: Option<(&str, &str)>,
    ) -> Result<Option<DocumentRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if let Some((chat_id, _)) = attach {
                if query_chat(&tx, user_id, chat_id)?.is_none() {
                    return Ok(None);
                }
            }

            let doc = insert_document_row(&tx, id, user_id, filename, content)?;
            if let Some((chat_id, marker)) = attach {
                insert_message(&tx, chat_id, Role::System, marker)?;
            }
            tx.commit()?;
            Ok(Some(doc))
        })
    }

    pub fn get_document(&self, user_id: &str, document_id: &str) -> Result<Option<DocumentRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, filename, content, upload_date, user_id FROM documents
                 WHERE id = ?1 AND user_id = ?2",
                (document_id, user_id),
                map_document,
            )
            .optional()
            .map_err(Into::into)
        })
    }

    /// Oldest upload first.
    pub fn list_documents(&self, user_id: &str, scope: DocumentScope<'_>) -> Result<Vec<DocumentRow>> {
        self.with_conn(|conn| match scope {
            DocumentScope::All => {
                let mut stmt = conn.prepare(
                    "SELECT id, filename, content, upload_date, user_id FROM documents
                     WHERE user_id = ?1
                     ORDER BY upload_date ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map([user_id], map_document)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            }
            DocumentScope::AssociatedWith { chat_id, marker } => {
                let mut stmt = conn.prepare(
                    "SELECT d.id, d.filename, d.content, d.upload_date, d.user_id FROM documents d
                     WHERE d.user_id = ?1
                       AND EXISTS (
                           SELECT 1 FROM messages m
                           JOIN chats c ON c.id = m.chat_id
                           WHERE m.chat_id = ?2
                             AND c.user_id = ?1
                             AND substr(m.content, 1, length(?3)) = ?3
                       )
                     ORDER BY d.upload_date ASC, d.rowid ASC",
                )?;
                let rows = stmt
                    .query_map((user_id, chat_id, marker), map_document)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        })
    }
}

fn insert_message(conn: &Connection, chat_id: &str, role: Role, content: &str) -> Result<MessageRow> {
    let timestamp = now_timestamp();
    conn.execute(
        "INSERT INTO messages (chat_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
        (chat_id, role.as_str(), content, &timestamp),
    )?;

    Ok(MessageRow {
        id: conn.last_insert_rowid(),
        chat_id: chat_id.to_string(),
        role,
        content: content.to_string(),
        timestamp,
    })
}

fn insert_document_row(
    conn: &Connection,
    id: &str,
    user_id: &str,
    filename: &str,
    content: &str,
) -> Result<DocumentRow> {
    let upload_date = now_timestamp();
    conn.execute(
        "INSERT INTO documents (id, filename, content, upload_date, user_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (id, filename, content, &upload_date, user_id),
    )?;

    Ok(DocumentRow {
        id: id.to_string(),
        filename: filename.to_string(),
        content: content.to_string(),
        upload_date,
        user_id: user_id.to_string(),
    })
}

fn query_chat(conn: &Connection, user_id: &str, chat_id: &str) -> Result<Option<ChatRow>> {
    conn.query_row(
        "SELECT id, title, created_at, user_id FROM chats WHERE id = ?1 AND user_id = ?2",
        (chat_id, user_id),
        map_chat,
    )
    .optional()
    .map_err(Into::into)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn map_chat(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: row.get(2)?,
        user_id: row.get(3)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let role: String = row.get(2)?;
    let role = role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        role,
        content: row.get(3)?,
        timestamp: row.get(4)?,
    })
}

fn map_document(row: &Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        filename: row.get(1)?,
        content: row.get(2)?,
        upload_date: row.get(3)?,
        user_id: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn db_with_users(names: &[&str]) -> (Database, Vec<String>) {
        let db = Database::open_in_memory().unwrap();
        let ids = names
            .iter()
            .map(|name| {
                let id = Uuid::new_v4().to_string();
                assert!(db.create_user(&id, name, "hash").unwrap());
                id
            })
            .collect();
        (db, ids)
    }

    fn new_chat(db: &Database, user_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_chat(&id, user_id, "New Chat").unwrap();
        id
    }

    #[test]
    fn duplicate_username_is_rejected_without_second_row() {
        let (db, _) = db_with_users(&["alice"]);

        let created = db.create_user(&Uuid::new_v4().to_string(), "alice", "other").unwrap();
        assert!(!created);

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM users WHERE username = 'alice'", [], |r| {
                    r.get(0)
                })?)
            })
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(db.get_user_by_username("alice").unwrap().unwrap().password_hash, "hash");
    }

    #[test]
    fn messages_come_back_in_append_order() {
        let (db, ids) = db_with_users(&["alice"]);
        let chat = new_chat(&db, &ids[0]);

        db.append_message(&ids[0], &chat, Role::User, "Hello").unwrap().unwrap();
        db.append_message(&ids[0], &chat, Role::Assistant, "Hi there").unwrap().unwrap();
        db.append_message(&ids[0], &chat, Role::User, "How are you?").unwrap().unwrap();

        let messages = db.list_messages(&ids[0], &chat).unwrap();
        let pairs: Vec<(Role, &str)> = messages.iter().map(|m| (m.role, m.content.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                (Role::User, "Hello"),
                (Role::Assistant, "Hi there"),
                (Role::User, "How are you?"),
            ]
        );
    }

    #[test]
    fn append_to_foreign_chat_writes_nothing() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let chat = new_chat(&db, &ids[0]);

        assert!(db.append_message(&ids[1], &chat, Role::User, "sneaky").unwrap().is_none());
        assert!(db.list_messages(&ids[0], &chat).unwrap().is_empty());
        assert!(db.list_messages(&ids[1], &chat).unwrap().is_empty());
    }

    #[test]
    fn rename_is_owner_scoped() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let chat = new_chat(&db, &ids[0]);

        assert!(!db.rename_chat(&ids[1], &chat, "hijacked").unwrap());
        assert!(db.rename_chat(&ids[0], &chat, "Trip planning").unwrap());

        assert_eq!(db.get_chat(&ids[0], &chat).unwrap().unwrap().title, "Trip planning");
        assert!(db.get_chat(&ids[1], &chat).unwrap().is_none());
        assert!(db.list_chats(&ids[1]).unwrap().is_empty());
    }

    #[test]
    fn list_chats_newest_first() {
        let (db, ids) = db_with_users(&["alice"]);
        let first = new_chat(&db, &ids[0]);
        let second = new_chat(&db, &ids[0]);

        let chats = db.list_chats(&ids[0]).unwrap();
        let order: Vec<&str> = chats.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec![second.as_str(), first.as_str()]);
    }

    #[test]
    fn clear_history_leaves_other_users_alone() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let alice_chat = new_chat(&db, &ids[0]);
        let bob_chat = new_chat(&db, &ids[1]);
        db.append_message(&ids[0], &alice_chat, Role::User, "a").unwrap();
        db.append_message(&ids[1], &bob_chat, Role::User, "b1").unwrap();
        db.append_message(&ids[1], &bob_chat, Role::Assistant, "b2").unwrap();

        assert_eq!(db.clear_history(&ids[0]).unwrap(), 1);

        assert!(db.list_chats(&ids[0]).unwrap().is_empty());
        assert_eq!(db.list_chats(&ids[1]).unwrap().len(), 1);
        assert_eq!(db.list_messages(&ids[1], &bob_chat).unwrap().len(), 2);

        let orphans: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
                    [&alice_chat],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn delete_chat_cascades_messages() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let chat = new_chat(&db, &ids[0]);
        db.append_message(&ids[0], &chat, Role::User, "x").unwrap();

        assert!(!db.delete_chat(&ids[1], &chat).unwrap());
        assert!(db.delete_chat(&ids[0], &chat).unwrap());
        assert!(db.get_chat(&ids[0], &chat).unwrap().is_none());

        let remaining: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn document_round_trip() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let doc_id = Uuid::new_v4().to_string();
        db.insert_document(&doc_id, &ids[0], "notes.pdf", "Quarterly numbers").unwrap();

        let doc = db.get_document(&ids[0], &doc_id).unwrap().unwrap();
        assert_eq!(doc.filename, "notes.pdf");
        assert_eq!(doc.content, "Quarterly numbers");
        assert!(db.get_document(&ids[1], &doc_id).unwrap().is_none());
    }

    #[test]
    fn documents_associate_only_with_marked_chats() {
        let (db, ids) = db_with_users(&["alice"]);
        let marked = new_chat(&db, &ids[0]);
        let plain = new_chat(&db, &ids[0]);
        db.insert_document(&Uuid::new_v4().to_string(), &ids[0], "a.pdf", "alpha").unwrap();
        db.append_message(&ids[0], &marked, Role::System, "[Uploaded document] a.pdf").unwrap();
        db.append_message(&ids[0], &plain, Role::User, "mentions [Uploaded document] mid-text").unwrap();

        let marker = "[Uploaded document]";
        let for_marked = db
            .list_documents(&ids[0], DocumentScope::AssociatedWith { chat_id: &marked, marker })
            .unwrap();
        let for_plain = db
            .list_documents(&ids[0], DocumentScope::AssociatedWith { chat_id: &plain, marker })
            .unwrap();

        assert_eq!(for_marked.len(), 1);
        assert!(for_plain.is_empty());
        assert_eq!(db.list_documents(&ids[0], DocumentScope::All).unwrap().len(), 1);
    }

    #[test]
    fn document_with_marker_is_all_or_nothing() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let chat = new_chat(&db, &ids[0]);
        let marker = "[Uploaded document] a.pdf";
        let store = |user: &str, chat_id: Option<&str>| {
            db.insert_document_with_marker(
                &Uuid::new_v4().to_string(),
                user,
                "a.pdf",
                "alpha",
                chat_id.map(|c| (c, marker)),
            )
            .unwrap()
        };

        assert!(store(&ids[1], Some(chat.as_str())).is_none());
        assert!(store(&ids[0], Some("no-such-chat")).is_none());
        let documents: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(documents, 0);
        assert!(db.list_messages(&ids[0], &chat).unwrap().is_empty());

        let stored = store(&ids[0], Some(chat.as_str())).unwrap();
        assert_eq!(stored.filename, "a.pdf");
        let messages = db.list_messages(&ids[0], &chat).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, marker);

        assert!(store(&ids[0], None).is_some());
        assert_eq!(db.list_documents(&ids[0], DocumentScope::All).unwrap().len(), 2);
        assert_eq!(db.list_messages(&ids[0], &chat).unwrap().len(), 1);
    }
}

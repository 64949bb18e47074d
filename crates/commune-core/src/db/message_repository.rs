//! Message document repository

use crate::error::Result;
use crate::models::{MessageDocument, NewMessage, Timestamp};
use libsql::{params, Connection};

/// Storage operations for message documents (async)
#[allow(async_fn_in_trait)]
pub trait MessageRepository {
    /// Store a new message under `id` and return the stored document
    async fn insert(&self, id: &str, message: NewMessage) -> Result<MessageDocument>;

    /// Messages of a conversation in write order
    async fn list_for_conversation(&self, conversation_id: &str) -> Result<Vec<MessageDocument>>;

    /// Total stored messages
    async fn count(&self) -> Result<usize>;
}

/// libSQL implementation of `MessageRepository`
pub struct LibSqlMessageRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMessageRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl MessageRepository for LibSqlMessageRepository<'_> {
    async fn insert(&self, id: &str, message: NewMessage) -> Result<MessageDocument> {
        let created_at = message.created_at.as_millis();
        let document = message.into_document(id, Timestamp::now());
        let body = serde_json::to_string(&document)?;

        self.conn
            .execute(
                "INSERT INTO messages (id, conversation_id, created_at, body) VALUES (?, ?, ?, ?)",
                params![
                    document.id.clone(),
                    document.conversation_id.clone(),
                    created_at,
                    body
                ],
            )
            .await?;

        Ok(document)
    }

    async fn list_for_conversation(&self, conversation_id: &str) -> Result<Vec<MessageDocument>> {
        let mut rows = self
            .conn
            .query(
                "SELECT body FROM messages WHERE conversation_id = ? ORDER BY rowid ASC",
                [conversation_id],
            )
            .await?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            let body: String = row.get(0)?;
            documents.push(serde_json::from_str(&body)?);
        }
        Ok(documents)
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM messages", ()).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

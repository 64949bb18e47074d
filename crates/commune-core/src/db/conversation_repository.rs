//! Conversation and profile document repository

use crate::error::Result;
use crate::models::{Conversation, ConversationDocument, UserProfile};
use libsql::{params, Connection};

/// Storage operations for conversation and profile documents (async)
#[allow(async_fn_in_trait)]
pub trait ConversationRepository {
    /// Create or overwrite a conversation; returns the previous participants
    async fn upsert(&self, conversation: &Conversation) -> Result<Vec<String>>;

    async fn get(&self, id: &str) -> Result<Option<ConversationDocument>>;

    /// Conversations whose participant list contains `user_id`
    async fn list_for_participant(&self, user_id: &str) -> Result<Vec<ConversationDocument>>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<()>;
}

/// libSQL implementation of `ConversationRepository`
pub struct LibSqlConversationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlConversationRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ConversationRepository for LibSqlConversationRepository<'_> {
    async fn upsert(&self, conversation: &Conversation) -> Result<Vec<String>> {
        let previous = self
            .get(&conversation.id)
            .await?
            .map(|doc| doc.participants)
            .unwrap_or_default();

        let body = serde_json::to_string(&ConversationDocument::from(conversation))?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO conversations (id, updated_at, body) VALUES (?, ?, ?)",
                params![
                    conversation.id.clone(),
                    conversation.updated_at.as_millis(),
                    body
                ],
            )
            .await?;

        Ok(previous)
    }

    async fn get(&self, id: &str) -> Result<Option<ConversationDocument>> {
        let mut rows = self
            .conn
            .query("SELECT body FROM conversations WHERE id = ?", [id])
            .await?;

        match rows.next().await? {
            Some(row) => {
                let body: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn list_for_participant(&self, user_id: &str) -> Result<Vec<ConversationDocument>> {
        let mut rows = self
            .conn
            .query(
                "SELECT c.body FROM conversations c
                 WHERE EXISTS (
                     SELECT 1 FROM json_each(c.body, '$.participants') p
                     WHERE p.value = ?
                 )
                 ORDER BY c.updated_at DESC",
                [user_id],
            )
            .await?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            let body: String = row.get(0)?;
            documents.push(serde_json::from_str(&body)?);
        }
        Ok(documents)
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let mut rows = self
            .conn
            .query("SELECT body FROM profiles WHERE id = ?", [user_id])
            .await?;

        match rows.next().await? {
            Some(row) => {
                let body: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        let body = serde_json::to_string(profile)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO profiles (id, body) VALUES (?, ?)",
                params![profile.id.clone(), body],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_and_get() {
        let db = setup().await;
        let repo = LibSqlConversationRepository::new(db.connection());

        let conversation = Conversation::direct("alice", "bob").unwrap();
        let previous = repo.upsert(&conversation).await.unwrap();
        assert!(previous.is_empty());

        let fetched = repo.get(&conversation.id).await.unwrap().unwrap();
        assert_eq!(Conversation::from(fetched), conversation);

        let previous = repo.upsert(&conversation).await.unwrap();
        assert_eq!(previous, vec!["alice", "bob"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_for_participant_uses_containment() {
        let db = setup().await;
        let repo = LibSqlConversationRepository::new(db.connection());

        let direct = Conversation::direct("alice", "bob").unwrap();
        let group = Conversation::group("carol", "Book club", vec!["bob".to_string()]).unwrap();
        repo.upsert(&direct).await.unwrap();
        repo.upsert(&group).await.unwrap();

        assert_eq!(repo.list_for_participant("bob").await.unwrap().len(), 2);
        assert_eq!(repo.list_for_participant("alice").await.unwrap().len(), 1);
        assert!(repo.list_for_participant("dave").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_profiles() {
        let db = setup().await;
        let repo = LibSqlConversationRepository::new(db.connection());

        assert!(repo.get_profile("bob").await.unwrap().is_none());
        let profile = UserProfile::new("bob", "Bob").with_avatar("https://cdn.example.com/bob.png");
        repo.upsert_profile(&profile).await.unwrap();
        assert_eq!(repo.get_profile("bob").await.unwrap(), Some(profile));
    }
}

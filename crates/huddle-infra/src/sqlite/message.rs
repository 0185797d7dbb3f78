//! SQLite message repository implementation.
//!
//! Implements `MessageRepository` from `huddle-core`. All messages belong to
//! the single `default` conversation. Writes go through the writer pool in a
//! transaction; history reads use the reader pool.

use chrono::{DateTime, Utc};
use huddle_core::repository::message::MessageRepository;
use huddle_types::error::RepositoryError;
use huddle_types::identity::Identity;
use huddle_types::message::{MessageKind, StoredMessage};
use sqlx::{Row, Sqlite, Transaction};
use uuid::Uuid;

use super::pool::DatabasePool;

/// Id of the shared conversation every message is written to.
pub const DEFAULT_CONVERSATION: &str = "default";

/// SQLite-backed implementation of `MessageRepository`.
pub struct SqliteMessageRepository {
    pool: DatabasePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to domain StoredMessage.
struct MessageRow {
    sender_name: String,
    text: String,
    message_type: String,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            sender_name: row.try_get("sender_name")?,
            text: row.try_get("text")?,
            message_type: row.try_get("message_type")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<StoredMessage, RepositoryError> {
        let kind: MessageKind = self
            .message_type
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(StoredMessage {
            sender: self.sender_name,
            text: self.text,
            kind,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

/// Insert the user if unknown, bump `last_activity` otherwise, and return the
/// stable user id.
async fn upsert_user(
    tx: &mut Transaction<'_, Sqlite>,
    username: &str,
    now: &str,
) -> Result<String, RepositoryError> {
    let row = sqlx::query(
        r#"INSERT INTO users (user_id, username, created_at, last_activity)
           VALUES (?, ?, ?, ?)
           ON CONFLICT(username) DO UPDATE SET last_activity = excluded.last_activity
           RETURNING user_id"#,
    )
    .bind(Uuid::now_v7().to_string())
    .bind(username)
    .bind(now)
    .bind(now)
    .fetch_one(&mut **tx)
    .await
    .map_err(query_err)?;

    row.try_get("user_id").map_err(query_err)
}

impl MessageRepository for SqliteMessageRepository {
    async fn save(
        &self,
        kind: MessageKind,
        sender: &Identity,
        text: &str,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let sender_id = upsert_user(&mut tx, sender.as_str(), &now).await?;

        sqlx::query(
            r#"INSERT INTO messages (conversation_id, sender_id, sender_name, text, message_type, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(DEFAULT_CONVERSATION)
        .bind(&sender_id)
        .bind(sender.as_str())
        .bind(text)
        .bind(kind.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE conversation_id = ?")
            .bind(&now)
            .bind(DEFAULT_CONVERSATION)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn load_history(&self, limit: Option<u32>) -> Result<Vec<StoredMessage>, RepositoryError> {
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(i64::from).unwrap_or(-1);

        let rows = sqlx::query(
            r#"SELECT sender_name, text, message_type, created_at FROM (
                   SELECT id, sender_name, text, message_type, created_at
                   FROM messages
                   WHERE conversation_id = ?
                   ORDER BY id DESC
                   LIMIT ?
               ) ORDER BY id ASC"#,
        )
        .bind(DEFAULT_CONVERSATION)
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| {
                MessageRow::from_row(row)
                    .map_err(query_err)
                    .and_then(MessageRow::into_message)
            })
            .collect()
    }

    async fn ensure_participant(&self, identity: &Identity) -> Result<String, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let user_id = upsert_user(&mut tx, identity.as_str(), &now).await?;

        sqlx::query(
            r#"INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id, joined_at)
               VALUES (?, ?, ?)"#,
        )
        .bind(DEFAULT_CONVERSATION)
        .bind(&user_id)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(user_id)
    }

    async fn count_messages(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM messages")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_err)?;
        let count: i64 = row.try_get("count").map_err(query_err)?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::database_url;

    async fn test_repo() -> (SqliteMessageRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&database_url(dir.path())).await.unwrap();
        (SqliteMessageRepository::new(pool), dir)
    }

    fn id(name: &str) -> Identity {
        Identity::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load_history() {
        let (repo, _dir) = test_repo().await;

        repo.save(MessageKind::UserMessage, &id("alice"), "hello")
            .await
            .unwrap();
        repo.save(MessageKind::AssistantMessage, &id("AIBot"), "hi alice")
            .await
            .unwrap();

        let history = repo.load_history(None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sender, "alice");
        assert_eq!(history[0].kind, MessageKind::UserMessage);
        assert_eq!(history[1].sender, "AIBot");
        assert_eq!(history[1].kind, MessageKind::AssistantMessage);
        assert_eq!(history[1].text, "hi alice");
    }

    #[tokio::test]
    async fn test_history_is_latest_n_oldest_first() {
        let (repo, _dir) = test_repo().await;
        for i in 0..10 {
            repo.save(MessageKind::UserMessage, &id("bob"), &format!("m{i}"))
                .await
                .unwrap();
        }

        let history = repo.load_history(Some(3)).await.unwrap();
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m7", "m8", "m9"]);
    }

    #[tokio::test]
    async fn test_history_empty_and_zero_limit() {
        let (repo, _dir) = test_repo().await;
        assert!(repo.load_history(Some(50)).await.unwrap().is_empty());

        repo.save(MessageKind::UserMessage, &id("bob"), "x").await.unwrap();
        assert!(repo.load_history(Some(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_participant_is_stable() {
        let (repo, _dir) = test_repo().await;

        let first = repo.ensure_participant(&id("carol")).await.unwrap();
        let second = repo.ensure_participant(&id("carol")).await.unwrap();
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());

        let other = repo.ensure_participant(&id("dave")).await.unwrap();
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_save_reuses_participant_id() {
        let (repo, _dir) = test_repo().await;
        let user_id = repo.ensure_participant(&id("erin")).await.unwrap();
        repo.save(MessageKind::UserMessage, &id("erin"), "hey")
            .await
            .unwrap();

        let (sender_id,): (String,) = sqlx::query_as("SELECT sender_id FROM messages LIMIT 1")
            .fetch_one(&repo.pool.reader)
            .await
            .unwrap();
        assert_eq!(sender_id, user_id);
    }

    #[tokio::test]
    async fn test_count_messages() {
        let (repo, _dir) = test_repo().await;
        assert_eq!(repo.count_messages().await.unwrap(), 0);

        for _ in 0..4 {
            repo.save(MessageKind::UserMessage, &id("frank"), "spam")
                .await
                .unwrap();
        }
        assert_eq!(repo.count_messages().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_unicode_text_round_trips() {
        let (repo, _dir) = test_repo().await;
        repo.save(MessageKind::UserMessage, &id("ゆき"), "こんにちは 👋")
            .await
            .unwrap();

        let history = repo.load_history(Some(1)).await.unwrap();
        assert_eq!(history[0].sender, "ゆき");
        assert_eq!(history[0].text, "こんにちは 👋");
    }
}

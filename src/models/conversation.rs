use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::error::StoreError;

/// Fixed-width so that text order equals time order in SQLite.
const STORED_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
/// Format of the per-message display timestamp.
pub const MESSAGE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub user: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: &str, user: Option<&str>) -> Self {
        Message {
            role,
            content: content.to_string(),
            timestamp: Utc::now().format(MESSAGE_TIMESTAMP_FORMAT).to_string(),
            user: user.map(str::to_string),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConversationRecord {
    pub id: i64,
    pub user_id: String,
    pub session_id: String,
    pub conversation_data: Vec<Message>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionSummary {
    pub session_id: String,
    pub last_updated: DateTime<Utc>,
}

/// Message transcripts keyed by `(user_id, session_id)` in the `conversations` table.
#[derive(Clone, Debug)]
pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    /// Opens the database at `url` and applies the embedded migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        // An in-memory database exists per connection, so keep exactly one.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(ConversationStore { pool })
    }

    /// Replaces the stored transcript for `(user_id, session_id)`, creating the
    /// record on first save. The record id never changes after creation.
    pub async fn save(
        &self,
        user_id: &str,
        session_id: &str,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        let data = serde_json::to_string(messages)?;
        let now = format_timestamp(Utc::now());

        sqlx::query(
            "INSERT INTO conversations (user_id, session_id, conversation_data, last_updated) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(user_id, session_id) DO UPDATE SET \
                 conversation_data = excluded.conversation_data, \
                 last_updated = excluded.last_updated",
        )
        .bind(user_id)
        .bind(session_id)
        .bind(&data)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(
            "Saved {} messages for user {} session {}",
            messages.len(),
            user_id,
            session_id
        );
        Ok(())
    }

    /// Returns the stored transcript, or an empty one when nothing was saved yet.
    pub async fn load(&self, user_id: &str, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT conversation_data FROM conversations WHERE user_id = ?1 AND session_id = ?2",
        )
        .bind(user_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((data,)) => Ok(serde_json::from_str(&data)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn exists(&self, user_id: &str, session_id: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM conversations WHERE user_id = ?1 AND session_id = ?2")
                .bind(user_id)
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// All sessions of `user_id`, most recently updated first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, StoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT session_id, last_updated FROM conversations \
             WHERE user_id = ?1 ORDER BY last_updated DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(session_id, last_updated)| {
                Ok(SessionSummary {
                    session_id,
                    last_updated: parse_timestamp(&last_updated)?,
                })
            })
            .collect()
    }

    /// Every stored conversation, most recently updated first. Records whose
    /// transcript cannot be parsed are skipped.
    pub async fn list_all(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        let rows: Vec<(i64, String, String, String, String)> = sqlx::query_as(
            "SELECT id, user_id, session_id, conversation_data, last_updated \
             FROM conversations ORDER BY last_updated DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, user_id, session_id, data, last_updated) in rows {
            let conversation_data = match serde_json::from_str(&data) {
                Ok(messages) => messages,
                Err(e) => {
                    warn!("Skipping conversation {}: {}", id, e);
                    continue;
                }
            };
            records.push(ConversationRecord {
                id,
                user_id,
                session_id,
                conversation_data,
                last_updated: parse_timestamp(&last_updated)?,
            });
        }

        info!("Listed {} conversations", records.len());
        Ok(records)
    }

    pub async fn record(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<ConversationRecord>, StoreError> {
        let row: Option<(i64, String, String)> = sqlx::query_as(
            "SELECT id, conversation_data, last_updated FROM conversations \
             WHERE user_id = ?1 AND session_id = ?2",
        )
        .bind(user_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, data, last_updated)| {
            Ok(ConversationRecord {
                id,
                user_id: user_id.to_string(),
                session_id: session_id.to_string(),
                conversation_data: serde_json::from_str(&data)?,
                last_updated: parse_timestamp(&last_updated)?,
            })
        })
        .transpose()
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(STORED_TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {:?}: {}", raw, e)))
}

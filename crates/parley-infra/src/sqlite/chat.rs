//! SQLite chat repository implementation.
//!
//! Implements `ChatRepository` from `parley-core` using sqlx with split
//! read/write pools. A session is stored as one `chats` row plus one
//! `messages` row per message; `erased` separates the active window from
//! the archive and `order_msg` keeps each list in order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use parley_core::chat::repository::ChatRepository;
use parley_core::chat::session::{ChatSession, SessionSnapshot};
use parley_core::llm::tokenizer::ModelRegistry;
use parley_types::chat::{ChatConfiguration, ChatMessage, MessageRole, SessionStatus};
use parley_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatRepository`.
///
/// Needs the model registry to rebuild each chat's `Model` (and its
/// tokenizer) on load.
pub struct SqliteChatRepository {
    pool: DatabasePool,
    models: Arc<ModelRegistry>,
}

impl SqliteChatRepository {
    pub fn new(pool: DatabasePool, models: Arc<ModelRegistry>) -> Self {
        Self { pool, models }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ChatRow {
    id: String,
    user_id: String,
    status: String,
    model: String,
    model_max_tokens: i64,
    temperature: f64,
    top_p: f64,
    n: i64,
    stop: String,
    max_tokens: i64,
    presence_penalty: f64,
    frequency_penalty: f64,
    created_at: String,
    updated_at: String,
}

impl ChatRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            status: row.try_get("status")?,
            model: row.try_get("model")?,
            model_max_tokens: row.try_get("model_max_tokens")?,
            temperature: row.try_get("temperature")?,
            top_p: row.try_get("top_p")?,
            n: row.try_get("n")?,
            stop: row.try_get("stop")?,
            max_tokens: row.try_get("max_tokens")?,
            presence_penalty: row.try_get("presence_penalty")?,
            frequency_penalty: row.try_get("frequency_penalty")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_snapshot(
        self,
        models: &ModelRegistry,
        messages: Vec<ChatMessage>,
        erased_messages: Vec<ChatMessage>,
    ) -> Result<SessionSnapshot, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid chat id: {e}")))?;
        let status: SessionStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let stop: Vec<String> = serde_json::from_str(&self.stop)
            .map_err(|e| RepositoryError::Query(format!("invalid stop sequences: {e}")))?;
        let model = models
            .model(&self.model, to_u32(self.model_max_tokens, "model_max_tokens")?)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(SessionSnapshot {
            id,
            user_id: self.user_id,
            status,
            configuration: ChatConfiguration {
                model,
                temperature: self.temperature as f32,
                top_p: self.top_p as f32,
                n: to_u32(self.n, "n")?,
                stop,
                max_tokens: to_u32(self.max_tokens, "max_tokens")?,
                presence_penalty: self.presence_penalty as f32,
                frequency_penalty: self.frequency_penalty as f32,
            },
            messages,
            erased_messages,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct MessageRow {
    id: String,
    role: String,
    content: String,
    tokens: i64,
    model: String,
    erased: bool,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            tokens: row.try_get("tokens")?,
            model: row.try_get("model")?,
            erased: row.try_get("erased")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(ChatMessage::restore(
            id,
            role,
            self.content,
            to_u32(self.tokens, "tokens")?,
            self.model,
            parse_datetime(&self.created_at)?,
        ))
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn to_u32(value: i64, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Query(format!("{column} out of range: {value}")))
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

/// Insert the active window then the archive, each numbered from zero.
async fn insert_messages(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    session: &ChatSession,
) -> Result<(), RepositoryError> {
    let chat_id = session.id().to_string();
    let lists = [(false, session.messages()), (true, session.erased_messages())];

    for (erased, messages) in lists {
        for (order, message) in messages.iter().enumerate() {
            sqlx::query(
                "INSERT INTO messages (id, chat_id, role, content, tokens, model, erased, order_msg, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(message.id().to_string())
            .bind(&chat_id)
            .bind(message.role().to_string())
            .bind(message.content())
            .bind(i64::from(message.token_count()))
            .bind(message.model())
            .bind(erased)
            .bind(order as i64)
            .bind(format_datetime(&message.created_at()))
            .execute(&mut **tx)
            .await
            .map_err(query_error)?;
        }
    }

    Ok(())
}

fn stop_json(config: &ChatConfiguration) -> Result<String, RepositoryError> {
    serde_json::to_string(&config.stop)
        .map_err(|e| RepositoryError::Query(format!("failed to encode stop sequences: {e}")))
}

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn create_session(&self, session: &ChatSession) -> Result<(), RepositoryError> {
        let config = session.configuration();
        let stop = stop_json(config)?;

        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        sqlx::query(
            r#"INSERT INTO chats (id, user_id, status, token_usage, model, model_max_tokens,
                   temperature, top_p, n, stop, max_tokens, presence_penalty, frequency_penalty,
                   created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session.id().to_string())
        .bind(session.user_id())
        .bind(session.status().to_string())
        .bind(i64::from(session.token_usage()))
        .bind(config.model.name())
        .bind(i64::from(config.model.capacity()))
        .bind(f64::from(config.temperature))
        .bind(f64::from(config.top_p))
        .bind(i64::from(config.n))
        .bind(stop)
        .bind(i64::from(config.max_tokens))
        .bind(f64::from(config.presence_penalty))
        .bind(f64::from(config.frequency_penalty))
        .bind(format_datetime(&session.created_at()))
        .bind(format_datetime(&session.updated_at()))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.message().contains("UNIQUE") {
                    return RepositoryError::Conflict(format!(
                        "chat {} already exists",
                        session.id()
                    ));
                }
            }
            query_error(e)
        })?;

        insert_messages(&mut tx, session).await?;

        tx.commit().await.map_err(query_error)?;
        tracing::debug!(chat_id = %session.id(), "Chat session inserted");
        Ok(())
    }

    async fn find_session(&self, session_id: &Uuid) -> Result<ChatSession, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?
            .ok_or(RepositoryError::NotFound)?;
        let chat_row = ChatRow::from_row(&row).map_err(query_error)?;

        let rows = sqlx::query(
            "SELECT * FROM messages WHERE chat_id = ? ORDER BY erased ASC, order_msg ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut messages = Vec::new();
        let mut erased_messages = Vec::new();
        for row in &rows {
            let message_row = MessageRow::from_row(row).map_err(query_error)?;
            if message_row.erased {
                erased_messages.push(message_row.into_message()?);
            } else {
                messages.push(message_row.into_message()?);
            }
        }

        let snapshot = chat_row.into_snapshot(&self.models, messages, erased_messages)?;
        ChatSession::restore(snapshot).map_err(|e| {
            RepositoryError::Query(format!("stored chat {session_id} is inconsistent: {e}"))
        })
    }

    async fn save_session(&self, session: &ChatSession) -> Result<(), RepositoryError> {
        let config = session.configuration();
        let stop = stop_json(config)?;

        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let result = sqlx::query(
            r#"UPDATE chats
               SET user_id = ?, status = ?, token_usage = ?, model = ?, model_max_tokens = ?,
                   temperature = ?, top_p = ?, n = ?, stop = ?, max_tokens = ?,
                   presence_penalty = ?, frequency_penalty = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(session.user_id())
        .bind(session.status().to_string())
        .bind(i64::from(session.token_usage()))
        .bind(config.model.name())
        .bind(i64::from(config.model.capacity()))
        .bind(f64::from(config.temperature))
        .bind(f64::from(config.top_p))
        .bind(i64::from(config.n))
        .bind(stop)
        .bind(i64::from(config.max_tokens))
        .bind(f64::from(config.presence_penalty))
        .bind(f64::from(config.frequency_penalty))
        .bind(format_datetime(&session.updated_at()))
        .bind(session.id().to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        // Dropping the transaction rolls it back.
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query("DELETE FROM messages WHERE chat_id = ?")
            .bind(session.id().to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        insert_messages(&mut tx, session).await?;

        tx.commit().await.map_err(query_error)?;
        tracing::debug!(
            chat_id = %session.id(),
            active = session.messages().len(),
            erased = session.erased_messages().len(),
            "Chat session saved"
        );
        Ok(())
    }
}

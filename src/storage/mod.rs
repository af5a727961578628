//! Durable storage for conversations, messages, and usage records
//!
//! The `DurableStore` trait is the ground-truth tier of the cache-aside
//! protocol. `SqliteStorage` is the file-backed production implementation;
//! `MemoryStore` backs tests and embedders that want no file on disk.

use crate::error::{ConvosyncError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod memory;
pub mod types;

pub use memory::MemoryStore;
pub use types::{
    ConversationRecord, MessageRecord, MessageRole, UsageRecord, UsageScope, UsageTotals,
};

/// Current time as epoch seconds
pub fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// UTC day boundaries of a calendar date as epoch seconds
///
/// Used to page usage records scoped to one day.
pub fn day_bounds(date: NaiveDate) -> (f64, f64) {
    let start = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp() as f64)
        .unwrap_or(0.0);
    (start, start + 86_400.0)
}

/// Persistent CRUD for conversations, messages, and usage records
///
/// Implementations are safe for concurrent reads and serialize their own
/// writes; callers never hold transactions spanning cache and store. The
/// store is always treated as ground truth on cache miss.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// All conversations, most recently active first
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>>;

    async fn insert_conversation(&self, record: &ConversationRecord) -> Result<()>;

    /// Update title and last-activity of an existing conversation
    async fn update_conversation(&self, record: &ConversationRecord) -> Result<()>;

    /// Delete conversations, cascading their messages and usage records
    async fn delete_conversations(&self, conversation_ids: &[String]) -> Result<()>;

    async fn insert_messages(&self, messages: &[MessageRecord]) -> Result<()>;

    /// Messages of a conversation, ascending by timestamp
    async fn messages_for(&self, conversation_id: &str) -> Result<Vec<MessageRecord>>;

    /// The latest assistant reply, source of the continuation token
    async fn most_recent_assistant_message(
        &self,
        conversation_id: &str,
    ) -> Result<Option<MessageRecord>>;

    async fn insert_usage_records(&self, records: &[UsageRecord]) -> Result<()>;

    /// Usage record of one message, if any
    async fn usage_for(
        &self,
        message_id: &str,
        conversation_id: &str,
    ) -> Result<Option<UsageRecord>>;

    /// One page of a conversation's usage records, ascending by timestamp
    async fn usage_page_for_conversation(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageRecord>>;

    /// One page of a UTC calendar day's usage records, ascending by timestamp
    async fn usage_page_for_date(
        &self,
        date: NaiveDate,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageRecord>>;
}

/// SQLite-backed durable store
pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Create a storage instance in the user's data directory
    ///
    /// The database path can be overridden with the `CONVOSYNC_HISTORY_DB`
    /// environment variable, which makes it easy to point at a test DB or
    /// alternate file without changing the application data dir.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("CONVOSYNC_HISTORY_DB") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "convosync", "convosync")
            .ok_or_else(|| ConvosyncError::Storage("could not determine data directory".into()))?;
        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| ConvosyncError::Storage(format!("failed to create data directory: {e}")))?;

        Self::new_with_path(data_dir.join("history.db"))
    }

    /// Create a storage instance at a specific database path
    ///
    /// Primarily useful for tests where the default application data
    /// directory is not desirable (for example, a temporary directory).
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConvosyncError::Storage(format!("failed to create database directory: {e}"))
            })?;
        }
        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .map_err(|e| ConvosyncError::Storage(format!("failed to open database: {e}")).into())
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                last_activity REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                text TEXT NOT NULL,
                timestamp REAL NOT NULL,
                role TEXT NOT NULL,
                continuation_token TEXT,
                model_id TEXT NOT NULL,
                model_provider_id TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS usage_records (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                model_id TEXT NOT NULL,
                model_provider_id TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                timestamp REAL NOT NULL,
                duration_ms REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages (conversation_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_usage_conversation
                ON usage_records (conversation_id, timestamp);",
        )
        .map_err(|e| ConvosyncError::Storage(format!("failed to create tables: {e}")))?;
        Ok(())
    }
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    let role: String = row.get(4)?;
    Ok(MessageRecord {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        text: row.get(2)?,
        timestamp: row.get(3)?,
        role: MessageRole::parse(&role),
        continuation_token: row.get(5)?,
        model_id: row.get(6)?,
        model_provider_id: row.get(7)?,
    })
}

fn usage_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UsageRecord> {
    Ok(UsageRecord {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        message_id: row.get(2)?,
        model_id: row.get(3)?,
        model_provider_id: row.get(4)?,
        input_tokens: row.get(5)?,
        output_tokens: row.get(6)?,
        timestamp: row.get(7)?,
        duration_ms: row.get(8)?,
    })
}

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, text, timestamp, role, continuation_token, model_id, model_provider_id";
const USAGE_COLUMNS: &str = "id, conversation_id, message_id, model_id, model_provider_id, \
     input_tokens, output_tokens, timestamp, duration_ms";

#[async_trait]
impl DurableStore for SqliteStorage {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, last_activity FROM conversations ORDER BY last_activity DESC",
            )
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ConversationRecord {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    last_activity: row.get(2)?,
                })
            })
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        let mut conversations = Vec::new();
        for record in rows {
            conversations.push(record.map_err(|e| ConvosyncError::Storage(e.to_string()))?);
        }
        Ok(conversations)
    }

    async fn insert_conversation(&self, record: &ConversationRecord) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO conversations (id, title, last_activity) VALUES (?, ?, ?)",
            params![record.id, record.title, record.last_activity],
        )
        .map_err(|e| ConvosyncError::Storage(format!("failed to insert conversation: {e}")))?;
        Ok(())
    }

    async fn update_conversation(&self, record: &ConversationRecord) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE conversations SET title = ?, last_activity = ? WHERE id = ?",
            params![record.title, record.last_activity, record.id],
        )
        .map_err(|e| ConvosyncError::Storage(format!("failed to update conversation: {e}")))?;
        Ok(())
    }

    async fn delete_conversations(&self, conversation_ids: &[String]) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        for id in conversation_ids {
            tx.execute("DELETE FROM messages WHERE conversation_id = ?", params![id])
                .map_err(|e| ConvosyncError::Storage(format!("failed to delete messages: {e}")))?;
            tx.execute(
                "DELETE FROM usage_records WHERE conversation_id = ?",
                params![id],
            )
            .map_err(|e| ConvosyncError::Storage(format!("failed to delete usage: {e}")))?;
            tx.execute("DELETE FROM conversations WHERE id = ?", params![id])
                .map_err(|e| {
                    ConvosyncError::Storage(format!("failed to delete conversation: {e}"))
                })?;
        }
        tx.commit()
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn insert_messages(&self, messages: &[MessageRecord]) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        for message in messages {
            tx.execute(
                "INSERT INTO messages (id, conversation_id, text, timestamp, role, \
                 continuation_token, model_id, model_provider_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    message.id,
                    message.conversation_id,
                    message.text,
                    message.timestamp,
                    message.role.as_str(),
                    message.continuation_token,
                    message.model_id,
                    message.model_provider_id,
                ],
            )
            .map_err(|e| ConvosyncError::Storage(format!("failed to insert message: {e}")))?;
        }
        tx.commit()
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn messages_for(&self, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ? \
                 ORDER BY timestamp ASC"
            ))
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![conversation_id], message_from_row)
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        let mut messages = Vec::new();
        for message in rows {
            messages.push(message.map_err(|e| ConvosyncError::Storage(e.to_string()))?);
        }
        Ok(messages)
    }

    async fn most_recent_assistant_message(
        &self,
        conversation_id: &str,
    ) -> Result<Option<MessageRecord>> {
        let conn = self.open()?;
        let message = conn
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages \
                     WHERE conversation_id = ? AND role = 'assistant' \
                     ORDER BY timestamp DESC LIMIT 1"
                ),
                params![conversation_id],
                message_from_row,
            )
            .optional()
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        Ok(message)
    }

    async fn insert_usage_records(&self, records: &[UsageRecord]) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        for record in records {
            tx.execute(
                "INSERT INTO usage_records (id, conversation_id, message_id, model_id, \
                 model_provider_id, input_tokens, output_tokens, timestamp, duration_ms) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id,
                    record.conversation_id,
                    record.message_id,
                    record.model_id,
                    record.model_provider_id,
                    record.input_tokens,
                    record.output_tokens,
                    record.timestamp,
                    record.duration_ms,
                ],
            )
            .map_err(|e| ConvosyncError::Storage(format!("failed to insert usage: {e}")))?;
        }
        tx.commit()
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn usage_for(
        &self,
        message_id: &str,
        conversation_id: &str,
    ) -> Result<Option<UsageRecord>> {
        let conn = self.open()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {USAGE_COLUMNS} FROM usage_records \
                     WHERE message_id = ? AND conversation_id = ? LIMIT 1"
                ),
                params![message_id, conversation_id],
                usage_from_row,
            )
            .optional()
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        Ok(record)
    }

    async fn usage_page_for_conversation(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageRecord>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USAGE_COLUMNS} FROM usage_records WHERE conversation_id = ? \
                 ORDER BY timestamp ASC LIMIT ? OFFSET ?"
            ))
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![conversation_id, limit as i64, offset as i64],
                usage_from_row,
            )
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        let mut records = Vec::new();
        for record in rows {
            records.push(record.map_err(|e| ConvosyncError::Storage(e.to_string()))?);
        }
        Ok(records)
    }

    async fn usage_page_for_date(
        &self,
        date: NaiveDate,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageRecord>> {
        let (start, end) = day_bounds(date);
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USAGE_COLUMNS} FROM usage_records \
                 WHERE timestamp >= ? AND timestamp < ? \
                 ORDER BY timestamp ASC LIMIT ? OFFSET ?"
            ))
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![start, end, limit as i64, offset as i64],
                usage_from_row,
            )
            .map_err(|e| ConvosyncError::Storage(e.to_string()))?;
        let mut records = Vec::new();
        for record in rows {
            records.push(record.map_err(|e| ConvosyncError::Storage(e.to_string()))?);
        }
        Ok(records)
    }
}

//! Record types persisted by the durable store
//!
//! These are the rows the synchronization core moves between the cache,
//! the durable store, and the completion providers. Timestamps are epoch
//! seconds (`f64`); calendar grouping happens at the timeline layer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    /// Stable string form used in storage and wire payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    /// Parse a stored role string, defaulting unknown values to assistant
    pub fn parse(value: &str) -> Self {
        match value {
            "user" => MessageRole::User,
            "system" => MessageRole::System,
            _ => MessageRole::Assistant,
        }
    }
}

/// A conversation as listed in the sidebar
///
/// The title starts empty and is set from the first user message. Identity
/// is `id`; `last_activity` drives the recency ordering of the durable
/// store's conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub title: String,
    /// Epoch seconds of the last mutation touching this conversation
    pub last_activity: f64,
}

impl ConversationRecord {
    /// Create a conversation with an empty title, stamped now
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            last_activity: crate::storage::epoch_now(),
        }
    }
}

/// A single chat message
///
/// Immutable once persisted. `continuation_token` is only set on assistant
/// messages and links the reply to the provider's session context so the
/// next turn can resume it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub text: String,
    /// Epoch seconds
    pub timestamp: f64,
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
    pub model_id: String,
    pub model_provider_id: String,
}

/// Token usage for one completed remote call
///
/// Created only alongside its assistant `MessageRecord`; user messages
/// never have one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub model_id: String,
    pub model_provider_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Epoch seconds
    pub timestamp: f64,
    pub duration_ms: f64,
}

/// Scope of an aggregated usage total
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UsageScope {
    Conversation(String),
    Date(NaiveDate),
}

/// Aggregated token totals for a scope
///
/// Derived and recomputable; cached with LRU lifetime, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageTotals {
    pub scope: UsageScope,
    pub input_total: u64,
    pub output_total: u64,
}

impl UsageTotals {
    /// Zeroed totals for a scope, the starting point of an aggregation
    pub fn empty(scope: UsageScope) -> Self {
        Self {
            scope,
            input_total: 0,
            output_total: 0,
        }
    }

    /// Fold one usage record into the running totals
    pub fn accumulate(&mut self, record: &UsageRecord) {
        self.input_total += record.input_tokens;
        self.output_total += record.output_tokens;
    }
}

//! Action and result types routed between presentation code and orchestrators
//!
//! Every inbound intent is a typed action; every action produces exactly one
//! typed update on the broadcast channel of its category. Updates are never
//! merged across actions. The variants here are the closed set the router
//! fans out over.

use crate::providers::ProviderModel;
use crate::storage::types::{
    ConversationRecord, MessageRecord, UsageRecord, UsageScope, UsageTotals,
};
use chrono::NaiveDate;

/// Classified failure kinds surfaced to chat consumers
///
/// Transport errors never leak past the orchestrator boundary; they arrive
/// here already classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    /// Transient server-side failure; the caller may resubmit
    Retryable,
    /// Authentication or authorization failure; not retryable
    AccessDenied,
    /// Anything else, including exhausted retries
    Unknown,
}

/// Error descriptor published with a failed chat result
///
/// Carries the original request so the caller can resubmit it with an
/// incremented retry counter. The system never auto-retries.
#[derive(Debug, Clone)]
pub struct ChatError {
    pub kind: ChatErrorKind,
    pub message: String,
    pub original: CompletionRequest,
}

/// Request for one completion turn
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub input: String,
    pub conversation_id: String,
    pub model: ProviderModel,
    /// 0 on first submission; a retry is a new request with this bumped
    pub retry_attempt: u32,
}

/// Chat-get actions, handled by the message orchestrator
#[derive(Debug, Clone)]
pub enum ChatAction {
    RequestCompletion(CompletionRequest),
    FetchHistory { conversation_id: String },
}

/// Chat-set results, published by the message orchestrator
#[derive(Debug, Clone)]
pub enum ChatUpdate {
    /// The provisional user message has been cached and can be displayed
    UserMessageAdded {
        conversation_id: String,
        message: MessageRecord,
    },
    /// Terminal result of a completion request: new messages or an error
    ResponseArrived {
        conversation_id: String,
        messages: Vec<MessageRecord>,
        error: Option<ChatError>,
    },
    /// Result of a history fetch; an empty list means "no messages"
    HistoryLoaded {
        conversation_id: String,
        messages: Vec<MessageRecord>,
    },
}

/// Conversation-get actions, handled by the conversation orchestrator
#[derive(Debug, Clone)]
pub enum ConversationAction {
    List,
    Create(ConversationRecord),
    Delete(Vec<ConversationRecord>),
    Rename(ConversationRecord),
}

/// Conversation-mutate results
#[derive(Debug, Clone)]
pub enum ConversationUpdate {
    ListLoaded(Vec<ConversationRecord>),
    Created(ConversationRecord),
}

/// Usage-get actions, handled by the usage aggregator
#[derive(Debug, Clone)]
pub enum UsageAction {
    ByMessage {
        message_id: String,
        conversation_id: String,
    },
    ByConversation {
        conversation_id: String,
        limit: usize,
        offset: usize,
    },
    ByDate {
        date: NaiveDate,
        limit: usize,
        offset: usize,
    },
    Total {
        scope: UsageScope,
    },
}

/// Usage-mutate results
#[derive(Debug, Clone)]
pub enum UsageUpdate {
    /// Raw records answering a ByMessage/ByConversation/ByDate query
    Records {
        records: Vec<UsageRecord>,
        original: UsageAction,
    },
    /// Running or final totals; `finished` marks the last page
    Total { totals: UsageTotals, finished: bool },
}

/// Settings-get actions
#[derive(Debug, Clone)]
pub enum SettingsAction {
    Get { key: String },
    Update { key: String, value: serde_json::Value },
}

/// Settings-mutate results
#[derive(Debug, Clone)]
pub enum SettingsUpdate {
    Value {
        key: String,
        value: Option<serde_json::Value>,
        error: Option<String>,
    },
}

/// Top-level action accepted by the router
///
/// Each variant maps to exactly one broadcast channel.
#[derive(Debug, Clone)]
pub enum Action {
    Chat(ChatAction),
    ChatUpdate(ChatUpdate),
    Conversation(ConversationAction),
    ConversationUpdate(ConversationUpdate),
    Usage(UsageAction),
    UsageUpdate(UsageUpdate),
    Settings(SettingsAction),
    SettingsUpdate(SettingsUpdate),
}

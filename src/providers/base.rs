//! Base completion-service trait and common types
//!
//! A completion service issues a single remote completion attempt and
//! returns the assistant message plus its usage statistics, or a failure
//! that is already classified. Retries are the caller's responsibility.

use crate::storage::types::{MessageRecord, UsageRecord};
use async_trait::async_trait;
use thiserror::Error;

/// Classified failure from one completion attempt
///
/// This is the only error shape that crosses the provider boundary; raw
/// transport errors are mapped here by each implementation.
#[derive(Error, Debug, Clone)]
pub enum CompletionError {
    /// Transient server-side failure (5xx); worth resubmitting
    #[error("retryable provider failure: {0}")]
    Retryable(String),

    /// Authentication or authorization failure (401/403, missing key)
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Anything else, including malformed responses
    #[error("completion failed: {0}")]
    Unknown(String),
}

/// One assistant reply and the usage record created alongside it
#[derive(Debug, Clone)]
pub struct CompletionReply {
    pub message: MessageRecord,
    pub usage: UsageRecord,
}

/// A remote completion service
///
/// Implementations perform exactly one attempt per call and run to
/// completion or failure; there is no mid-flight cancellation. The
/// continuation token, when present, resumes the provider-side session
/// context of the previous assistant reply.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Request one completion for `input` in the given conversation
    ///
    /// # Arguments
    ///
    /// * `input` - The user's message text
    /// * `continuation_token` - Session context token from the most recent
    ///   assistant message, if any
    /// * `model_id` - Provider-specific model identifier
    /// * `conversation_id` - Conversation the resulting records belong to
    async fn complete(
        &self,
        input: &str,
        continuation_token: Option<&str>,
        model_id: &str,
        conversation_id: &str,
    ) -> Result<CompletionReply, CompletionError>;
}

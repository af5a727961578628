//! OpenAI Responses API completion service
//!
//! Issues a single POST to `/responses` with the input text, the previous
//! response id as continuation context, and the model id. HTTP statuses are
//! classified at this boundary: 401/403 become `AccessDenied`, 5xx becomes
//! `Retryable`, everything else (including parse failures) is `Unknown`.

use crate::config::OpenAiConfig;
use crate::error::{ConvosyncError, Result};
use crate::providers::base::{CompletionError, CompletionReply, CompletionService};
use crate::storage::epoch_now;
use crate::storage::types::{MessageRecord, MessageRole, UsageRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI provider id used in model catalogs and usage records
pub const OPENAI_PROVIDER_ID: &str = "openai";

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_response_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ResponsesReply {
    id: String,
    output: Vec<ResponseOutput>,
    usage: Option<ResponseUsage>,
}

#[derive(Deserialize)]
struct ResponseOutput {
    #[serde(rename = "type")]
    kind: String,
    id: String,
    role: Option<String>,
    content: Option<Vec<ResponseContent>>,
}

#[derive(Deserialize)]
struct ResponseContent {
    text: String,
}

#[derive(Deserialize)]
struct ResponseUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

/// Completion service backed by the OpenAI Responses API
pub struct OpenAiService {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiService {
    /// Create a service from provider configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(ConvosyncError::Http)?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();
        format!("{base}/responses")
    }

    fn api_key(&self) -> std::result::Result<String, CompletionError> {
        std::env::var(&self.config.api_key_env).map_err(|_| {
            CompletionError::AccessDenied(format!(
                "no API key in {} environment variable",
                self.config.api_key_env
            ))
        })
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> CompletionError {
        let detail = format!("{status}: {body}");
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            CompletionError::AccessDenied(detail)
        } else if status.is_server_error() {
            CompletionError::Retryable(detail)
        } else {
            CompletionError::Unknown(detail)
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiService {
    async fn complete(
        &self,
        input: &str,
        continuation_token: Option<&str>,
        model_id: &str,
        conversation_id: &str,
    ) -> std::result::Result<CompletionReply, CompletionError> {
        let api_key = self.api_key()?;
        let body = ResponsesRequest {
            model: model_id,
            input,
            previous_response_id: continuation_token,
        };

        let started = epoch_now();
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Unknown(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::debug!("completion request rejected with {status}");
            return Err(Self::classify_status(status, &text));
        }

        let reply: ResponsesReply = response
            .json()
            .await
            .map_err(|e| CompletionError::Unknown(format!("malformed response: {e}")))?;
        let finished = epoch_now();

        let output = reply
            .output
            .iter()
            .find(|output| output.kind == "message")
            .ok_or_else(|| {
                CompletionError::Unknown("response contained no message output".to_string())
            })?;
        let text = output
            .content
            .as_ref()
            .and_then(|content| content.first())
            .map(|content| content.text.clone())
            .ok_or_else(|| {
                CompletionError::Unknown("message output contained no text".to_string())
            })?;
        let role = output
            .role
            .as_deref()
            .map(MessageRole::parse)
            .unwrap_or(MessageRole::Assistant);

        let message = MessageRecord {
            id: output.id.clone(),
            conversation_id: conversation_id.to_string(),
            text,
            timestamp: finished,
            role,
            continuation_token: Some(reply.id.clone()),
            model_id: model_id.to_string(),
            model_provider_id: OPENAI_PROVIDER_ID.to_string(),
        };
        let usage = reply.usage.as_ref();
        let usage = UsageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            message_id: message.id.clone(),
            model_id: model_id.to_string(),
            model_provider_id: OPENAI_PROVIDER_ID.to_string(),
            input_tokens: usage.and_then(|u| u.input_tokens).unwrap_or(0),
            output_tokens: usage.and_then(|u| u.output_tokens).unwrap_or(0),
            timestamp: finished,
            duration_ms: (finished - started) * 1000.0,
        };

        Ok(CompletionReply { message, usage })
    }
}

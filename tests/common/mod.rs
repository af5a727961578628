//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use convosync::actions::CompletionRequest;
use convosync::providers::{
    CompletionError, CompletionReply, CompletionService, ProviderModel, ServiceRegistry,
};
use convosync::settings::SettingsStore;
use convosync::storage::types::{MessageRecord, MessageRole, UsageRecord};
use convosync::storage::{epoch_now, DurableStore, SqliteStorage};
use convosync::{Config, SyncEngine};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Initialise test logging once per process
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Outcome a scripted completion call should produce
pub enum Scripted {
    Reply { text: String, input_tokens: u64, output_tokens: u64 },
    Fail(CompletionError),
}

/// Completion service answering from a queue of scripted outcomes
pub struct ScriptedService {
    outcomes: Mutex<VecDeque<Scripted>>,
}

impl ScriptedService {
    pub fn new(outcomes: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
        })
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn complete(
        &self,
        _input: &str,
        _continuation_token: Option<&str>,
        model_id: &str,
        conversation_id: &str,
    ) -> Result<CompletionReply, CompletionError> {
        let scripted = self
            .outcomes
            .lock()
            .expect("outcomes lock")
            .pop_front()
            .unwrap_or(Scripted::Fail(CompletionError::Unknown(
                "unscripted call".into(),
            )));
        match scripted {
            Scripted::Fail(error) => Err(error),
            Scripted::Reply {
                text,
                input_tokens,
                output_tokens,
            } => {
                let timestamp = epoch_now();
                let id = uuid::Uuid::new_v4().to_string();
                Ok(CompletionReply {
                    message: MessageRecord {
                        id: id.clone(),
                        conversation_id: conversation_id.to_string(),
                        text,
                        timestamp,
                        role: MessageRole::Assistant,
                        continuation_token: Some(format!("resp_{id}")),
                        model_id: model_id.to_string(),
                        model_provider_id: "openai".to_string(),
                    },
                    usage: UsageRecord {
                        id: uuid::Uuid::new_v4().to_string(),
                        conversation_id: conversation_id.to_string(),
                        message_id: id,
                        model_id: model_id.to_string(),
                        model_provider_id: "openai".to_string(),
                        input_tokens,
                        output_tokens,
                        timestamp,
                        duration_ms: 12.0,
                    },
                })
            }
        }
    }
}

/// Engine over a SQLite file and a scripted completion service
pub fn engine_with_sqlite(
    db_path: &Path,
    service: Arc<dyn CompletionService>,
) -> SyncEngine {
    let store = Arc::new(SqliteStorage::new_with_path(db_path).expect("sqlite storage"));
    engine_with_store(store, service)
}

/// Engine over an arbitrary store and a scripted completion service
pub fn engine_with_store(
    store: Arc<dyn DurableStore>,
    service: Arc<dyn CompletionService>,
) -> SyncEngine {
    let mut registry = ServiceRegistry::empty();
    registry.register("openai", service);
    SyncEngine::new(
        Config::default(),
        store,
        Arc::new(registry),
        Arc::new(SettingsStore::in_memory()),
    )
}

/// Completion request against the default test model
pub fn request(conversation_id: &str, input: &str, retry_attempt: u32) -> CompletionRequest {
    CompletionRequest {
        input: input.to_string(),
        conversation_id: conversation_id.to_string(),
        model: ProviderModel::openai("gpt-5-mini", "GPT 5 Mini"),
        retry_attempt,
    }
}

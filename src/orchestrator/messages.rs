//! Message orchestration
//!
//! Handles completion requests and history reads for chat messages:
//! cache-aside history fetches, provisional user-message insertion,
//! continuation-token resolution, remote completion, persistence of the
//! reply and its usage record, and retry/error classification.

use crate::actions::{
    Action, ChatAction, ChatError, ChatErrorKind, ChatUpdate, CompletionRequest,
    ConversationAction,
};
use crate::cache::ConversationCache;
use crate::dispatch::ActionRouter;
use crate::providers::{CompletionError, ServiceRegistry};
use crate::storage::types::{MessageRecord, MessageRole};
use crate::storage::{epoch_now, DurableStore};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Empty titles are filled with this many leading characters of the first
/// user message.
const TITLE_PREFIX_LEN: usize = 35;

/// Coordinates cache, store, and completion services for chat messages
pub struct MessageOrchestrator {
    router: ActionRouter,
    cache: Arc<ConversationCache>,
    store: Arc<dyn DurableStore>,
    services: Arc<ServiceRegistry>,
    max_retry_attempts: u32,
}

impl MessageOrchestrator {
    pub fn new(
        router: ActionRouter,
        cache: Arc<ConversationCache>,
        store: Arc<dyn DurableStore>,
        services: Arc<ServiceRegistry>,
        max_retry_attempts: u32,
    ) -> Self {
        Self {
            router,
            cache,
            store,
            services,
            max_retry_attempts,
        }
    }

    /// Consume chat actions until the channel closes
    pub async fn run(self, mut actions: broadcast::Receiver<ChatAction>) {
        loop {
            match actions.recv().await {
                Ok(action) => self.handle(action).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("chat action subscriber lagged, skipped {skipped}");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Handle a single chat action
    pub async fn handle(&self, action: ChatAction) {
        match action {
            ChatAction::RequestCompletion(request) => self.request_completion(request).await,
            ChatAction::FetchHistory { conversation_id } => {
                self.fetch_history(&conversation_id).await
            }
        }
    }

    async fn request_completion(&self, request: CompletionRequest) {
        tracing::debug!(
            conversation = %request.conversation_id,
            attempt = request.retry_attempt,
            "requesting completion"
        );

        // The provisional user message exists from attempt 0; a retry must
        // not resubmit it.
        if request.retry_attempt == 0 {
            self.add_user_message(&request).await;
        }

        let continuation_token = match self
            .store
            .most_recent_assistant_message(&request.conversation_id)
            .await
        {
            Ok(message) => message.and_then(|m| m.continuation_token),
            Err(e) => {
                tracing::error!("failed to read continuation token: {e}");
                None
            }
        };

        let Some(service) = self.services.service(&request.model.model_provider_id) else {
            let detail = format!(
                "no completion service for provider {}",
                request.model.model_provider_id
            );
            tracing::error!("{detail}");
            self.publish_failure(request, ChatErrorKind::Unknown, detail);
            return;
        };

        let outcome = service
            .complete(
                &request.input,
                continuation_token.as_deref(),
                &request.model.id,
                &request.conversation_id,
            )
            .await;

        match outcome {
            Ok(reply) => {
                self.cache
                    .append_messages(&request.conversation_id, vec![reply.message.clone()]);
                if let Err(e) = self
                    .store
                    .insert_messages(std::slice::from_ref(&reply.message))
                    .await
                {
                    tracing::error!("failed to persist assistant message: {e}");
                }
                if let Err(e) = self
                    .store
                    .insert_usage_records(std::slice::from_ref(&reply.usage))
                    .await
                {
                    tracing::error!("failed to persist usage record: {e}");
                }
                self.router.dispatch(Action::ChatUpdate(ChatUpdate::ResponseArrived {
                    conversation_id: request.conversation_id.clone(),
                    messages: vec![reply.message],
                    error: None,
                }));
                // Refresh so recency ordering and the new title become visible.
                self.router
                    .dispatch(Action::Conversation(ConversationAction::List));
            }
            Err(error) => {
                let kind = if request.retry_attempt >= self.max_retry_attempts {
                    ChatErrorKind::Unknown
                } else {
                    classify(&error)
                };
                tracing::debug!(
                    conversation = %request.conversation_id,
                    "completion failed: {error}"
                );
                self.publish_failure(request, kind, error.to_string());
            }
        }
    }

    /// Synthesize and publish the provisional user message, and assign the
    /// conversation title if this is its first message
    async fn add_user_message(&self, request: &CompletionRequest) {
        let message = MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: request.conversation_id.clone(),
            text: request.input.clone(),
            // Rounded up so the message never sorts before a separator
            // computed for the same instant.
            timestamp: epoch_now().ceil(),
            role: MessageRole::User,
            continuation_token: None,
            model_id: request.model.id.clone(),
            model_provider_id: request.model.model_provider_id.clone(),
        };

        self.cache
            .append_messages(&request.conversation_id, vec![message.clone()]);
        if let Err(e) = self
            .store
            .insert_messages(std::slice::from_ref(&message))
            .await
        {
            tracing::error!("failed to persist user message: {e}");
        }

        self.assign_title_if_empty(request).await;

        self.router.dispatch(Action::ChatUpdate(ChatUpdate::UserMessageAdded {
            conversation_id: request.conversation_id.clone(),
            message,
        }));
        self.router
            .dispatch(Action::Conversation(ConversationAction::List));
    }

    async fn assign_title_if_empty(&self, request: &CompletionRequest) {
        let conversation = match self.cache.find_conversation(&request.conversation_id) {
            Some(record) => Some(record),
            None => match self.store.list_conversations().await {
                Ok(list) => list.into_iter().find(|c| c.id == request.conversation_id),
                Err(e) => {
                    tracing::error!("failed to look up conversation for title: {e}");
                    None
                }
            },
        };
        let Some(mut conversation) = conversation else {
            return;
        };
        if !conversation.title.is_empty() {
            return;
        }

        conversation.title = request.input.chars().take(TITLE_PREFIX_LEN).collect();
        conversation.last_activity = epoch_now();
        self.cache.upsert_conversation(conversation.clone());
        if let Err(e) = self.store.update_conversation(&conversation).await {
            tracing::error!("failed to persist conversation title: {e}");
        }
    }

    async fn fetch_history(&self, conversation_id: &str) {
        let cached = self.cache.messages_for(conversation_id);
        let messages = if cached.is_empty() {
            match self.store.messages_for(conversation_id).await {
                Ok(stored) => {
                    if !stored.is_empty() {
                        self.cache.append_messages(conversation_id, stored.clone());
                    }
                    stored
                }
                Err(e) => {
                    tracing::error!("failed to load history: {e}");
                    Vec::new()
                }
            }
        } else {
            cached
        };

        // Published even when empty so callers can distinguish "no
        // messages" from "still loading".
        self.router.dispatch(Action::ChatUpdate(ChatUpdate::HistoryLoaded {
            conversation_id: conversation_id.to_string(),
            messages,
        }));
    }

    fn publish_failure(&self, request: CompletionRequest, kind: ChatErrorKind, message: String) {
        let conversation_id = request.conversation_id.clone();
        self.router.dispatch(Action::ChatUpdate(ChatUpdate::ResponseArrived {
            conversation_id,
            messages: Vec::new(),
            error: Some(ChatError {
                kind,
                message,
                original: request,
            }),
        }));
    }
}

fn classify(error: &CompletionError) -> ChatErrorKind {
    match error {
        CompletionError::Retryable(_) => ChatErrorKind::Retryable,
        CompletionError::AccessDenied(_) => ChatErrorKind::AccessDenied,
        CompletionError::Unknown(_) => ChatErrorKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionReply, CompletionService, ProviderModel};
    use crate::storage::types::ConversationRecord;
    use crate::storage::{MemoryStore, UsageRecord};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Completion service answering from a queue of scripted outcomes
    struct ScriptedService {
        outcomes: Mutex<VecDeque<Result<(String, u64, u64), CompletionError>>>,
    }

    impl ScriptedService {
        fn new(
            outcomes: Vec<Result<(String, u64, u64), CompletionError>>,
        ) -> Arc<dyn CompletionService> {
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
            continuation_token: Option<&str>,
            model_id: &str,
            conversation_id: &str,
        ) -> Result<CompletionReply, CompletionError> {
            let scripted = self
                .outcomes
                .lock()
                .expect("outcomes lock")
                .pop_front()
                .unwrap_or(Err(CompletionError::Unknown("unscripted call".into())));
            let (text, input_tokens, output_tokens) = scripted?;
            let timestamp = epoch_now();
            let id = uuid::Uuid::new_v4().to_string();
            Ok(CompletionReply {
                message: MessageRecord {
                    id: id.clone(),
                    conversation_id: conversation_id.to_string(),
                    text: format!("{text} (prev: {continuation_token:?})"),
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
                    duration_ms: 10.0,
                },
            })
        }
    }

    /// Store wrapper counting history reads, for cache-aside assertions
    struct CountingStore {
        inner: MemoryStore,
        messages_for_calls: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                messages_for_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DurableStore for CountingStore {
        async fn list_conversations(&self) -> crate::error::Result<Vec<ConversationRecord>> {
            self.inner.list_conversations().await
        }
        async fn insert_conversation(
            &self,
            record: &ConversationRecord,
        ) -> crate::error::Result<()> {
            self.inner.insert_conversation(record).await
        }
        async fn update_conversation(
            &self,
            record: &ConversationRecord,
        ) -> crate::error::Result<()> {
            self.inner.update_conversation(record).await
        }
        async fn delete_conversations(&self, ids: &[String]) -> crate::error::Result<()> {
            self.inner.delete_conversations(ids).await
        }
        async fn insert_messages(&self, messages: &[MessageRecord]) -> crate::error::Result<()> {
            self.inner.insert_messages(messages).await
        }
        async fn messages_for(
            &self,
            conversation_id: &str,
        ) -> crate::error::Result<Vec<MessageRecord>> {
            self.messages_for_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.messages_for(conversation_id).await
        }
        async fn most_recent_assistant_message(
            &self,
            conversation_id: &str,
        ) -> crate::error::Result<Option<MessageRecord>> {
            self.inner.most_recent_assistant_message(conversation_id).await
        }
        async fn insert_usage_records(
            &self,
            records: &[UsageRecord],
        ) -> crate::error::Result<()> {
            self.inner.insert_usage_records(records).await
        }
        async fn usage_for(
            &self,
            message_id: &str,
            conversation_id: &str,
        ) -> crate::error::Result<Option<UsageRecord>> {
            self.inner.usage_for(message_id, conversation_id).await
        }
        async fn usage_page_for_conversation(
            &self,
            conversation_id: &str,
            limit: usize,
            offset: usize,
        ) -> crate::error::Result<Vec<UsageRecord>> {
            self.inner
                .usage_page_for_conversation(conversation_id, limit, offset)
                .await
        }
        async fn usage_page_for_date(
            &self,
            date: NaiveDate,
            limit: usize,
            offset: usize,
        ) -> crate::error::Result<Vec<UsageRecord>> {
            self.inner.usage_page_for_date(date, limit, offset).await
        }
    }

    fn registry_with(service: Arc<dyn CompletionService>) -> Arc<ServiceRegistry> {
        let mut registry = ServiceRegistry::empty();
        registry.register("openai", service);
        Arc::new(registry)
    }

    fn request(input: &str, retry_attempt: u32) -> CompletionRequest {
        CompletionRequest {
            input: input.to_string(),
            conversation_id: "c1".to_string(),
            model: ProviderModel::openai("gpt-5-mini", "GPT 5 Mini"),
            retry_attempt,
        }
    }

    struct Fixture {
        orchestrator: MessageOrchestrator,
        cache: Arc<ConversationCache>,
        store: Arc<CountingStore>,
        chat_updates: broadcast::Receiver<ChatUpdate>,
        conversation_actions: broadcast::Receiver<ConversationAction>,
    }

    fn fixture(service: Arc<dyn CompletionService>) -> Fixture {
        let router = ActionRouter::default();
        let cache = Arc::new(ConversationCache::default());
        let store = Arc::new(CountingStore::new());
        let chat_updates = router.subscribe_chat_updates();
        let conversation_actions = router.subscribe_conversations();
        let orchestrator = MessageOrchestrator::new(
            router,
            Arc::clone(&cache),
            Arc::clone(&store) as Arc<dyn DurableStore>,
            registry_with(service),
            3,
        );
        Fixture {
            orchestrator,
            cache,
            store,
            chat_updates,
            conversation_actions,
        }
    }

    async fn seed_conversation(fixture: &Fixture, title: &str) {
        let record = ConversationRecord {
            id: "c1".to_string(),
            title: title.to_string(),
            last_activity: 1.0,
        };
        fixture.cache.upsert_conversation(record.clone());
        fixture
            .store
            .insert_conversation(&record)
            .await
            .expect("seed conversation");
    }

    #[tokio::test]
    async fn test_first_attempt_adds_user_message_once() {
        let mut fx = fixture(ScriptedService::new(vec![Ok(("hi there".into(), 1, 2))]));
        seed_conversation(&fx, "").await;

        fx.orchestrator
            .handle(ChatAction::RequestCompletion(request("hello", 0)))
            .await;

        let first = fx.chat_updates.recv().await.expect("update");
        assert!(matches!(first, ChatUpdate::UserMessageAdded { .. }));
        let second = fx.chat_updates.recv().await.expect("update");
        match second {
            ChatUpdate::ResponseArrived { messages, error, .. } => {
                assert_eq!(messages.len(), 1);
                assert!(error.is_none());
            }
            other => panic!("unexpected update: {other:?}"),
        }

        let stored = fx.store.inner.messages_for("c1").await.expect("messages");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, MessageRole::User);
        assert_eq!(stored[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_retry_does_not_resubmit_user_message() {
        let mut fx = fixture(ScriptedService::new(vec![Ok(("reply".into(), 1, 2))]));
        seed_conversation(&fx, "titled").await;

        fx.orchestrator
            .handle(ChatAction::RequestCompletion(request("hello", 1)))
            .await;

        let update = fx.chat_updates.recv().await.expect("update");
        assert!(matches!(update, ChatUpdate::ResponseArrived { .. }));
        let stored = fx.store.inner.messages_for("c1").await.expect("messages");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_title_set_to_first_35_characters() {
        let mut fx = fixture(ScriptedService::new(vec![
            Ok(("one".into(), 1, 2)),
            Ok(("two".into(), 1, 2)),
        ]));
        seed_conversation(&fx, "").await;

        let long_input = "abcdefghijklmnopqrstuvwxyz0123456789 and then some";
        fx.orchestrator
            .handle(ChatAction::RequestCompletion(request(long_input, 0)))
            .await;

        let expected: String = long_input.chars().take(35).collect();
        let cached = fx.cache.find_conversation("c1").expect("cached");
        assert_eq!(cached.title, expected);
        let stored = fx.store.list_conversations().await.expect("list");
        assert_eq!(stored[0].title, expected);

        // A second message never changes the title.
        fx.orchestrator
            .handle(ChatAction::RequestCompletion(request("different text", 0)))
            .await;
        let cached = fx.cache.find_conversation("c1").expect("cached");
        assert_eq!(cached.title, expected);

        // Drain so lagging never hides later assertions.
        while fx.chat_updates.try_recv().is_ok() {}
    }

    #[tokio::test]
    async fn test_retry_bound_downgrades_to_unknown() {
        let mut fx = fixture(ScriptedService::new(vec![Err(CompletionError::Retryable(
            "502".into(),
        ))]));
        seed_conversation(&fx, "titled").await;

        fx.orchestrator
            .handle(ChatAction::RequestCompletion(request("hello", 3)))
            .await;

        let update = fx.chat_updates.recv().await.expect("update");
        match update {
            ChatUpdate::ResponseArrived { messages, error, .. } => {
                assert!(messages.is_empty());
                let error = error.expect("error present");
                assert_eq!(error.kind, ChatErrorKind::Unknown);
                assert_eq!(error.original.retry_attempt, 3);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_classification_passes_through_below_bound() {
        let mut fx = fixture(ScriptedService::new(vec![Err(CompletionError::Retryable(
            "503".into(),
        ))]));
        seed_conversation(&fx, "titled").await;

        fx.orchestrator
            .handle(ChatAction::RequestCompletion(request("hello", 1)))
            .await;

        let update = fx.chat_updates.recv().await.expect("update");
        match update {
            ChatUpdate::ResponseArrived { error, .. } => {
                assert_eq!(error.expect("error").kind, ChatErrorKind::Retryable);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_access_denied_classification() {
        let mut fx = fixture(ScriptedService::new(vec![Err(
            CompletionError::AccessDenied("401".into()),
        )]));
        seed_conversation(&fx, "titled").await;

        fx.orchestrator
            .handle(ChatAction::RequestCompletion(request("hello", 0)))
            .await;

        // Skip the user-message event, then inspect the terminal result.
        let _ = fx.chat_updates.recv().await.expect("user message");
        let update = fx.chat_updates.recv().await.expect("update");
        match update {
            ChatUpdate::ResponseArrived { error, .. } => {
                assert_eq!(error.expect("error").kind, ChatErrorKind::AccessDenied);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_continuation_token_from_most_recent_assistant() {
        let mut fx = fixture(ScriptedService::new(vec![Ok(("reply".into(), 1, 2))]));
        seed_conversation(&fx, "titled").await;
        fx.store
            .insert_messages(&[MessageRecord {
                id: "a1".into(),
                conversation_id: "c1".into(),
                text: "earlier".into(),
                timestamp: 5.0,
                role: MessageRole::Assistant,
                continuation_token: Some("resp_prev".into()),
                model_id: "gpt-5-mini".into(),
                model_provider_id: "openai".into(),
            }])
            .await
            .expect("seed assistant");

        fx.orchestrator
            .handle(ChatAction::RequestCompletion(request("hello", 1)))
            .await;

        let update = fx.chat_updates.recv().await.expect("update");
        match update {
            ChatUpdate::ResponseArrived { messages, .. } => {
                assert!(messages[0].text.contains("resp_prev"));
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_triggers_conversation_list_refresh() {
        let mut fx = fixture(ScriptedService::new(vec![Ok(("reply".into(), 1, 2))]));
        seed_conversation(&fx, "titled").await;

        fx.orchestrator
            .handle(ChatAction::RequestCompletion(request("hello", 0)))
            .await;

        // One refresh for the user message, one for the response.
        assert!(matches!(
            fx.conversation_actions.recv().await.expect("refresh"),
            ConversationAction::List
        ));
        assert!(matches!(
            fx.conversation_actions.recv().await.expect("refresh"),
            ConversationAction::List
        ));
    }

    #[tokio::test]
    async fn test_success_persists_usage_record() {
        let mut fx = fixture(ScriptedService::new(vec![Ok(("reply".into(), 7, 9))]));
        seed_conversation(&fx, "titled").await;

        fx.orchestrator
            .handle(ChatAction::RequestCompletion(request("hello", 1)))
            .await;

        let update = fx.chat_updates.recv().await.expect("update");
        let message_id = match update {
            ChatUpdate::ResponseArrived { messages, .. } => messages[0].id.clone(),
            other => panic!("unexpected update: {other:?}"),
        };
        let usage = fx
            .store
            .usage_for(&message_id, "c1")
            .await
            .expect("query")
            .expect("usage present");
        assert_eq!(usage.input_tokens, 7);
        assert_eq!(usage.output_tokens, 9);
    }

    #[tokio::test]
    async fn test_fetch_history_backfills_cache() {
        let mut fx = fixture(ScriptedService::new(vec![]));
        fx.store
            .insert_messages(&[MessageRecord {
                id: "m1".into(),
                conversation_id: "c1".into(),
                text: "stored".into(),
                timestamp: 5.0,
                role: MessageRole::User,
                continuation_token: None,
                model_id: "gpt-5-mini".into(),
                model_provider_id: "openai".into(),
            }])
            .await
            .expect("seed");

        fx.orchestrator
            .handle(ChatAction::FetchHistory {
                conversation_id: "c1".to_string(),
            })
            .await;
        fx.orchestrator
            .handle(ChatAction::FetchHistory {
                conversation_id: "c1".to_string(),
            })
            .await;

        // Second fetch is served from cache without consulting the store.
        assert_eq!(fx.store.messages_for_calls.load(Ordering::SeqCst), 1);
        for _ in 0..2 {
            match fx.chat_updates.recv().await.expect("update") {
                ChatUpdate::HistoryLoaded { messages, .. } => {
                    assert_eq!(messages.len(), 1);
                }
                other => panic!("unexpected update: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_history_publishes_empty_list() {
        let mut fx = fixture(ScriptedService::new(vec![]));

        fx.orchestrator
            .handle(ChatAction::FetchHistory {
                conversation_id: "empty".to_string(),
            })
            .await;

        match fx.chat_updates.recv().await.expect("update") {
            ChatUpdate::HistoryLoaded { messages, .. } => assert!(messages.is_empty()),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_provider_yields_unknown_error() {
        let mut fx = fixture(ScriptedService::new(vec![]));
        seed_conversation(&fx, "titled").await;

        let mut bad_request = request("hello", 1);
        bad_request.model.model_provider_id = "acme".to_string();
        fx.orchestrator
            .handle(ChatAction::RequestCompletion(bad_request))
            .await;

        match fx.chat_updates.recv().await.expect("update") {
            ChatUpdate::ResponseArrived { error, .. } => {
                assert_eq!(error.expect("error").kind, ChatErrorKind::Unknown);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }
}

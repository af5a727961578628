//! Engine wiring
//!
//! Builds the synchronization core from explicit parts — cache, durable
//! store, service registry, settings store, router — and spawns the four
//! orchestrator tasks. There is no global instance; embedders construct an
//! engine and tests wire their own fakes.

use crate::actions::Action;
use crate::cache::ConversationCache;
use crate::config::Config;
use crate::dispatch::ActionRouter;
use crate::error::Result;
use crate::orchestrator::{
    ConversationOrchestrator, MessageOrchestrator, SettingsOrchestrator, UsageAggregator,
};
use crate::providers::ServiceRegistry;
use crate::settings::SettingsStore;
use crate::storage::{DurableStore, SqliteStorage};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// The assembled synchronization core
pub struct SyncEngine {
    config: Config,
    router: ActionRouter,
    cache: Arc<ConversationCache>,
    store: Arc<dyn DurableStore>,
    services: Arc<ServiceRegistry>,
    settings: Arc<SettingsStore>,
}

impl SyncEngine {
    /// Assemble an engine from explicit collaborators
    pub fn new(
        config: Config,
        store: Arc<dyn DurableStore>,
        services: Arc<ServiceRegistry>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        let router = ActionRouter::new(config.sync.channel_capacity);
        let cache = Arc::new(ConversationCache::new(config.sync.usage_totals_capacity));
        Self {
            config,
            router,
            cache,
            store,
            services,
            settings,
        }
    }

    /// Assemble an engine with the production collaborators
    ///
    /// SQLite storage in the user's data directory, the configured
    /// completion providers, and the persisted settings store.
    pub fn with_defaults(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStorage::new()?);
        let services = Arc::new(ServiceRegistry::from_config(&config.provider)?);
        let settings = Arc::new(SettingsStore::new()?);
        Ok(Self::new(config, store, services, settings))
    }

    pub fn router(&self) -> &ActionRouter {
        &self.router
    }

    pub fn cache(&self) -> &Arc<ConversationCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    /// Dispatch an action into the core
    pub fn dispatch(&self, action: Action) {
        self.router.dispatch(action);
    }

    /// Spawn the orchestrator tasks on the current tokio runtime
    ///
    /// Each orchestrator serializes its own category, which gives FIFO
    /// result ordering per conversation. The returned handles finish when
    /// the engine (and with it every sender) is dropped.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        let messages = MessageOrchestrator::new(
            self.router.clone(),
            Arc::clone(&self.cache),
            Arc::clone(&self.store),
            Arc::clone(&self.services),
            self.config.sync.max_retry_attempts,
        );
        let conversations = ConversationOrchestrator::new(
            self.router.clone(),
            Arc::clone(&self.cache),
            Arc::clone(&self.store),
        );
        let usage = UsageAggregator::new(
            self.router.clone(),
            Arc::clone(&self.cache),
            Arc::clone(&self.store),
            self.config.sync.usage_page_limit,
        );
        let settings =
            SettingsOrchestrator::new(self.router.clone(), Arc::clone(&self.settings));

        vec![
            tokio::spawn(messages.run(self.router.subscribe_chat())),
            tokio::spawn(conversations.run(self.router.subscribe_conversations())),
            tokio::spawn(usage.run(self.router.subscribe_usage())),
            tokio::spawn(settings.run(self.router.subscribe_settings())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ConversationAction, ConversationUpdate};
    use crate::storage::MemoryStore;

    fn test_engine() -> SyncEngine {
        SyncEngine::new(
            Config::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(ServiceRegistry::empty()),
            Arc::new(SettingsStore::in_memory()),
        )
    }

    #[tokio::test]
    async fn test_spawned_engine_answers_list_action() {
        let engine = test_engine();
        let mut updates = engine.router().subscribe_conversation_updates();
        let handles = engine.spawn();

        engine.dispatch(Action::Conversation(ConversationAction::List));

        match updates.recv().await.expect("update") {
            ConversationUpdate::ListLoaded(list) => assert!(list.is_empty()),
            other => panic!("unexpected update: {other:?}"),
        }

        for handle in handles {
            handle.abort();
        }
    }
}

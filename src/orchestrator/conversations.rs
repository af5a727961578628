//! Conversation lifecycle orchestration
//!
//! Cache-aside reads of the conversation list and write-through mutations
//! (create, delete, rename). Mutations touch the cache first, then the
//! store; a crash between the two leaves the cache as the more complete
//! view and the next reload reconciles from the store.

use crate::actions::{Action, ConversationAction, ConversationUpdate};
use crate::cache::ConversationCache;
use crate::dispatch::ActionRouter;
use crate::storage::types::ConversationRecord;
use crate::storage::{epoch_now, DurableStore};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Coordinates cache and store for the conversation list
pub struct ConversationOrchestrator {
    router: ActionRouter,
    cache: Arc<ConversationCache>,
    store: Arc<dyn DurableStore>,
}

impl ConversationOrchestrator {
    pub fn new(
        router: ActionRouter,
        cache: Arc<ConversationCache>,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        Self {
            router,
            cache,
            store,
        }
    }

    /// Consume conversation actions until the channel closes
    pub async fn run(self, mut actions: broadcast::Receiver<ConversationAction>) {
        loop {
            match actions.recv().await {
                Ok(action) => self.handle(action).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("conversation action subscriber lagged, skipped {skipped}");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Handle a single conversation action
    pub async fn handle(&self, action: ConversationAction) {
        match action {
            ConversationAction::List => self.publish_list().await,
            ConversationAction::Create(record) => self.create(record).await,
            ConversationAction::Delete(records) => self.delete(records).await,
            ConversationAction::Rename(record) => self.rename(record).await,
        }
    }

    /// Cache-aside list read; the list is the unit of caching
    async fn publish_list(&self) {
        let cached = self.cache.list_conversations();
        let conversations = if cached.is_empty() {
            match self.store.list_conversations().await {
                Ok(stored) => {
                    if !stored.is_empty() {
                        self.cache.replace_conversation_list(stored.clone());
                    }
                    stored
                }
                Err(e) => {
                    tracing::error!("failed to load conversation list: {e}");
                    Vec::new()
                }
            }
        } else {
            cached
        };

        self.router.dispatch(Action::ConversationUpdate(
            ConversationUpdate::ListLoaded(conversations),
        ));
    }

    async fn create(&self, record: ConversationRecord) {
        self.cache.upsert_conversation(record.clone());
        if let Err(e) = self.store.insert_conversation(&record).await {
            tracing::error!("failed to persist new conversation: {e}");
        }
        self.router
            .dispatch(Action::ConversationUpdate(ConversationUpdate::Created(
                record,
            )));
        self.publish_list().await;
    }

    async fn delete(&self, records: Vec<ConversationRecord>) {
        let ids: Vec<String> = records.into_iter().map(|record| record.id).collect();
        self.cache.remove_conversations(&ids);
        if let Err(e) = self.store.delete_conversations(&ids).await {
            tracing::error!("failed to delete conversations: {e}");
        }
        self.publish_list().await;
    }

    /// Rename edits title and activity in place; the cached list keeps its
    /// insertion order, so the conversation only moves up on the next full
    /// reload from the store.
    async fn rename(&self, record: ConversationRecord) {
        let mut record = record;
        record.last_activity = epoch_now();
        self.cache.edit_conversation(&record);
        if let Err(e) = self.store.update_conversation(&record).await {
            tracing::error!("failed to persist rename: {e}");
        }
        self.publish_list().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    struct Fixture {
        orchestrator: ConversationOrchestrator,
        cache: Arc<ConversationCache>,
        store: Arc<MemoryStore>,
        updates: broadcast::Receiver<ConversationUpdate>,
    }

    fn fixture() -> Fixture {
        let router = ActionRouter::default();
        let cache = Arc::new(ConversationCache::default());
        let store = Arc::new(MemoryStore::new());
        let updates = router.subscribe_conversation_updates();
        let orchestrator = ConversationOrchestrator::new(
            router,
            Arc::clone(&cache),
            Arc::clone(&store) as Arc<dyn DurableStore>,
        );
        Fixture {
            orchestrator,
            cache,
            store,
            updates,
        }
    }

    fn conversation(id: &str, title: &str, last_activity: f64) -> ConversationRecord {
        ConversationRecord {
            id: id.to_string(),
            title: title.to_string(),
            last_activity,
        }
    }

    async fn next_list(updates: &mut broadcast::Receiver<ConversationUpdate>) -> Vec<ConversationRecord> {
        loop {
            match updates.recv().await.expect("update") {
                ConversationUpdate::ListLoaded(list) => return list,
                ConversationUpdate::Created(_) => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_list_falls_through_to_store_and_backfills() {
        let mut fx = fixture();
        fx.store
            .insert_conversation(&conversation("c1", "stored", 100.0))
            .await
            .expect("seed");

        fx.orchestrator.handle(ConversationAction::List).await;

        let list = next_list(&mut fx.updates).await;
        assert_eq!(list.len(), 1);
        assert_eq!(fx.cache.list_conversations().len(), 1);
    }

    #[tokio::test]
    async fn test_list_publishes_empty_when_both_tiers_empty() {
        let mut fx = fixture();
        fx.orchestrator.handle(ConversationAction::List).await;
        assert!(next_list(&mut fx.updates).await.is_empty());
    }

    #[tokio::test]
    async fn test_create_writes_both_tiers_and_refreshes() {
        let mut fx = fixture();
        fx.orchestrator
            .handle(ConversationAction::Create(conversation("c1", "", 100.0)))
            .await;

        match fx.updates.recv().await.expect("update") {
            ConversationUpdate::Created(record) => assert_eq!(record.id, "c1"),
            other => panic!("unexpected update: {other:?}"),
        }
        let list = next_list(&mut fx.updates).await;
        assert_eq!(list.len(), 1);
        assert_eq!(fx.store.list_conversations().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_and_refreshes() {
        let mut fx = fixture();
        let record = conversation("c1", "t", 100.0);
        fx.cache.upsert_conversation(record.clone());
        fx.store
            .insert_conversation(&record)
            .await
            .expect("seed");

        fx.orchestrator
            .handle(ConversationAction::Delete(vec![record]))
            .await;

        assert!(next_list(&mut fx.updates).await.is_empty());
        assert!(fx.store.list_conversations().await.expect("list").is_empty());
        assert!(fx.cache.list_conversations().is_empty());
    }

    #[tokio::test]
    async fn test_rename_updates_title_without_reordering_cache() {
        let mut fx = fixture();
        // c2 was inserted later, so it sits at the front of the cache.
        fx.cache.upsert_conversation(conversation("c1", "old title", 100.0));
        fx.cache.upsert_conversation(conversation("c2", "other", 200.0));
        fx.store
            .insert_conversation(&conversation("c1", "old title", 100.0))
            .await
            .expect("seed");
        fx.store
            .insert_conversation(&conversation("c2", "other", 200.0))
            .await
            .expect("seed");

        fx.orchestrator
            .handle(ConversationAction::Rename(conversation(
                "c1", "new title", 100.0,
            )))
            .await;

        let list = next_list(&mut fx.updates).await;
        // Title visible, position unchanged until the next full reload.
        assert_eq!(list[0].id, "c2");
        assert_eq!(list[1].id, "c1");
        assert_eq!(list[1].title, "new title");

        // A reload from the store reorders by recency.
        fx.cache.replace_conversation_list(Vec::new());
        fx.orchestrator.handle(ConversationAction::List).await;
        let reloaded = next_list(&mut fx.updates).await;
        assert_eq!(reloaded[0].id, "c1");
    }
}

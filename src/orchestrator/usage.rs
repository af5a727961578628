//! Usage aggregation
//!
//! Answers raw usage queries (by message, by conversation page, by date
//! page) and computes token totals as an incremental reduce: pages are
//! read from the store at a fixed size, a running total is published after
//! every page so consumers can render progressively, and the final total
//! is memoized in the scoped LRU cache.

use crate::actions::{Action, UsageAction, UsageUpdate};
use crate::cache::ConversationCache;
use crate::dispatch::ActionRouter;
use crate::storage::types::{UsageRecord, UsageScope, UsageTotals};
use crate::storage::DurableStore;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Computes and publishes usage statistics
pub struct UsageAggregator {
    router: ActionRouter,
    cache: Arc<ConversationCache>,
    store: Arc<dyn DurableStore>,
    page_limit: usize,
}

impl UsageAggregator {
    pub fn new(
        router: ActionRouter,
        cache: Arc<ConversationCache>,
        store: Arc<dyn DurableStore>,
        page_limit: usize,
    ) -> Self {
        Self {
            router,
            cache,
            store,
            page_limit: page_limit.max(1),
        }
    }

    /// Consume usage actions until the channel closes
    pub async fn run(self, mut actions: broadcast::Receiver<UsageAction>) {
        loop {
            match actions.recv().await {
                Ok(action) => self.handle(action).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("usage action subscriber lagged, skipped {skipped}");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Handle a single usage action
    pub async fn handle(&self, action: UsageAction) {
        match action.clone() {
            UsageAction::ByMessage {
                message_id,
                conversation_id,
            } => {
                let records = match self.store.usage_for(&message_id, &conversation_id).await {
                    Ok(record) => record.into_iter().collect(),
                    Err(e) => {
                        tracing::error!("failed to load usage for message: {e}");
                        Vec::new()
                    }
                };
                self.publish_records(records, action);
            }
            UsageAction::ByConversation {
                conversation_id,
                limit,
                offset,
            } => {
                let records = match self
                    .store
                    .usage_page_for_conversation(&conversation_id, limit, offset)
                    .await
                {
                    Ok(records) => records,
                    Err(e) => {
                        tracing::error!("failed to load usage page: {e}");
                        Vec::new()
                    }
                };
                self.publish_records(records, action);
            }
            UsageAction::ByDate {
                date,
                limit,
                offset,
            } => {
                let records = match self.store.usage_page_for_date(date, limit, offset).await {
                    Ok(records) => records,
                    Err(e) => {
                        tracing::error!("failed to load usage page: {e}");
                        Vec::new()
                    }
                };
                self.publish_records(records, action);
            }
            UsageAction::Total { scope } => self.aggregate_total(scope).await,
        }
    }

    fn publish_records(&self, records: Vec<UsageRecord>, original: UsageAction) {
        self.router
            .dispatch(Action::UsageUpdate(UsageUpdate::Records {
                records,
                original,
            }));
    }

    /// Incremental reduce with observable partial results
    ///
    /// Running sums are monotonically increasing and the final published
    /// total equals the sum over all pages. Only the finished total is
    /// cached.
    async fn aggregate_total(&self, scope: UsageScope) {
        let cached = match &scope {
            UsageScope::Conversation(id) => self.cache.usage_total_for_conversation(id),
            UsageScope::Date(date) => self.cache.usage_total_for_date(*date),
        };
        if let Some(totals) = cached {
            self.router.dispatch(Action::UsageUpdate(UsageUpdate::Total {
                totals,
                finished: true,
            }));
            return;
        }

        let mut totals = UsageTotals::empty(scope.clone());
        let mut offset = 0usize;
        loop {
            let page = match self.fetch_page(&scope, offset).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!("usage aggregation aborted: {e}");
                    // Surface what was summed so far; do not memoize it.
                    self.router.dispatch(Action::UsageUpdate(UsageUpdate::Total {
                        totals,
                        finished: true,
                    }));
                    return;
                }
            };

            let finished = page.len() < self.page_limit;
            for record in &page {
                totals.accumulate(record);
            }
            self.router.dispatch(Action::UsageUpdate(UsageUpdate::Total {
                totals: totals.clone(),
                finished,
            }));

            if finished {
                match &scope {
                    UsageScope::Conversation(id) => {
                        self.cache.set_usage_total_for_conversation(id, totals)
                    }
                    UsageScope::Date(date) => self.cache.set_usage_total_for_date(*date, totals),
                }
                return;
            }
            offset += page.len();
        }
    }

    async fn fetch_page(
        &self,
        scope: &UsageScope,
        offset: usize,
    ) -> crate::error::Result<Vec<UsageRecord>> {
        match scope {
            UsageScope::Conversation(id) => {
                self.store
                    .usage_page_for_conversation(id, self.page_limit, offset)
                    .await
            }
            UsageScope::Date(date) => {
                self.store
                    .usage_page_for_date(*date, self.page_limit, offset)
                    .await
            }
        }
    }
}

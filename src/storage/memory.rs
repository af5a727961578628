//! In-memory durable store
//!
//! A complete `DurableStore` implementation over locked maps. Tests use it
//! to observe exact store contents without a database file; embedders can
//! use it for ephemeral sessions.

use crate::error::Result;
use crate::storage::types::{ConversationRecord, MessageRecord, MessageRole, UsageRecord};
use crate::storage::{day_bounds, DurableStore};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MemoryInner {
    conversations: Vec<ConversationRecord>,
    messages: HashMap<String, Vec<MessageRecord>>,
    usage: Vec<UsageRecord>,
}

/// Durable store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>> {
        let inner = self.inner();
        let mut conversations = inner.conversations.clone();
        conversations.sort_by(|a, b| b.last_activity.total_cmp(&a.last_activity));
        Ok(conversations)
    }

    async fn insert_conversation(&self, record: &ConversationRecord) -> Result<()> {
        self.inner().conversations.push(record.clone());
        Ok(())
    }

    async fn update_conversation(&self, record: &ConversationRecord) -> Result<()> {
        let mut inner = self.inner();
        if let Some(existing) = inner
            .conversations
            .iter_mut()
            .find(|existing| existing.id == record.id)
        {
            existing.title = record.title.clone();
            existing.last_activity = record.last_activity;
        }
        Ok(())
    }

    async fn delete_conversations(&self, conversation_ids: &[String]) -> Result<()> {
        let mut inner = self.inner();
        inner
            .conversations
            .retain(|record| !conversation_ids.contains(&record.id));
        for id in conversation_ids {
            inner.messages.remove(id);
        }
        inner
            .usage
            .retain(|record| !conversation_ids.contains(&record.conversation_id));
        Ok(())
    }

    async fn insert_messages(&self, messages: &[MessageRecord]) -> Result<()> {
        let mut inner = self.inner();
        for message in messages {
            inner
                .messages
                .entry(message.conversation_id.clone())
                .or_default()
                .push(message.clone());
        }
        Ok(())
    }

    async fn messages_for(&self, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        let inner = self.inner();
        let mut messages = inner
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(messages)
    }

    async fn most_recent_assistant_message(
        &self,
        conversation_id: &str,
    ) -> Result<Option<MessageRecord>> {
        let messages = self.messages_for(conversation_id).await?;
        Ok(messages
            .into_iter()
            .rev()
            .find(|message| message.role == MessageRole::Assistant))
    }

    async fn insert_usage_records(&self, records: &[UsageRecord]) -> Result<()> {
        self.inner().usage.extend(records.iter().cloned());
        Ok(())
    }

    async fn usage_for(
        &self,
        message_id: &str,
        conversation_id: &str,
    ) -> Result<Option<UsageRecord>> {
        let inner = self.inner();
        Ok(inner
            .usage
            .iter()
            .find(|record| {
                record.message_id == message_id && record.conversation_id == conversation_id
            })
            .cloned())
    }

    async fn usage_page_for_conversation(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageRecord>> {
        let inner = self.inner();
        let mut matching: Vec<UsageRecord> = inner
            .usage
            .iter()
            .filter(|record| record.conversation_id == conversation_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn usage_page_for_date(
        &self,
        date: NaiveDate,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageRecord>> {
        let (start, end) = day_bounds(date);
        let inner = self.inner();
        let mut matching: Vec<UsageRecord> = inner
            .usage
            .iter()
            .filter(|record| record.timestamp >= start && record.timestamp < end)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, role: MessageRole, timestamp: f64) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            text: "text".to_string(),
            timestamp,
            role,
            continuation_token: None,
            model_id: "gpt-5-mini".to_string(),
            model_provider_id: "openai".to_string(),
        }
    }

    #[tokio::test]
    async fn test_list_orders_by_recency() {
        let store = MemoryStore::new();
        store
            .insert_conversation(&ConversationRecord {
                id: "c1".into(),
                title: "older".into(),
                last_activity: 100.0,
            })
            .await
            .expect("insert");
        store
            .insert_conversation(&ConversationRecord {
                id: "c2".into(),
                title: "newer".into(),
                last_activity: 200.0,
            })
            .await
            .expect("insert");

        let list = store.list_conversations().await.expect("list");
        assert_eq!(list[0].id, "c2");
    }

    #[tokio::test]
    async fn test_most_recent_assistant_skips_user_messages() {
        let store = MemoryStore::new();
        store
            .insert_messages(&[
                message("m1", MessageRole::Assistant, 10.0),
                message("m2", MessageRole::User, 20.0),
            ])
            .await
            .expect("insert");

        let latest = store
            .most_recent_assistant_message("c1")
            .await
            .expect("query")
            .expect("present");
        assert_eq!(latest.id, "m1");
    }

    #[tokio::test]
    async fn test_delete_cascades_usage() {
        let store = MemoryStore::new();
        store
            .insert_usage_records(&[UsageRecord {
                id: "u1".into(),
                conversation_id: "c1".into(),
                message_id: "m1".into(),
                model_id: "gpt-5-mini".into(),
                model_provider_id: "openai".into(),
                input_tokens: 1,
                output_tokens: 2,
                timestamp: 5.0,
                duration_ms: 10.0,
            }])
            .await
            .expect("insert");

        store
            .delete_conversations(&["c1".to_string()])
            .await
            .expect("delete");
        assert!(store
            .usage_page_for_conversation("c1", 10, 0)
            .await
            .expect("page")
            .is_empty());
    }
}

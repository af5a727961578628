//! Process-local caches
//!
//! `ConversationCache` is the fast tier of the cache-aside protocol: it
//! holds the conversation list, per-conversation message lists, and the
//! memoized usage totals. All access goes through a single mutex so that
//! read-modify-write sequences (upsert, remove, append) never interleave.

pub mod lru;

pub use lru::{BoundedLruCache, DEFAULT_LRU_CAPACITY};

use crate::storage::types::{ConversationRecord, MessageRecord, UsageTotals};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct CacheInner {
    /// Most-recent-first by insertion position, not by timestamp. A rename
    /// moves the conversation to the front here while the durable list
    /// stays ordered by last_activity until the next full reload.
    conversations: Vec<ConversationRecord>,
    messages: HashMap<String, Vec<MessageRecord>>,
    conversation_totals: BoundedLruCache<String, UsageTotals>,
    date_totals: BoundedLruCache<NaiveDate, UsageTotals>,
}

/// Serialized-access cache for conversations, messages, and usage totals
///
/// An empty conversation list is indistinguishable from "not yet loaded";
/// callers fall through to the durable store on empty and backfill.
///
/// Cached "finished" usage totals are never invalidated when later
/// completions add usage records; the only eviction is LRU capacity
/// pressure, so a finished total can go stale.
pub struct ConversationCache {
    inner: Mutex<CacheInner>,
}

impl ConversationCache {
    /// Create an empty cache with the given usage-totals capacity per scope
    pub fn new(usage_totals_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                conversations: Vec::new(),
                messages: HashMap::new(),
                conversation_totals: BoundedLruCache::new(usage_totals_capacity),
                date_totals: BoundedLruCache::new(usage_totals_capacity),
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the cached conversation list, most recent first
    pub fn list_conversations(&self) -> Vec<ConversationRecord> {
        self.inner().conversations.clone()
    }

    /// Replace the entire cached conversation list
    pub fn replace_conversation_list(&self, conversations: Vec<ConversationRecord>) {
        self.inner().conversations = conversations;
    }

    /// Find a cached conversation by id
    pub fn find_conversation(&self, conversation_id: &str) -> Option<ConversationRecord> {
        self.inner()
            .conversations
            .iter()
            .find(|record| record.id == conversation_id)
            .cloned()
    }

    /// Insert or replace a conversation at the front of the list
    pub fn upsert_conversation(&self, record: ConversationRecord) {
        let mut inner = self.inner();
        inner.conversations.retain(|existing| existing.id != record.id);
        inner.conversations.insert(0, record);
    }

    /// Update a conversation in place, preserving its list position
    ///
    /// Used by rename: the title change becomes visible immediately but
    /// the conversation keeps its insertion-order slot until the next full
    /// reload from the store.
    pub fn edit_conversation(&self, record: &ConversationRecord) {
        let mut inner = self.inner();
        if let Some(existing) = inner
            .conversations
            .iter_mut()
            .find(|existing| existing.id == record.id)
        {
            existing.title = record.title.clone();
            existing.last_activity = record.last_activity;
        }
    }

    /// Remove conversations and purge their cached messages
    ///
    /// Messages cannot outlive their conversation in cache.
    pub fn remove_conversations(&self, conversation_ids: &[String]) {
        let mut inner = self.inner();
        for id in conversation_ids {
            inner.messages.remove(id);
        }
        inner
            .conversations
            .retain(|record| !conversation_ids.iter().any(|id| id == &record.id));
    }

    /// Append messages to a conversation's cached list, creating it if absent
    pub fn append_messages(&self, conversation_id: &str, messages: Vec<MessageRecord>) {
        self.inner()
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .extend(messages);
    }

    /// Cached messages for a conversation, ascending by timestamp
    ///
    /// The sort is defensive: historical pages may be appended out of order.
    pub fn messages_for(&self, conversation_id: &str) -> Vec<MessageRecord> {
        let inner = self.inner();
        let mut messages = inner
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        messages
    }

    /// Memoized finished totals for a conversation, if still cached
    pub fn usage_total_for_conversation(&self, conversation_id: &str) -> Option<UsageTotals> {
        self.inner()
            .conversation_totals
            .get(&conversation_id.to_string())
            .cloned()
    }

    /// Memoize finished totals for a conversation
    pub fn set_usage_total_for_conversation(&self, conversation_id: &str, totals: UsageTotals) {
        self.inner()
            .conversation_totals
            .insert(conversation_id.to_string(), totals);
    }

    /// Memoized finished totals for a calendar date, if still cached
    pub fn usage_total_for_date(&self, date: NaiveDate) -> Option<UsageTotals> {
        self.inner().date_totals.get(&date).cloned()
    }

    /// Memoize finished totals for a calendar date
    pub fn set_usage_total_for_date(&self, date: NaiveDate, totals: UsageTotals) {
        self.inner().date_totals.insert(date, totals);
    }
}

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new(DEFAULT_LRU_CAPACITY)
    }
}

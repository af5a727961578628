//! Per-conversation timeline state
//!
//! `ChatTimeline` is the presentation-adjacent state machine that owns the
//! ordered item sequence for one conversation. It feeds arriving results
//! through the merger, keeps at most one pending system notice (loading or
//! error), and produces the resubmission request when the user retries.

use crate::actions::{ChatError, ChatErrorKind, CompletionRequest};
use crate::storage::types::MessageRecord;
use crate::timeline::{interleave, merge, DateSeparator, MergeOutcome, NoticeKind, SystemNotice, TimelineItem};
use chrono::{DateTime, Local};

/// How the item sequence changed, so a renderer can animate accordingly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineUpdate {
    Appended,
    Inserted,
}

/// Ordered timeline for a single conversation
pub struct ChatTimeline {
    conversation_id: String,
    items: Vec<TimelineItem>,
    is_loading: bool,
    loading_notice_id: String,
    error_notice_id: String,
}

impl ChatTimeline {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            items: Vec::new(),
            is_loading: false,
            loading_notice_id: uuid::Uuid::new_v4().to_string(),
            error_notice_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn items(&self) -> &[TimelineItem] {
        &self.items
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Incorporate the provisional user message and show the loading notice
    pub fn user_message_added(
        &mut self,
        message: &MessageRecord,
        now: DateTime<Local>,
    ) -> TimelineUpdate {
        self.remove_notices();
        let anchor = self.last_separator();
        let merged = interleave(std::slice::from_ref(message), anchor.as_ref(), now);
        self.items.extend(merged);
        self.push_loading_notice();
        self.is_loading = true;
        TimelineUpdate::Appended
    }

    /// Incorporate a terminal chat result (new messages or an error)
    ///
    /// Any pending notice is cleared first; an error result then appends
    /// its own notice, so at most one is ever visible.
    pub fn response_arrived(
        &mut self,
        messages: &[MessageRecord],
        error: Option<&ChatError>,
        now: DateTime<Local>,
    ) -> TimelineUpdate {
        self.is_loading = false;
        self.remove_notices();

        if let Some(error) = error {
            self.items.push(TimelineItem::Notice(self.notice_for(error)));
            return TimelineUpdate::Appended;
        }

        match merge(&mut self.items, messages, now) {
            MergeOutcome::Appended => TimelineUpdate::Appended,
            MergeOutcome::Prepended => TimelineUpdate::Inserted,
        }
    }

    /// Produce the resubmission for a retryable error notice
    ///
    /// Swaps the error notice for the loading notice and returns the
    /// original request with its retry counter bumped. Returns `None` when
    /// the pending notice carries no retry affordance.
    pub fn retry(&mut self) -> Option<CompletionRequest> {
        let request = self.items.iter().find_map(|item| match item {
            TimelineItem::Notice(notice) if notice.kind == NoticeKind::RetryableError => {
                notice.retry.clone()
            }
            _ => None,
        })?;
        self.remove_notices();
        self.push_loading_notice();
        self.is_loading = true;
        let mut resubmission = request;
        resubmission.retry_attempt += 1;
        Some(resubmission)
    }

    fn notice_for(&self, error: &ChatError) -> SystemNotice {
        match error.kind {
            ChatErrorKind::AccessDenied => SystemNotice {
                id: self.error_notice_id.clone(),
                texts: vec!["Access denied: please check your API key".to_string()],
                kind: NoticeKind::Error,
                retry: None,
            },
            ChatErrorKind::Retryable => SystemNotice {
                id: self.error_notice_id.clone(),
                texts: vec!["Oops something went wrong".to_string()],
                kind: NoticeKind::RetryableError,
                retry: Some(error.original.clone()),
            },
            ChatErrorKind::Unknown => SystemNotice {
                id: self.error_notice_id.clone(),
                texts: vec!["Oops something went wrong".to_string()],
                kind: NoticeKind::Error,
                retry: None,
            },
        }
    }

    fn push_loading_notice(&mut self) {
        self.items.push(TimelineItem::Notice(SystemNotice {
            id: self.loading_notice_id.clone(),
            texts: vec!["Thinking...".to_string(), "Searching...".to_string()],
            kind: NoticeKind::Loading,
            retry: None,
        }));
    }

    fn remove_notices(&mut self) {
        self.items
            .retain(|item| !matches!(item, TimelineItem::Notice(_)));
    }

    fn last_separator(&self) -> Option<DateSeparator> {
        self.items
            .iter()
            .rev()
            .find_map(|item| match item {
                TimelineItem::DateSeparator(separator) => Some(separator.clone()),
                _ => None,
            })
    }
}

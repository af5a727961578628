//! Timeline items and the merge algorithm
//!
//! A rendered conversation is a flat, timestamp-ascending sequence of
//! messages, date separators, and ephemeral system notices. The merger
//! incorporates a contiguous sorted batch of messages into an existing
//! sequence, deciding prepend versus append and inserting date separators
//! without duplicating the one adjacent to the insertion point.

pub mod controller;
pub mod dates;

pub use controller::{ChatTimeline, TimelineUpdate};
pub use dates::{local_datetime, short_relative_date};

use crate::actions::CompletionRequest;
use crate::storage::types::MessageRecord;
use chrono::{DateTime, Local};

/// Marks the start of a day bucket in the timeline
///
/// Carries a timestamp representative of its bucket, not a label; the
/// label is derived at render time so it stays correct as "today" ages.
#[derive(Debug, Clone, PartialEq)]
pub struct DateSeparator {
    pub id: String,
    pub timestamp: f64,
}

impl DateSeparator {
    /// Separator representing the bucket containing `timestamp`
    pub fn for_timestamp(timestamp: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
        }
    }
}

/// Kind of ephemeral notice shown inside the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// A completion request is in flight
    Loading,
    /// Terminal failure with no retry affordance
    Error,
    /// Terminal failure the user may resubmit
    RetryableError,
}

/// Ephemeral timeline entry (loading indicator, error banner)
///
/// Never persisted; at most one is pending at a time.
#[derive(Debug, Clone)]
pub struct SystemNotice {
    pub id: String,
    pub texts: Vec<String>,
    pub kind: NoticeKind,
    /// Original request to resubmit, set only on retryable errors
    pub retry: Option<CompletionRequest>,
}

/// One entry of a rendered conversation timeline
#[derive(Debug, Clone)]
pub enum TimelineItem {
    Message(MessageRecord),
    DateSeparator(DateSeparator),
    Notice(SystemNotice),
}

impl TimelineItem {
    /// Stable identity used for removal and diffing
    pub fn id(&self) -> &str {
        match self {
            TimelineItem::Message(message) => &message.id,
            TimelineItem::DateSeparator(separator) => &separator.id,
            TimelineItem::Notice(notice) => &notice.id,
        }
    }

    /// Timeline position; notices do not participate in ordering
    pub fn timestamp(&self) -> Option<f64> {
        match self {
            TimelineItem::Message(message) => Some(message.timestamp),
            TimelineItem::DateSeparator(separator) => Some(separator.timestamp),
            TimelineItem::Notice(_) => None,
        }
    }

    fn as_separator(&self) -> Option<&DateSeparator> {
        match self {
            TimelineItem::DateSeparator(separator) => Some(separator),
            _ => None,
        }
    }
}

/// Direction a merge extended the timeline in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Appended,
    Prepended,
}

/// Interleave date separators into a sorted message batch
///
/// `anchor` is the date separator adjacent to the insertion point, passed
/// by the caller since this function has no view of the full timeline. A
/// separator is inserted only when a message's bucket differs from the
/// anchor's; the anchor then advances to that bucket for the rest of the
/// batch. This is what prevents duplicate "today" headers at page seams.
pub fn interleave(
    batch: &[MessageRecord],
    anchor: Option<&DateSeparator>,
    now: DateTime<Local>,
) -> Vec<TimelineItem> {
    let mut bucket = anchor
        .map(|separator| short_relative_date(separator.timestamp, now))
        .unwrap_or_default();
    let mut items = Vec::with_capacity(batch.len());
    for message in batch {
        let message_bucket = short_relative_date(message.timestamp, now);
        if bucket != message_bucket {
            items.push(TimelineItem::DateSeparator(DateSeparator::for_timestamp(
                message.timestamp,
            )));
        }
        bucket = message_bucket;
        items.push(TimelineItem::Message(message.clone()));
    }
    items
}

/// Merge a contiguous sorted batch into an existing ordered timeline
///
/// A batch whose last timestamp is strictly earlier than the timeline's
/// first item is a back-pagination result and is prepended; equal or later
/// batches are appended. The separator anchor is the first existing
/// separator when prepending, the last when appending.
pub fn merge(
    items: &mut Vec<TimelineItem>,
    batch: &[MessageRecord],
    now: DateTime<Local>,
) -> MergeOutcome {
    if batch.is_empty() {
        return MergeOutcome::Appended;
    }

    let first_timestamp = items.iter().find_map(TimelineItem::timestamp);
    let Some(first_timestamp) = first_timestamp else {
        let merged = interleave(batch, None, now);
        items.extend(merged);
        return MergeOutcome::Appended;
    };

    // batch is non-empty, checked above
    let batch_last = batch[batch.len() - 1].timestamp;
    if batch_last < first_timestamp {
        let anchor = items
            .iter()
            .find_map(TimelineItem::as_separator)
            .cloned();
        let merged = interleave(batch, anchor.as_ref(), now);
        items.splice(0..0, merged);
        MergeOutcome::Prepended
    } else {
        let anchor = items
            .iter()
            .rev()
            .find_map(TimelineItem::as_separator)
            .cloned();
        let merged = interleave(batch, anchor.as_ref(), now);
        items.extend(merged);
        MergeOutcome::Appended
    }
}

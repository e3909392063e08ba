//! Bulk-import bookkeeping: progress events, summaries, and the merge rule.

use std::cmp::Reverse;
use std::collections::HashMap;

use serde::Serialize;

use crate::record::ConversationRecord;

/// Liveness report emitted after each record of a bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    pub processed_count: usize,
    pub total_count: usize,
    /// 0..=100, derived from the two counts.
    pub percent: u8,
    pub status_text: String,
}

impl ImportProgress {
    pub fn new(processed_count: usize, total_count: usize, status_text: impl Into<String>) -> Self {
        let percent = if total_count == 0 {
            100
        } else {
            (processed_count.min(total_count) * 100 / total_count) as u8
        };
        Self {
            processed_count,
            total_count,
            percent,
            status_text: status_text.into(),
        }
    }
}

/// Outcome of a completed bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Store size after the merge.
    pub total_conversations: usize,
    /// Records offered by the caller.
    pub imported_count: usize,
    /// Records that needed, and got, a fresh embedding.
    pub embedded_count: usize,
    /// Records discarded: empty message or failed embedding.
    pub dropped_count: usize,
    /// Records skipped because the store already held a record for the same
    /// message that is at least as recent.
    pub superseded_count: usize,
}

/// Merge `incoming` into `existing`.
///
/// One record survives per `fan_message`: the one with the greater
/// timestamp, or the first one seen on a tie. The result is ordered newest
/// first and cut to `capacity`.
pub(crate) fn merge_records(
    existing: Vec<ConversationRecord>,
    incoming: Vec<ConversationRecord>,
    capacity: usize,
) -> Vec<ConversationRecord> {
    let mut merged: Vec<ConversationRecord> = Vec::with_capacity(existing.len() + incoming.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for record in existing.into_iter().chain(incoming) {
        match positions.get(&record.fan_message) {
            Some(&at) => {
                if record.timestamp > merged[at].timestamp {
                    merged[at] = record;
                }
            }
            None => {
                positions.insert(record.fan_message.clone(), merged.len());
                merged.push(record);
            }
        }
    }

    // Stable: equal timestamps keep first-seen order.
    merged.sort_by_key(|r| Reverse(r.timestamp));
    merged.truncate(capacity);
    merged
}

//! Snapshot reconciliation.
//!
//! Pure merge functions combining a freshly fetched or streamed collection
//! with the one already held. Unchanged items keep their `Arc`, and when
//! nothing changed the held collection itself is returned, so consumers can
//! skip work with `Arc::ptr_eq`.
//!
//! Two flavors:
//! - identity-replace (runs, results): incoming is the new truth, but an item
//!   whose tracked fields match its held counterpart is swapped for the held one.
//! - append-only (turns, api calls): `timestamp` is a natural key and only
//!   unseen items are appended.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::models::{ApiCall, Collection, ConversationTurn, TestResult, TestRun};

/// Items replaced wholesale by identity.
pub trait Identified {
    /// `None` when the item arrived without its identity field.
    fn identity(&self) -> Option<&str>;

    /// Whether the tracked fields of `self` and `other` are equal.
    fn same_content(&self, other: &Self) -> bool;
}

/// Items appended by natural key.
pub trait Timestamped {
    fn natural_key(&self) -> Option<DateTime<Utc>>;
}

fn non_empty(id: &str) -> Option<&str> {
    (!id.is_empty()).then_some(id)
}

impl Identified for TestRun {
    fn identity(&self) -> Option<&str> {
        non_empty(&self.run_id)
    }

    fn same_content(&self, other: &Self) -> bool {
        self.status == other.status
            && self.passed == other.passed
            && self.failed == other.failed
            && self.total == other.total
    }
}

impl Identified for TestResult {
    fn identity(&self) -> Option<&str> {
        non_empty(&self.test_id)
    }

    fn same_content(&self, other: &Self) -> bool {
        self.status == other.status
            && self.duration_ms == other.duration_ms
            && self.error_message == other.error_message
    }
}

impl Timestamped for ConversationTurn {
    fn natural_key(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

impl Timestamped for ApiCall {
    fn natural_key(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

/// Merge an incoming snapshot over `existing`, keyed by identity.
///
/// Output order follows `incoming`. Items without identity are always new.
pub fn merge_by_identity<T: Identified>(existing: &Collection<T>, incoming: Collection<T>) -> Collection<T> {
    if existing.is_empty() {
        return incoming;
    }

    let held: HashMap<&str, &Arc<T>> = existing
        .iter()
        .filter_map(|item| item.identity().map(|id| (id, item)))
        .collect();

    let mut changed = incoming.len() != existing.len();
    let mut merged = Vec::with_capacity(incoming.len());

    for (index, item) in incoming.iter().enumerate() {
        let kept = match item.identity().and_then(|id| held.get(id)) {
            Some(current) if current.same_content(item) => Arc::clone(current),
            _ => {
                changed = true;
                Arc::clone(item)
            }
        };
        // Same items in a different order still count as a change.
        if !changed && !Arc::ptr_eq(&existing[index], &kept) {
            changed = true;
        }
        merged.push(kept);
    }

    if changed {
        Arc::new(merged)
    } else {
        Arc::clone(existing)
    }
}

/// Append the items of `incoming` whose natural key is not already held.
///
/// Held order is untouched; new items follow in incoming order. Items without
/// a timestamp are always appended.
pub fn merge_append_only<T: Timestamped>(existing: &Collection<T>, incoming: Collection<T>) -> Collection<T> {
    let mut seen: HashSet<DateTime<Utc>> = existing.iter().filter_map(|item| item.natural_key()).collect();
    let fresh: Vec<Arc<T>> = incoming
        .iter()
        .filter(|item| item.natural_key().map_or(true, |ts| seen.insert(ts)))
        .cloned()
        .collect();

    if fresh.is_empty() {
        return Arc::clone(existing);
    }
    if existing.is_empty() && fresh.len() == incoming.len() {
        return incoming;
    }

    let mut merged = Vec::with_capacity(existing.len() + fresh.len());
    merged.extend(existing.iter().cloned());
    merged.extend(fresh);
    Arc::new(merged)
}

pub fn merge_runs(existing: &Collection<TestRun>, incoming: Collection<TestRun>) -> Collection<TestRun> {
    merge_by_identity(existing, incoming)
}

pub fn merge_results(existing: &Collection<TestResult>, incoming: Collection<TestResult>) -> Collection<TestResult> {
    merge_by_identity(existing, incoming)
}

pub fn merge_turns(
    existing: &Collection<ConversationTurn>,
    incoming: Collection<ConversationTurn>,
) -> Collection<ConversationTurn> {
    merge_append_only(existing, incoming)
}

pub fn merge_api_calls(existing: &Collection<ApiCall>, incoming: Collection<ApiCall>) -> Collection<ApiCall> {
    merge_append_only(existing, incoming)
}

/// Wrap plain items into a collection.
pub fn collect<T>(items: impl IntoIterator<Item = T>) -> Collection<T> {
    Arc::new(items.into_iter().map(Arc::new).collect())
}

//! Property tests for snapshot reconciliation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use testflow::domain::models::{Collection, ConversationTurn, RunStatus, TestRun, TurnRole};
use testflow::services::reconciler::{collect, merge_runs, merge_turns};

fn status() -> impl Strategy<Value = RunStatus> {
    prop_oneof![
        Just(RunStatus::Running),
        Just(RunStatus::Completed),
        Just(RunStatus::Failed),
    ]
}

/// Runs with unique, non-empty ids.
fn runs() -> impl Strategy<Value = Vec<TestRun>> {
    prop::collection::btree_map("[a-z]{1,6}", (status(), 0u32..50, 0u32..50), 1..20).prop_map(|map| {
        map.into_iter()
            .map(|(id, (status, passed, failed))| {
                TestRun::new(id)
                    .with_counts(passed + failed, passed, failed)
                    .with_status(status)
            })
            .collect()
    })
}

fn turns() -> impl Strategy<Value = Vec<ConversationTurn>> {
    prop::collection::vec((0i64..200, "[a-z ]{0,12}"), 0..30).prop_map(|items| {
        items
            .into_iter()
            .map(|(secs, content)| {
                let ts = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
                ConversationTurn::new(ts, TurnRole::Assistant, content)
            })
            .collect()
    })
}

fn plain<T: Clone>(collection: &Collection<T>) -> Vec<T> {
    collection.iter().map(|item| item.as_ref().clone()).collect()
}

proptest! {
    #[test]
    fn unchanged_snapshot_keeps_held_collection(items in runs()) {
        let held = collect(items.clone());
        let merged = merge_runs(&held, collect(items));
        prop_assert!(Arc::ptr_eq(&held, &merged));
    }

    #[test]
    fn merged_runs_equal_incoming(held in runs(), incoming in runs()) {
        let held = collect(held);
        let merged = merge_runs(&held, collect(incoming.clone()));
        prop_assert_eq!(plain(&merged), incoming);
    }

    #[test]
    fn untouched_runs_keep_their_arc(held in runs(), flip in any::<prop::sample::Index>()) {
        let held_collection = collect(held.clone());
        let mut incoming = held;
        let changed = flip.index(incoming.len());
        incoming[changed].passed += 1;

        let merged = merge_runs(&held_collection, collect(incoming));
        prop_assert!(!Arc::ptr_eq(&held_collection, &merged));
        for (index, item) in merged.iter().enumerate() {
            prop_assert_eq!(Arc::ptr_eq(item, &held_collection[index]), index != changed);
        }
    }

    #[test]
    fn append_only_never_duplicates_keys(first in turns(), second in turns()) {
        let held = collect(first);
        let merged = merge_turns(&held, collect(second.clone()));

        // held items stay in place
        prop_assert!(merged.len() >= held.len());
        for (a, b) in held.iter().zip(merged.iter()) {
            prop_assert!(Arc::ptr_eq(a, b));
        }

        let new_keys: HashSet<_> = merged[held.len()..].iter().filter_map(|t| t.timestamp).collect();
        prop_assert_eq!(new_keys.len(), merged.len() - held.len());
        let held_keys: HashSet<_> = held.iter().filter_map(|t| t.timestamp).collect();
        prop_assert!(new_keys.is_disjoint(&held_keys));
        for turn in &second {
            prop_assert!(merged.iter().any(|t| t.timestamp == turn.timestamp));
        }
    }

    #[test]
    fn append_only_is_idempotent(first in turns(), second in turns()) {
        let held = collect(first);
        let incoming = collect(second);
        let once = merge_turns(&held, Arc::clone(&incoming));
        let twice = merge_turns(&once, incoming);
        if !once.is_empty() {
            prop_assert!(Arc::ptr_eq(&once, &twice));
        }
    }
}

//! Live conversation buffers for tests that are currently streaming.
//!
//! Fed by pushed events, independent of the batch poll cycle. Completing a
//! test keeps its transcript; only an explicit `clear` drops it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::models::{ApiCall, Collection, ConversationTurn};
use crate::services::reconciler::{collect, merge_api_calls, merge_turns};

/// Transcript buffer for one test.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveConversationState {
    pub test_id: String,
    pub turns: Collection<ConversationTurn>,
    pub api_calls: Collection<ApiCall>,
    pub is_live: bool,
    pub last_updated: DateTime<Utc>,
}

impl LiveConversationState {
    fn new(test_id: &str) -> Self {
        Self {
            test_id: test_id.to_string(),
            turns: Arc::default(),
            api_calls: Arc::default(),
            is_live: true,
            last_updated: Utc::now(),
        }
    }
}

/// Per-test live transcript buffers.
#[derive(Clone, Default)]
pub struct LiveSessionTracker {
    sessions: Arc<RwLock<HashMap<String, LiveConversationState>>>,
}

impl LiveSessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a streamed turn. A re-delivered turn (same timestamp) is dropped.
    pub async fn add_turn(&self, test_id: &str, turn: ConversationTurn) {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(test_id.to_string())
            .or_insert_with(|| LiveConversationState::new(test_id));
        session.turns = merge_turns(&session.turns, collect([turn]));
        session.last_updated = Utc::now();
    }

    pub async fn add_api_call(&self, test_id: &str, call: ApiCall) {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(test_id.to_string())
            .or_insert_with(|| LiveConversationState::new(test_id));
        session.api_calls = merge_api_calls(&session.api_calls, collect([call]));
        session.last_updated = Utc::now();
    }

    /// Seed or catch up a buffer from a REST fetch.
    ///
    /// Fetched items whose timestamp is already buffered are dropped, then the
    /// union is re-sorted by timestamp. Live data is never overwritten.
    pub async fn initialize(&self, test_id: &str, turns: Vec<ConversationTurn>, calls: Vec<ApiCall>) {
        let turns: Collection<ConversationTurn> = Arc::new(turns.into_iter().map(Arc::new).collect());
        let calls: Collection<ApiCall> = Arc::new(calls.into_iter().map(Arc::new).collect());

        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(test_id) {
            None => {
                let mut session = LiveConversationState::new(test_id);
                session.turns = turns;
                session.api_calls = calls;
                sessions.insert(test_id.to_string(), session);
            }
            Some(session) => {
                let merged_turns = merge_turns(&session.turns, turns);
                if !Arc::ptr_eq(&merged_turns, &session.turns) {
                    let mut sorted = (*merged_turns).clone();
                    sorted.sort_by_key(|t| t.timestamp);
                    session.turns = Arc::new(sorted);
                }

                let merged_calls = merge_api_calls(&session.api_calls, calls);
                if !Arc::ptr_eq(&merged_calls, &session.api_calls) {
                    let mut sorted = (*merged_calls).clone();
                    sorted.sort_by_key(|c| c.timestamp);
                    session.api_calls = Arc::new(sorted);
                }
                debug!(
                    test_id,
                    turns = session.turns.len(),
                    api_calls = session.api_calls.len(),
                    "caught up live session"
                );
            }
        }
        if let Some(session) = sessions.get_mut(test_id) {
            session.last_updated = Utc::now();
        }
    }

    /// Stop treating the test as live; the transcript stays inspectable.
    pub async fn mark_complete(&self, test_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(test_id) {
            session.is_live = false;
            session.last_updated = Utc::now();
        }
    }

    pub async fn mark_all_complete(&self) {
        let now = Utc::now();
        for session in self.sessions.write().await.values_mut() {
            if session.is_live {
                session.is_live = false;
                session.last_updated = now;
            }
        }
    }

    /// Drop the buffer. Only for an explicit operator dismissal.
    pub async fn clear(&self, test_id: &str) -> bool {
        self.sessions.write().await.remove(test_id).is_some()
    }

    pub async fn get(&self, test_id: &str) -> Option<LiveConversationState> {
        self.sessions.read().await.get(test_id).cloned()
    }

    /// Every buffered transcript, live or not, sorted by test id.
    pub async fn sessions(&self) -> Vec<LiveConversationState> {
        let mut all: Vec<LiveConversationState> = self.sessions.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.test_id.cmp(&b.test_id));
        all
    }

    /// Ids of tests still streaming, sorted.
    pub async fn live_test_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_live)
            .map(|s| s.test_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

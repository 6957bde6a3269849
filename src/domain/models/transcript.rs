//! Conversation turns and API-call events recorded while a test streams.
//!
//! Both are append-only; `timestamp` is the natural key used to deduplicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    #[default]
    User,
    Assistant,
    System,
}

/// One message exchanged with the agent under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    /// Natural key. `None` when the event arrived without one.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub role: TurnRole,
    #[serde(default)]
    pub content: String,
}

impl ConversationTurn {
    pub fn new(timestamp: DateTime<Utc>, role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            timestamp: Some(timestamp),
            role,
            content: content.into(),
        }
    }
}

/// One outbound call the agent made while handling a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApiCall {
    /// Natural key. `None` when the event arrived without one.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Tool or endpoint the agent invoked.
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub request: serde_json::Value,
    #[serde(default)]
    pub response: serde_json::Value,
}

impl ApiCall {
    pub fn new(timestamp: DateTime<Utc>, target: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            timestamp: Some(timestamp),
            target: target.into(),
            duration_ms,
            request: serde_json::Value::Null,
            response: serde_json::Value::Null,
        }
    }
}

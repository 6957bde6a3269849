//! Remediation candidates generated from failure diagnosis.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a fix edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FixType {
    #[default]
    Prompt,
    Tool,
}

/// Lifecycle status of a fix.
///
/// ```text
/// Pending → Applied → Verified
///    ↓         ↓
/// Rejected  Pending (operator rejection)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    #[default]
    Pending,
    Applied,
    Rejected,
    Verified,
}

impl FixStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Rejected => "rejected",
            Self::Verified => "verified",
        }
    }
}

impl fmt::Display for FixStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FixStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "applied" => Ok(Self::Applied),
            "rejected" => Ok(Self::Rejected),
            "verified" => Ok(Self::Verified),
            other => Err(format!("unknown fix status: {other}")),
        }
    }
}

/// A proposed edit to the agent's prompt or tool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    pub fix_id: String,
    #[serde(rename = "type", default)]
    pub fix_type: FixType,
    #[serde(default)]
    pub status: FixStatus,
    /// Configuration file the fix edits.
    #[serde(default)]
    pub target_file: String,
    #[serde(default)]
    pub description: String,
    /// Tests whose failure produced this fix.
    #[serde(default)]
    pub test_ids: Vec<String>,
    /// Last apply error, cleared on a successful apply.
    #[serde(default)]
    pub error: Option<String>,
    /// Version of the target file written by the apply.
    #[serde(default)]
    pub applied_version: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Fix {
    pub fn new(fix_id: impl Into<String>, fix_type: FixType, target_file: impl Into<String>) -> Self {
        Self {
            fix_id: fix_id.into(),
            fix_type,
            status: FixStatus::Pending,
            target_file: target_file.into(),
            description: String::new(),
            test_ids: Vec::new(),
            error: None,
            applied_version: None,
            updated_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Per-fix outcome of an apply call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixApplyOutcome {
    pub fix_id: String,
    pub success: bool,
    #[serde(default)]
    pub file_key: Option<String>,
    #[serde(default)]
    pub new_version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of a batch apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchApplyReport {
    #[serde(default)]
    pub results: Vec<FixApplyOutcome>,
}

/// Effectiveness of one fix on one re-run test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixVerification {
    pub fix_id: String,
    pub effective: bool,
    #[serde(default)]
    pub test_id: Option<String>,
}

/// Response of a verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub overall_effective: bool,
    #[serde(default)]
    pub fix_ids: Vec<String>,
    #[serde(default)]
    pub results: Vec<FixVerification>,
}

/// Response of a diagnosis pass over a run's failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisReport {
    pub success: bool,
    #[serde(default)]
    pub fixes_generated: u32,
    #[serde(default)]
    pub analyzed_count: u32,
    #[serde(default)]
    pub total_failures: u32,
}

/// Response of a deploy call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    #[serde(default)]
    pub deployed: u32,
}

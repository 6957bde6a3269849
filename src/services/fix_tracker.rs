//! Fix lifecycle tracking.
//!
//! ```text
//! pending ──apply ok──▶ applied ──all tied results effective──▶ verified
//!    │                     │
//!  reject               reject
//!    ▼                     ▼
//! rejected              pending
//! ```
//!
//! Batch applies are partial-success: each fix follows its own outcome.
//! A verification that is not effective for every tied result leaves the fix
//! at `applied`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BatchApplyReport, Fix, FixApplyOutcome, FixStatus, VerificationReport,
};
use crate::domain::ports::FixApi;

#[derive(Default)]
struct FixState {
    /// Insertion order is the order fixes were first seen.
    fixes: Vec<Fix>,
    index: HashMap<String, usize>,
}

impl FixState {
    fn get(&self, fix_id: &str) -> Option<&Fix> {
        self.index.get(fix_id).map(|&i| &self.fixes[i])
    }

    fn get_mut(&mut self, fix_id: &str) -> Option<&mut Fix> {
        match self.index.get(fix_id) {
            Some(&i) => self.fixes.get_mut(i),
            None => None,
        }
    }

    fn require(&self, fix_id: &str, expected: FixStatus, action: &str) -> DomainResult<()> {
        let fix = self
            .get(fix_id)
            .ok_or_else(|| DomainError::FixNotFound(fix_id.to_string()))?;
        if fix.status != expected {
            return Err(DomainError::InvalidStateTransition {
                from: fix.status.to_string(),
                to: action.to_string(),
                reason: format!("fix {fix_id} must be {expected} to {action}"),
            });
        }
        Ok(())
    }
}

/// Tracks generated fixes through apply, verify and rejection.
#[derive(Clone)]
pub struct FixTracker {
    api: Arc<dyn FixApi>,
    state: Arc<RwLock<FixState>>,
}

impl FixTracker {
    pub fn new(api: Arc<dyn FixApi>) -> Self {
        Self {
            api,
            state: Arc::new(RwLock::new(FixState::default())),
        }
    }

    /// Merge generated candidates. Unknown fixes are tracked as given
    /// (normally `pending`); known fixes keep their local status.
    pub async fn load(&self, fixes: Vec<Fix>) -> usize {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut added = 0;
        for fix in fixes {
            match state.index.get(&fix.fix_id) {
                Some(&i) => {
                    let known = &mut state.fixes[i];
                    known.description = fix.description;
                    known.target_file = fix.target_file;
                    known.test_ids = fix.test_ids;
                }
                None => {
                    let i = state.fixes.len();
                    state.index.insert(fix.fix_id.clone(), i);
                    state.fixes.push(fix);
                    added += 1;
                }
            }
        }
        debug!(added, total = state.fixes.len(), "loaded fixes");
        added
    }

    /// Fetch candidates from the server and merge them.
    pub async fn refresh(&self, run_id: Option<&str>) -> DomainResult<usize> {
        let fixes = self.api.list_fixes(run_id).await?;
        Ok(self.load(fixes).await)
    }

    pub async fn apply(&self, fix_id: &str) -> DomainResult<FixApplyOutcome> {
        let report = self.apply_batch(&[fix_id.to_string()]).await?;
        report
            .results
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::FixNotFound(fix_id.to_string()))
    }

    /// Apply several pending fixes in one call.
    ///
    /// The returned report has one outcome per distinct requested id, in
    /// first-seen order. A fix the server did not report on counts as failed.
    pub async fn apply_batch(&self, fix_ids: &[String]) -> DomainResult<BatchApplyReport> {
        let fix_ids = distinct(fix_ids);
        if fix_ids.is_empty() {
            return Ok(BatchApplyReport::default());
        }
        {
            let state = self.state.read().await;
            for fix_id in &fix_ids {
                state.require(fix_id, FixStatus::Pending, "apply")?;
            }
        }

        let remote = self.api.apply_batch_fixes(&fix_ids).await?;
        let mut by_id: HashMap<String, FixApplyOutcome> = remote
            .results
            .into_iter()
            .map(|outcome| (outcome.fix_id.clone(), outcome))
            .collect();

        let mut results = Vec::with_capacity(fix_ids.len());
        let mut state = self.state.write().await;
        let now = Utc::now();
        for fix_id in &fix_ids {
            let outcome = by_id.remove(fix_id).unwrap_or_else(|| FixApplyOutcome {
                fix_id: fix_id.clone(),
                success: false,
                file_key: None,
                new_version: None,
                error: Some("no outcome returned for fix".to_string()),
            });

            if let Some(fix) = state.get_mut(fix_id) {
                if outcome.success {
                    fix.status = FixStatus::Applied;
                    fix.applied_version = outcome.new_version.clone();
                    fix.error = None;
                    info!(fix_id = %fix_id, version = ?outcome.new_version, "fix applied");
                } else {
                    let message = outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "apply failed".to_string());
                    warn!(fix_id = %fix_id, error = %message, "fix apply failed");
                    fix.error = Some(message);
                }
                fix.updated_at = Some(now);
            }
            results.push(outcome);
        }

        Ok(BatchApplyReport { results })
    }

    /// Run verification for applied fixes.
    ///
    /// A fix becomes `verified` only when at least one result is tied to it
    /// and every tied result is effective.
    pub async fn verify(&self, fix_ids: &[String]) -> DomainResult<VerificationReport> {
        {
            let state = self.state.read().await;
            for fix_id in fix_ids {
                state.require(fix_id, FixStatus::Applied, "verify")?;
            }
        }

        let report = self.api.verify_fixes(fix_ids).await?;

        let mut state = self.state.write().await;
        let now = Utc::now();
        for fix_id in fix_ids {
            let mut tied = report.results.iter().filter(|r| &r.fix_id == fix_id).peekable();
            let effective = tied.peek().is_some() && tied.all(|r| r.effective);
            if let Some(fix) = state.get_mut(fix_id) {
                if effective {
                    fix.status = FixStatus::Verified;
                    fix.updated_at = Some(now);
                    info!(fix_id = %fix_id, "fix verified");
                } else {
                    debug!(fix_id = %fix_id, "fix not effective, left applied");
                }
            }
        }

        Ok(report)
    }

    /// Operator dismissal: `pending → rejected`, `applied → pending`.
    pub async fn reject(&self, fix_id: &str) -> DomainResult<Fix> {
        let mut state = self.state.write().await;
        let fix = state
            .get_mut(fix_id)
            .ok_or_else(|| DomainError::FixNotFound(fix_id.to_string()))?;

        let next = match fix.status {
            FixStatus::Pending => FixStatus::Rejected,
            FixStatus::Applied => FixStatus::Pending,
            other => {
                return Err(DomainError::InvalidStateTransition {
                    from: other.to_string(),
                    to: "rejected".to_string(),
                    reason: format!("fix {fix_id} is already {other}"),
                })
            }
        };
        info!(fix_id = %fix_id, from = %fix.status, to = %next, "fix rejected");
        fix.status = next;
        fix.applied_version = None;
        fix.updated_at = Some(Utc::now());
        Ok(fix.clone())
    }

    pub async fn get(&self, fix_id: &str) -> Option<Fix> {
        self.state.read().await.get(fix_id).cloned()
    }

    pub async fn fixes(&self) -> Vec<Fix> {
        self.state.read().await.fixes.clone()
    }

    pub async fn with_status(&self, status: FixStatus) -> Vec<Fix> {
        self.state
            .read()
            .await
            .fixes
            .iter()
            .filter(|f| f.status == status)
            .cloned()
            .collect()
    }

    pub async fn pending_ids(&self) -> Vec<String> {
        self.ids_with_status(FixStatus::Pending).await
    }

    pub async fn applied_ids(&self) -> Vec<String> {
        self.ids_with_status(FixStatus::Applied).await
    }

    pub async fn verified_ids(&self) -> Vec<String> {
        self.ids_with_status(FixStatus::Verified).await
    }

    async fn ids_with_status(&self, status: FixStatus) -> Vec<String> {
        self.state
            .read()
            .await
            .fixes
            .iter()
            .filter(|f| f.status == status)
            .map(|f| f.fix_id.clone())
            .collect()
    }
}

/// Ids in first-seen order with repeats dropped.
fn distinct(fix_ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    fix_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        DeployReport, DiagnosisReport, FixType, FixVerification,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFixApi {
        failing: HashSet<String>,
        omitted: HashSet<String>,
        verification: Mutex<Vec<FixVerification>>,
    }

    #[async_trait]
    impl FixApi for FakeFixApi {
        async fn run_diagnosis(&self, _run_id: &str, _use_llm: bool) -> DomainResult<DiagnosisReport> {
            Ok(DiagnosisReport::default())
        }

        async fn list_fixes(&self, _run_id: Option<&str>) -> DomainResult<Vec<Fix>> {
            Ok(vec![])
        }

        async fn apply_batch_fixes(&self, fix_ids: &[String]) -> DomainResult<BatchApplyReport> {
            let results = fix_ids
                .iter()
                .filter(|id| !self.omitted.contains(*id))
                .map(|id| {
                    let ok = !self.failing.contains(id);
                    FixApplyOutcome {
                        fix_id: id.clone(),
                        success: ok,
                        file_key: ok.then(|| "prompts/system.md".to_string()),
                        new_version: ok.then(|| "v2".to_string()),
                        error: (!ok).then(|| "merge conflict".to_string()),
                    }
                })
                .collect();
            Ok(BatchApplyReport { results })
        }

        async fn verify_fixes(&self, fix_ids: &[String]) -> DomainResult<VerificationReport> {
            let results = self.verification.lock().unwrap().clone();
            Ok(VerificationReport {
                overall_effective: results.iter().all(|r| r.effective),
                fix_ids: fix_ids.to_vec(),
                results,
            })
        }

        async fn deploy_fixes(&self, fix_ids: &[String]) -> DomainResult<DeployReport> {
            Ok(DeployReport {
                deployed: fix_ids.len() as u32,
            })
        }
    }

    fn fixes(ids: &[&str]) -> Vec<Fix> {
        ids.iter()
            .map(|id| Fix::new(*id, FixType::Prompt, "prompts/system.md"))
            .collect()
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn verdict(fix_id: &str, effective: bool) -> FixVerification {
        FixVerification {
            fix_id: fix_id.into(),
            effective,
            test_id: None,
        }
    }

    #[tokio::test]
    async fn test_partial_batch_apply() {
        let api = FakeFixApi {
            failing: HashSet::from(["f2".to_string()]),
            ..Default::default()
        };
        let tracker = FixTracker::new(Arc::new(api));
        tracker.load(fixes(&["f1", "f2", "f3"])).await;

        let report = tracker.apply_batch(&ids(&["f1", "f2", "f3"])).await.unwrap();
        let outcomes: Vec<bool> = report.results.iter().map(|r| r.success).collect();
        assert_eq!(outcomes, vec![true, false, true]);

        assert_eq!(tracker.get("f1").await.unwrap().status, FixStatus::Applied);
        assert_eq!(tracker.get("f3").await.unwrap().status, FixStatus::Applied);
        let f2 = tracker.get("f2").await.unwrap();
        assert_eq!(f2.status, FixStatus::Pending);
        assert_eq!(f2.error.as_deref(), Some("merge conflict"));
    }

    #[tokio::test]
    async fn test_repeated_id_applied_once() {
        let tracker = FixTracker::new(Arc::new(FakeFixApi::default()));
        tracker.load(fixes(&["f1", "f2"])).await;

        let report = tracker.apply_batch(&ids(&["f1", "f2", "f1"])).await.unwrap();
        let applied: Vec<&str> = report.results.iter().map(|r| r.fix_id.as_str()).collect();
        assert_eq!(applied, vec!["f1", "f2"]);
        assert!(report.results.iter().all(|r| r.success));

        let f1 = tracker.get("f1").await.unwrap();
        assert_eq!(f1.status, FixStatus::Applied);
        assert!(f1.error.is_none());
    }

    #[tokio::test]
    async fn test_missing_outcome_counts_as_failure() {
        let api = FakeFixApi {
            omitted: HashSet::from(["f2".to_string()]),
            ..Default::default()
        };
        let tracker = FixTracker::new(Arc::new(api));
        tracker.load(fixes(&["f1", "f2"])).await;

        let report = tracker.apply_batch(&ids(&["f1", "f2"])).await.unwrap();
        assert_eq!(report.results.len(), 2);
        assert!(!report.results[1].success);
        assert_eq!(tracker.pending_ids().await, ids(&["f2"]));
        assert_eq!(tracker.applied_ids().await, ids(&["f1"]));
    }

    #[tokio::test]
    async fn test_apply_requires_pending() {
        let tracker = FixTracker::new(Arc::new(FakeFixApi::default()));
        tracker.load(fixes(&["f1"])).await;
        tracker.apply("f1").await.unwrap();

        assert!(matches!(
            tracker.apply("f1").await,
            Err(DomainError::InvalidStateTransition { .. })
        ));
        assert!(matches!(tracker.apply("nope").await, Err(DomainError::FixNotFound(_))));
    }

    #[tokio::test]
    async fn test_verify_requires_every_tied_result_effective() {
        let api = Arc::new(FakeFixApi::default());
        *api.verification.lock().unwrap() = vec![
            verdict("f1", true),
            verdict("f1", true),
            verdict("f2", true),
            verdict("f2", false),
        ];
        let tracker = FixTracker::new(api);
        tracker.load(fixes(&["f1", "f2", "f3"])).await;
        tracker.apply_batch(&ids(&["f1", "f2", "f3"])).await.unwrap();

        tracker.verify(&ids(&["f1", "f2", "f3"])).await.unwrap();

        assert_eq!(tracker.verified_ids().await, ids(&["f1"]));
        // f2 had an ineffective result, f3 had none
        assert_eq!(tracker.applied_ids().await, ids(&["f2", "f3"]));
    }

    #[tokio::test]
    async fn test_reject_transitions() {
        let tracker = FixTracker::new(Arc::new(FakeFixApi::default()));
        tracker.load(fixes(&["f1", "f2"])).await;
        tracker.apply("f2").await.unwrap();

        assert_eq!(tracker.reject("f1").await.unwrap().status, FixStatus::Rejected);
        let f2 = tracker.reject("f2").await.unwrap();
        assert_eq!(f2.status, FixStatus::Pending);
        assert!(f2.applied_version.is_none());

        assert!(matches!(
            tracker.reject("f1").await,
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_keeps_known_status() {
        let tracker = FixTracker::new(Arc::new(FakeFixApi::default()));
        tracker.load(fixes(&["f1"])).await;
        tracker.apply("f1").await.unwrap();

        let added = tracker.load(fixes(&["f1", "f2"])).await;
        assert_eq!(added, 1);
        assert_eq!(tracker.get("f1").await.unwrap().status, FixStatus::Applied);
        assert_eq!(tracker.pending_ids().await, ids(&["f2"]));
    }
}

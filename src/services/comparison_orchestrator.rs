//! Multi-environment comparison orchestration.
//!
//! A comparison is fire-and-forget on the remote side: `start` returns at once
//! and the orchestrator polls the job until it reaches a terminal status or
//! the attempt budget runs out. Every poll rebuilds the comparison matrix so
//! partial results are visible while the job runs.
//!
//! The in-flight job id is written to the durable store so a restarted client
//! can pick the job back up with `resume`. The marker is cleared whenever
//! tracking ends (completion, remote failure, fetch error, timeout).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult, OnError};
use crate::domain::models::{
    ComparisonConfig, ComparisonListEntry, ComparisonMatrix, ComparisonRequest, ComparisonRun,
    ComparisonStarted, ComparisonStatus, ComparisonSummary,
};
use crate::domain::ports::{get_json, set_json, ComparisonApi, DurableStore};
use crate::services::scheduled_task::ScheduledTask;

/// Durable store key holding the in-flight comparison marker.
pub const IN_FLIGHT_KEY: &str = "comparison.in_flight";

/// Marker persisted while a comparison is being tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InFlightComparison {
    pub comparison_id: String,
    pub started_at: DateTime<Utc>,
}

/// Poll cadence and budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 200,
        }
    }
}

impl From<&ComparisonConfig> for PollPolicy {
    fn from(config: &ComparisonConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.max_poll_attempts,
        }
    }
}

/// What the operator sees of comparisons.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonView {
    pub is_running: bool,
    pub comparison_id: Option<String>,
    /// Latest raw record of the displayed comparison.
    pub run: Option<ComparisonRun>,
    pub matrix: ComparisonMatrix,
    pub summary: ComparisonSummary,
    pub history: Vec<ComparisonListEntry>,
    pub error: Option<String>,
}

/// Result of looking for a comparison to resume on attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No marker was stored.
    NothingToResume,
    /// The job is still running; polling restarted with a fresh budget.
    Resumed { comparison_id: String },
    /// The job had already finished; its final matrix was loaded.
    LoadedFinal {
        comparison_id: String,
        status: ComparisonStatus,
    },
}

type PollTask = ScheduledTask<DomainResult<ComparisonRun>>;

struct Inner {
    api: Arc<dyn ComparisonApi>,
    store: Arc<dyn DurableStore>,
    policy: PollPolicy,
    view: RwLock<ComparisonView>,
    poll: Mutex<Option<PollTask>>,
    /// Held for the duration of `start`.
    starting: Mutex<()>,
}

/// Starts, polls and resumes comparison jobs.
#[derive(Clone)]
pub struct ComparisonOrchestrator {
    inner: Arc<Inner>,
}

impl ComparisonOrchestrator {
    pub fn new(api: Arc<dyn ComparisonApi>, store: Arc<dyn DurableStore>, policy: PollPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                policy,
                view: RwLock::new(ComparisonView::default()),
                poll: Mutex::new(None),
                starting: Mutex::new(()),
            }),
        }
    }

    pub async fn view(&self) -> ComparisonView {
        self.inner.view.read().await.clone()
    }

    pub async fn is_polling(&self) -> bool {
        self.inner
            .poll
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Start a comparison and begin polling it.
    ///
    /// Only one start may be in flight; a concurrent call fails with
    /// `ComparisonAlreadyRunning` without reaching the server.
    pub async fn start(&self, request: &ComparisonRequest) -> DomainResult<ComparisonStarted> {
        if request.environments.is_empty() {
            return Err(DomainError::ValidationFailed(
                "at least one environment is required".to_string(),
            ));
        }
        if request.test_ids.is_empty() {
            return Err(DomainError::ValidationFailed(
                "at least one test id is required".to_string(),
            ));
        }
        let Ok(_starting) = self.inner.starting.try_lock() else {
            return Err(DomainError::ComparisonAlreadyRunning(String::new()));
        };
        {
            let view = self.inner.view.read().await;
            if view.is_running {
                return Err(DomainError::ComparisonAlreadyRunning(
                    view.comparison_id.clone().unwrap_or_default(),
                ));
            }
        }

        let started = match self.inner.api.start_comparison(request).await {
            Ok(started) => started,
            Err(err) => {
                self.inner.view.write().await.error = Some(err.to_string());
                return Err(err);
            }
        };

        let marker = InFlightComparison {
            comparison_id: started.comparison_id.clone(),
            started_at: Utc::now(),
        };
        if let Err(err) = set_json(self.inner.store.as_ref(), IN_FLIGHT_KEY, &marker).await {
            warn!(
                comparison_id = %marker.comparison_id,
                error = %err,
                "could not persist in-flight comparison; resume will not be possible"
            );
        }

        {
            let mut view = self.inner.view.write().await;
            view.is_running = true;
            view.comparison_id = Some(started.comparison_id.clone());
            view.run = Some(ComparisonRun::new(&started.comparison_id, marker.started_at));
            view.matrix = ComparisonMatrix::default();
            view.summary = ComparisonSummary::zeroed();
            view.error = None;
        }

        info!(
            comparison_id = %started.comparison_id,
            environments = ?request.environments,
            tests = request.test_ids.len(),
            "comparison started"
        );
        self.spawn_poll(started.comparison_id.clone()).await;
        Ok(started)
    }

    /// Pick up a comparison left in flight by a previous client session.
    pub async fn resume(&self) -> DomainResult<ResumeOutcome> {
        let marker: InFlightComparison = match get_json(self.inner.store.as_ref(), IN_FLIGHT_KEY).await {
            Ok(Some(marker)) => marker,
            Ok(None) => return Ok(ResumeOutcome::NothingToResume),
            Err(err) => {
                warn!(error = %err, "discarding unreadable in-flight comparison marker");
                self.inner.clear_marker().await;
                return Ok(ResumeOutcome::NothingToResume);
            }
        };

        let comparison_id = marker.comparison_id;
        let run = match self.inner.api.get_comparison_run(&comparison_id).await {
            Ok(run) => run,
            Err(err) => {
                self.inner.clear_marker().await;
                self.inner.view.write().await.error = Some(err.to_string());
                return Err(err);
            }
        };

        {
            let mut view = self.inner.view.write().await;
            view.comparison_id = Some(comparison_id.clone());
            view.is_running = !run.status.is_terminal();
            view.error = None;
        }
        self.inner.apply_run(&run).await;

        if run.status.is_terminal() {
            self.inner.clear_marker().await;
            if run.status == ComparisonStatus::Failed {
                self.inner.view.write().await.error = Some(failure_reason(&run));
            }
            info!(comparison_id = %comparison_id, status = %run.status, "loaded finished comparison");
            return Ok(ResumeOutcome::LoadedFinal {
                comparison_id,
                status: run.status,
            });
        }

        info!(comparison_id = %comparison_id, "resuming comparison polling");
        self.spawn_poll(comparison_id.clone()).await;
        Ok(ResumeOutcome::Resumed { comparison_id })
    }

    /// Show a comparison by id without tracking it.
    pub async fn load(&self, comparison_id: &str) -> DomainResult<ComparisonRun> {
        {
            let view = self.inner.view.read().await;
            if view.is_running {
                return Err(DomainError::ComparisonAlreadyRunning(
                    view.comparison_id.clone().unwrap_or_default(),
                ));
            }
        }

        let run = self.inner.api.get_comparison_run(comparison_id).await?;
        {
            let mut view = self.inner.view.write().await;
            view.comparison_id = Some(run.comparison_id.clone());
            view.error = None;
        }
        self.inner.apply_run(&run).await;
        Ok(run)
    }

    /// Refresh the list of past comparisons.
    ///
    /// When nothing is running or loaded, the most recent completed
    /// comparison that has a summary is loaded so the detail view is not empty.
    pub async fn refresh_history(&self, on_error: OnError) -> DomainResult<Vec<ComparisonListEntry>> {
        let entries = match self.inner.api.list_comparisons().await {
            Ok(entries) => entries,
            Err(err) => {
                return match on_error {
                    OnError::Surface => {
                        self.inner.view.write().await.error = Some(err.to_string());
                        Err(err)
                    }
                    OnError::Suppress => {
                        debug!(error = %err, "suppressed comparison history error");
                        Ok(self.inner.view.read().await.history.clone())
                    }
                };
            }
        };

        let latest = {
            let mut view = self.inner.view.write().await;
            view.history = entries.clone();
            if view.is_running || view.comparison_id.is_some() {
                None
            } else {
                entries
                    .iter()
                    .filter(|e| e.status == ComparisonStatus::Completed && e.summary.is_some())
                    .max_by_key(|e| e.started_at)
                    .map(|e| e.comparison_id.clone())
            }
        };

        if let Some(comparison_id) = latest {
            if let Err(err) = self.load(&comparison_id).await {
                match on_error {
                    OnError::Surface => {
                        self.inner.view.write().await.error = Some(err.to_string());
                        return Err(err);
                    }
                    OnError::Suppress => debug!(error = %err, "suppressed comparison detail error"),
                }
            }
        }

        Ok(entries)
    }

    /// Stop observing the job locally. The durable marker is kept so the job
    /// can be resumed later; nothing is sent to the server.
    pub async fn cancel_polling(&self) {
        if let Some(task) = self.inner.poll.lock().await.take() {
            task.cancel();
        }
        self.inner.view.write().await.is_running = false;
    }

    /// Wait for the current poll loop to end.
    ///
    /// `None` when no loop is active or it was cancelled.
    pub async fn wait(&self) -> Option<DomainResult<ComparisonRun>> {
        let task = self.inner.poll.lock().await.take()?;
        task.join().await
    }

    async fn spawn_poll(&self, comparison_id: String) {
        let inner = Arc::clone(&self.inner);
        let task = ScheduledTask::spawn(async move { inner.poll_until_terminal(comparison_id).await });
        if let Some(previous) = self.inner.poll.lock().await.replace(task) {
            previous.cancel();
        }
    }
}

impl Inner {
    /// One fetch in flight at a time: each tick awaits its response before
    /// sleeping for the next.
    async fn poll_until_terminal(&self, comparison_id: String) -> DomainResult<ComparisonRun> {
        for attempt in 1..=self.policy.max_attempts {
            tokio::time::sleep(self.policy.interval).await;

            let run = match self.api.get_comparison_run(&comparison_id).await {
                Ok(run) => run,
                Err(err) => {
                    warn!(comparison_id = %comparison_id, attempt, error = %err, "comparison poll failed");
                    self.finish_with_error(&comparison_id, err.to_string()).await;
                    return Err(err);
                }
            };

            debug!(
                comparison_id = %comparison_id,
                attempt,
                status = %run.status,
                production = run.production_results.len(),
                sandbox_a = run.sandbox_a_results.len(),
                sandbox_b = run.sandbox_b_results.len(),
                "comparison poll"
            );
            self.apply_run(&run).await;

            match run.status {
                ComparisonStatus::Running => continue,
                ComparisonStatus::Completed => {
                    self.clear_marker().await;
                    self.view.write().await.is_running = false;
                    info!(comparison_id = %comparison_id, attempts = attempt, "comparison completed");
                    return Ok(run);
                }
                ComparisonStatus::Failed => {
                    let reason = failure_reason(&run);
                    warn!(comparison_id = %comparison_id, reason = %reason, "comparison failed");
                    self.finish_with_error(&comparison_id, reason.clone()).await;
                    return Err(DomainError::ComparisonFailed {
                        comparison_id,
                        reason,
                    });
                }
            }
        }

        let err = DomainError::PollTimeout {
            comparison_id: comparison_id.clone(),
            attempts: self.policy.max_attempts,
        };
        warn!(comparison_id = %comparison_id, attempts = self.policy.max_attempts, "comparison poll budget exhausted");
        self.finish_with_error(&comparison_id, err.to_string()).await;
        Err(err)
    }

    /// Rebuild the derived view from a raw record, if it is still the one displayed.
    async fn apply_run(&self, run: &ComparisonRun) {
        let mut view = self.view.write().await;
        if view.comparison_id.as_deref() != Some(run.comparison_id.as_str()) {
            debug!(comparison_id = %run.comparison_id, "ignoring record for a comparison no longer displayed");
            return;
        }
        view.matrix = ComparisonMatrix::build(run);
        view.summary = run.effective_summary();
        view.run = Some(run.clone());
    }

    async fn finish_with_error(&self, comparison_id: &str, message: String) {
        self.clear_marker().await;
        let mut view = self.view.write().await;
        if view.comparison_id.as_deref() == Some(comparison_id) {
            view.is_running = false;
            view.error = Some(message);
            if let Some(run) = view.run.as_mut() {
                run.status = ComparisonStatus::Failed;
            }
        }
    }

    async fn clear_marker(&self) {
        if let Err(err) = self.store.remove(IN_FLIGHT_KEY).await {
            warn!(error = %err, "failed to clear in-flight comparison marker");
        }
    }
}

fn failure_reason(run: &ComparisonRun) -> String {
    run.error
        .clone()
        .unwrap_or_else(|| "comparison failed on the server".to_string())
}

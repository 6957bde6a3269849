//! Batch execution coordination.
//!
//! Tracks the client-side view of the batch job (`idle → running ⇄ paused →
//! idle`), its progress counters and the workers currently holding a test.
//! Also holds the canonical run list and per-run results, refreshed through
//! the reconciler so unchanged entries keep their identity.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult, OnError};
use crate::domain::models::{
    Collection, ExecutionProgress, ExecutionRequest, ExecutionStatus, ResultStatus,
    RunningTestInfo, TestResult, TestRun,
};
use crate::domain::ports::ExecutionApi;
use crate::services::reconciler::{merge_results, merge_runs};

/// Point-in-time copy of the coordinator state.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    pub status: ExecutionStatus,
    pub current_run_id: Option<String>,
    pub progress: ExecutionProgress,
    /// Claimed tests, sorted by test id.
    pub running_tests: Vec<RunningTestInfo>,
    pub error: Option<String>,
}

#[derive(Default)]
struct ExecutionState {
    status: ExecutionStatus,
    current_run_id: Option<String>,
    progress: ExecutionProgress,
    running: BTreeMap<String, RunningTestInfo>,
    runs: Collection<TestRun>,
    results: HashMap<String, Collection<TestResult>>,
    error: Option<String>,
    /// A remote start is in flight.
    starting: bool,
}

impl ExecutionState {
    fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            status: self.status,
            current_run_id: self.current_run_id.clone(),
            progress: self.progress,
            running_tests: self.running.values().cloned().collect(),
            error: self.error.clone(),
        }
    }

    fn require_run_id(&self) -> DomainResult<String> {
        self.current_run_id.clone().ok_or(DomainError::NoActiveExecution)
    }
}

/// Client-side coordinator for batch executions.
#[derive(Clone)]
pub struct ExecutionCoordinator {
    api: Arc<dyn ExecutionApi>,
    max_workers: u32,
    state: Arc<RwLock<ExecutionState>>,
}

impl ExecutionCoordinator {
    pub fn new(api: Arc<dyn ExecutionApi>, max_workers: u32) -> Self {
        Self {
            api,
            max_workers,
            state: Arc::new(RwLock::new(ExecutionState::default())),
        }
    }

    pub async fn snapshot(&self) -> ExecutionSnapshot {
        self.state.read().await.snapshot()
    }

    /// Start a batch and return its run id. Progress restarts from zero.
    ///
    /// The slot is claimed before the remote call, so a second `start` issued
    /// while the first is in flight fails with `ExecutionAlreadyRunning`.
    /// When the request names no tests the total comes from the server, or
    /// stays 0 until the first progress event.
    pub async fn start(&self, request: &ExecutionRequest) -> DomainResult<String> {
        if request.concurrency == 0 || request.concurrency > self.max_workers {
            return Err(DomainError::ValidationFailed(format!(
                "concurrency must be between 1 and {}, got {}",
                self.max_workers, request.concurrency
            )));
        }
        {
            let mut state = self.state.write().await;
            if state.status != ExecutionStatus::Idle || state.starting {
                return Err(DomainError::ExecutionAlreadyRunning(
                    state.current_run_id.clone().unwrap_or_default(),
                ));
            }
            state.starting = true;
        }

        let outcome = self.api.start_execution(request).await;
        let mut state = self.state.write().await;
        state.starting = false;
        let started = match outcome {
            Ok(started) => started,
            Err(err) => {
                state.error = Some(err.to_string());
                return Err(err);
            }
        };

        let total = if request.test_ids.is_empty() {
            started.total.unwrap_or_default()
        } else {
            u32::try_from(request.test_ids.len()).unwrap_or(u32::MAX)
        };
        state.status = ExecutionStatus::Running;
        state.current_run_id = Some(started.run_id.clone());
        state.progress = ExecutionProgress {
            total,
            ..ExecutionProgress::default()
        };
        state.running.clear();
        state.error = None;

        info!(run_id = %started.run_id, concurrency = request.concurrency, total, "execution started");
        Ok(started.run_id)
    }

    pub async fn pause(&self) -> DomainResult<()> {
        let run_id = {
            let state = self.state.read().await;
            match state.status {
                ExecutionStatus::Paused => return Ok(()),
                ExecutionStatus::Idle => {
                    return Err(DomainError::InvalidStateTransition {
                        from: state.status.to_string(),
                        to: ExecutionStatus::Paused.to_string(),
                        reason: "no execution is running".to_string(),
                    })
                }
                ExecutionStatus::Running => state.require_run_id()?,
            }
        };

        self.api.pause_execution(&run_id).await?;
        let mut state = self.state.write().await;
        if state.status == ExecutionStatus::Running {
            state.status = ExecutionStatus::Paused;
        }
        info!(run_id = %run_id, "execution paused");
        Ok(())
    }

    pub async fn resume(&self) -> DomainResult<()> {
        let run_id = {
            let state = self.state.read().await;
            match state.status {
                ExecutionStatus::Running => return Ok(()),
                ExecutionStatus::Idle => {
                    return Err(DomainError::InvalidStateTransition {
                        from: state.status.to_string(),
                        to: ExecutionStatus::Running.to_string(),
                        reason: "no execution is paused".to_string(),
                    })
                }
                ExecutionStatus::Paused => state.require_run_id()?,
            }
        };

        self.api.resume_execution(&run_id).await?;
        let mut state = self.state.write().await;
        if state.status == ExecutionStatus::Paused {
            state.status = ExecutionStatus::Running;
        }
        info!(run_id = %run_id, "execution resumed");
        Ok(())
    }

    /// Force the coordinator back to idle. The local state is reset even when
    /// the remote stop call fails; that failure is still returned.
    pub async fn stop(&self) -> DomainResult<()> {
        let run_id = self.state.read().await.current_run_id.clone();

        let remote = match &run_id {
            Some(id) => self.api.stop_execution(id).await,
            None => Ok(()),
        };

        let mut state = self.state.write().await;
        state.status = ExecutionStatus::Idle;
        state.running.clear();
        if let Err(err) = &remote {
            warn!(error = %err, "remote stop failed; local state reset anyway");
            state.error = Some(err.to_string());
        }
        info!(run_id = ?run_id, "execution stopped");
        remote
    }

    /// Rehydrate from a job already executing server-side (e.g. after a restart).
    pub async fn check_active(&self) -> DomainResult<ExecutionSnapshot> {
        let active = self.api.get_active_execution().await?;
        let mut state = self.state.write().await;

        if active.active {
            state.status = match active.status {
                Some(ExecutionStatus::Paused) => ExecutionStatus::Paused,
                _ => ExecutionStatus::Running,
            };
            state.current_run_id = active.run_id.clone();
            state.progress = active.progress.unwrap_or_default();
            state.running = active
                .workers
                .into_iter()
                .map(|w| (w.test_id.clone(), w))
                .collect();
            info!(
                run_id = ?state.current_run_id,
                workers = state.running.len(),
                "rehydrated active execution"
            );
        } else if state.status != ExecutionStatus::Idle {
            debug!("server reports no active execution; returning to idle");
            state.status = ExecutionStatus::Idle;
            state.running.clear();
        }

        Ok(state.snapshot())
    }

    /// A worker picked up a test.
    pub async fn worker_claimed(&self, info: RunningTestInfo) {
        let mut state = self.state.write().await;
        if state.running.len() >= self.max_workers as usize && !state.running.contains_key(&info.test_id) {
            warn!(
                test_id = %info.test_id,
                max_workers = self.max_workers,
                "more tests claimed than configured workers"
            );
        }
        state.running.insert(info.test_id.clone(), info);
    }

    /// A worker finished its test; counters advance and the result is recorded.
    ///
    /// A repeated completion for a test whose result is already final only
    /// replaces the stored result.
    pub async fn worker_finished(&self, result: TestResult) {
        let mut state = self.state.write().await;
        let claimed = state.running.remove(&result.test_id).is_some();
        let run_id = state.current_run_id.clone();
        let existing = run_id
            .as_ref()
            .and_then(|id| state.results.get(id).cloned())
            .unwrap_or_default();
        let already_final = existing
            .iter()
            .any(|r| r.test_id == result.test_id && r.status.is_final());

        if claimed || !already_final {
            state.progress.completed += 1;
            match result.status {
                ResultStatus::Passed => state.progress.passed += 1,
                ResultStatus::Failed | ResultStatus::Error => state.progress.failed += 1,
                ResultStatus::Running | ResultStatus::Skipped => {}
            }
        } else {
            debug!(test_id = %result.test_id, "repeated completion; counters unchanged");
        }

        let Some(run_id) = run_id else {
            return;
        };
        let mut incoming: Vec<Arc<TestResult>> = existing.iter().cloned().collect();
        match incoming.iter().position(|r| r.test_id == result.test_id) {
            Some(index) => incoming[index] = Arc::new(result),
            None => incoming.push(Arc::new(result)),
        }
        let merged = merge_results(&existing, Arc::new(incoming));
        state.results.insert(run_id, merged);
    }

    pub async fn update_progress(&self, progress: ExecutionProgress) {
        self.state.write().await.progress = progress;
    }

    /// The whole batch finished. Progress and run id stay for inspection.
    pub async fn batch_completed(&self) {
        let mut state = self.state.write().await;
        state.status = ExecutionStatus::Idle;
        state.running.clear();
        info!(run_id = ?state.current_run_id, progress = ?state.progress, "execution completed");
    }

    pub async fn runs(&self) -> Collection<TestRun> {
        Arc::clone(&self.state.read().await.runs)
    }

    pub async fn results(&self, run_id: &str) -> Collection<TestResult> {
        self.state.read().await.results.get(run_id).cloned().unwrap_or_default()
    }

    /// Refresh the run list; unchanged runs keep their identity.
    pub async fn refresh_runs(&self, on_error: OnError) -> DomainResult<Collection<TestRun>> {
        match self.api.list_runs().await {
            Ok(runs) => {
                let incoming: Collection<TestRun> = Arc::new(runs.into_iter().map(Arc::new).collect());
                let mut state = self.state.write().await;
                state.runs = merge_runs(&state.runs, incoming);
                Ok(Arc::clone(&state.runs))
            }
            Err(err) => {
                self.handle_refresh_error(err, on_error).await?;
                Ok(self.runs().await)
            }
        }
    }

    /// Refresh one run and its results.
    pub async fn refresh_run(&self, run_id: &str, on_error: OnError) -> DomainResult<Option<TestRun>> {
        let fetched = match self.api.get_run(run_id).await {
            Ok(run) => run,
            Err(err) => return self.handle_refresh_error(err, on_error).await.map(|()| None),
        };

        let mut state = self.state.write().await;
        let existing_results = state.results.get(run_id).cloned().unwrap_or_default();
        let results = merge_results(&existing_results, Arc::clone(&fetched.results));
        state.results.insert(run_id.to_string(), Arc::clone(&results));

        let mut incoming: Vec<Arc<TestRun>> = state.runs.iter().cloned().collect();
        let run = Arc::new(fetched);
        match incoming.iter().position(|r| r.run_id == run.run_id) {
            Some(index) => incoming[index] = Arc::clone(&run),
            None => incoming.insert(0, Arc::clone(&run)),
        }
        state.runs = merge_runs(&state.runs, Arc::new(incoming));

        if state.current_run_id.as_deref() == Some(run_id) && run.status.is_terminal() {
            state.status = ExecutionStatus::Idle;
            state.running.clear();
        }

        let mut view = (*run).clone();
        view.results = results;
        Ok(Some(view))
    }

    async fn handle_refresh_error(&self, err: DomainError, on_error: OnError) -> DomainResult<()> {
        match on_error {
            OnError::Surface => {
                self.state.write().await.error = Some(err.to_string());
                Err(err)
            }
            OnError::Suppress => {
                debug!(error = %err, "suppressed refresh error");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ActiveExecution, ExecutionStarted, RunStatus};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeExecutionApi {
        calls: Mutex<Vec<String>>,
        active: Mutex<ActiveExecution>,
        runs: Mutex<Vec<TestRun>>,
        fail_stop: bool,
        queued_total: Option<u32>,
    }

    impl FakeExecutionApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutionApi for FakeExecutionApi {
        async fn start_execution(&self, _request: &ExecutionRequest) -> DomainResult<ExecutionStarted> {
            self.calls.lock().unwrap().push("start".into());
            tokio::task::yield_now().await;
            Ok(ExecutionStarted {
                run_id: "run-1".into(),
                status: RunStatus::Running,
                total: self.queued_total,
            })
        }

        async fn get_active_execution(&self) -> DomainResult<ActiveExecution> {
            Ok(self.active.lock().unwrap().clone())
        }

        async fn stop_execution(&self, run_id: &str) -> DomainResult<()> {
            self.calls.lock().unwrap().push(format!("stop:{run_id}"));
            if self.fail_stop {
                return Err(DomainError::Remote("connection reset".into()));
            }
            Ok(())
        }

        async fn pause_execution(&self, run_id: &str) -> DomainResult<()> {
            self.calls.lock().unwrap().push(format!("pause:{run_id}"));
            Ok(())
        }

        async fn resume_execution(&self, run_id: &str) -> DomainResult<()> {
            self.calls.lock().unwrap().push(format!("resume:{run_id}"));
            Ok(())
        }

        async fn list_runs(&self) -> DomainResult<Vec<TestRun>> {
            Ok(self.runs.lock().unwrap().clone())
        }

        async fn get_run(&self, run_id: &str) -> DomainResult<TestRun> {
            self.runs
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.run_id == run_id)
                .cloned()
                .ok_or_else(|| DomainError::Remote(format!("no run {run_id}")))
        }
    }

    fn request() -> ExecutionRequest {
        ExecutionRequest::new(2).with_tests(vec!["t1".into(), "t2".into(), "t3".into()])
    }

    #[tokio::test]
    async fn test_start_resets_progress() {
        let api = Arc::new(FakeExecutionApi::default());
        let coordinator = ExecutionCoordinator::new(api.clone(), 4);
        coordinator.update_progress(ExecutionProgress { total: 9, completed: 9, passed: 9, failed: 0 }).await;

        let run_id = coordinator.start(&request()).await.unwrap();
        assert_eq!(run_id, "run-1");

        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.status, ExecutionStatus::Running);
        assert_eq!(snapshot.progress, ExecutionProgress { total: 3, ..Default::default() });
    }

    #[tokio::test]
    async fn test_start_rejects_when_running_or_bad_concurrency() {
        let api = Arc::new(FakeExecutionApi::default());
        let coordinator = ExecutionCoordinator::new(api, 4);

        let too_many = ExecutionRequest::new(5);
        assert!(matches!(
            coordinator.start(&too_many).await,
            Err(DomainError::ValidationFailed(_))
        ));

        coordinator.start(&request()).await.unwrap();
        assert!(matches!(
            coordinator.start(&request()).await,
            Err(DomainError::ExecutionAlreadyRunning(id)) if id == "run-1"
        ));
    }

    #[tokio::test]
    async fn test_concurrent_start_reaches_server_once() {
        let api = Arc::new(FakeExecutionApi::default());
        let coordinator = ExecutionCoordinator::new(api.clone(), 4);

        let (request_a, request_b) = (request(), request());
        let (first, second) = tokio::join!(coordinator.start(&request_a), coordinator.start(&request_b));
        assert_eq!(first.unwrap(), "run-1");
        assert!(matches!(second, Err(DomainError::ExecutionAlreadyRunning(_))));
        assert_eq!(api.calls(), vec!["start"]);
        assert_eq!(coordinator.snapshot().await.status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn test_full_suite_total_comes_from_server() {
        let api = Arc::new(FakeExecutionApi {
            queued_total: Some(12),
            ..Default::default()
        });
        let coordinator = ExecutionCoordinator::new(api, 4);
        coordinator.start(&ExecutionRequest::new(2)).await.unwrap();
        assert_eq!(coordinator.snapshot().await.progress.total, 12);

        coordinator.stop().await.unwrap();
        coordinator.start(&request()).await.unwrap();
        assert_eq!(coordinator.snapshot().await.progress.total, 3);
    }

    #[tokio::test]
    async fn test_full_suite_total_unknown_until_progress() {
        let coordinator = ExecutionCoordinator::new(Arc::new(FakeExecutionApi::default()), 4);
        coordinator.start(&ExecutionRequest::new(2)).await.unwrap();
        assert_eq!(coordinator.snapshot().await.progress.total, 0);

        coordinator.update_progress(ExecutionProgress { total: 40, completed: 1, passed: 1, failed: 0 }).await;
        assert_eq!(coordinator.snapshot().await.progress.remaining(), 39);
    }

    #[tokio::test]
    async fn test_pause_resume_keep_counters() {
        let api = Arc::new(FakeExecutionApi::default());
        let coordinator = ExecutionCoordinator::new(api.clone(), 4);
        coordinator.start(&request()).await.unwrap();
        coordinator.worker_finished(TestResult::new("t1", ResultStatus::Passed)).await;

        coordinator.pause().await.unwrap();
        coordinator.pause().await.unwrap();
        assert_eq!(coordinator.snapshot().await.status, ExecutionStatus::Paused);

        coordinator.resume().await.unwrap();
        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.status, ExecutionStatus::Running);
        assert_eq!(snapshot.progress.completed, 1);
        assert_eq!(snapshot.progress.passed, 1);
        assert_eq!(api.calls(), vec!["start", "pause:run-1", "resume:run-1"]);
    }

    #[tokio::test]
    async fn test_pause_when_idle_is_invalid() {
        let coordinator = ExecutionCoordinator::new(Arc::new(FakeExecutionApi::default()), 4);
        assert!(matches!(
            coordinator.pause().await,
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_forces_idle_even_when_remote_fails() {
        let api = Arc::new(FakeExecutionApi {
            fail_stop: true,
            ..Default::default()
        });
        let coordinator = ExecutionCoordinator::new(api, 4);
        coordinator.start(&request()).await.unwrap();
        coordinator.worker_claimed(RunningTestInfo::new("t2", 1)).await;
        coordinator.pause().await.unwrap();

        assert!(coordinator.stop().await.is_err());
        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.status, ExecutionStatus::Idle);
        assert!(snapshot.running_tests.is_empty());
        assert!(snapshot.error.is_some());
    }

    #[tokio::test]
    async fn test_worker_registry_and_counters() {
        let coordinator = ExecutionCoordinator::new(Arc::new(FakeExecutionApi::default()), 4);
        coordinator.start(&request()).await.unwrap();

        coordinator.worker_claimed(RunningTestInfo::new("t2", 2)).await;
        coordinator.worker_claimed(RunningTestInfo::new("t1", 1)).await;
        let running: Vec<String> = coordinator
            .snapshot()
            .await
            .running_tests
            .into_iter()
            .map(|w| w.test_id)
            .collect();
        assert_eq!(running, vec!["t1", "t2"]);

        coordinator.worker_finished(TestResult::new("t1", ResultStatus::Failed)).await;
        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.running_tests.len(), 1);
        assert_eq!(snapshot.progress.failed, 1);
        assert_eq!(coordinator.results("run-1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_completion_counts_once() {
        let coordinator = ExecutionCoordinator::new(Arc::new(FakeExecutionApi::default()), 4);
        coordinator
            .start(&ExecutionRequest::new(2).with_tests(vec!["t1".into(), "t2".into()]))
            .await
            .unwrap();
        coordinator.worker_claimed(RunningTestInfo::new("t1", 1)).await;

        coordinator.worker_finished(TestResult::new("t1", ResultStatus::Passed)).await;
        coordinator.worker_finished(TestResult::new("t1", ResultStatus::Passed)).await;

        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.progress.completed, 1);
        assert_eq!(snapshot.progress.passed, 1);
        assert_eq!(snapshot.progress.remaining(), 1);
        assert_eq!(coordinator.results("run-1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_check_active_rehydrates() {
        let api = Arc::new(FakeExecutionApi::default());
        *api.active.lock().unwrap() = ActiveExecution {
            active: true,
            run_id: Some("run-42".into()),
            status: Some(ExecutionStatus::Running),
            progress: Some(ExecutionProgress { total: 10, completed: 4, passed: 3, failed: 1 }),
            workers: vec![RunningTestInfo::new("t5", 1), RunningTestInfo::new("t6", 2)],
        };
        let coordinator = ExecutionCoordinator::new(api, 4);

        let snapshot = coordinator.check_active().await.unwrap();
        assert_eq!(snapshot.status, ExecutionStatus::Running);
        assert_eq!(snapshot.current_run_id.as_deref(), Some("run-42"));
        assert_eq!(snapshot.progress.completed, 4);
        assert_eq!(snapshot.running_tests.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_runs_preserves_identity() {
        let api = Arc::new(FakeExecutionApi::default());
        *api.runs.lock().unwrap() = vec![TestRun::new("a").with_status(RunStatus::Completed)];
        let coordinator = ExecutionCoordinator::new(api.clone(), 4);

        let first = coordinator.refresh_runs(OnError::Surface).await.unwrap();
        let second = coordinator.refresh_runs(OnError::Surface).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        api.runs.lock().unwrap().push(TestRun::new("b"));
        let third = coordinator.refresh_runs(OnError::Surface).await.unwrap();
        assert_eq!(third.len(), 2);
        assert!(Arc::ptr_eq(&third[0], &first[0]));
    }

    #[tokio::test]
    async fn test_refresh_run_suppressed_error_keeps_state() {
        let coordinator = ExecutionCoordinator::new(Arc::new(FakeExecutionApi::default()), 4);
        let outcome = coordinator.refresh_run("missing", OnError::Suppress).await.unwrap();
        assert!(outcome.is_none());
        assert!(coordinator.snapshot().await.error.is_none());

        assert!(coordinator.refresh_run("missing", OnError::Surface).await.is_err());
        assert!(coordinator.snapshot().await.error.is_some());
    }

    #[tokio::test]
    async fn test_refresh_terminal_current_run_returns_to_idle() {
        let api = Arc::new(FakeExecutionApi::default());
        *api.runs.lock().unwrap() = vec![TestRun::new("run-1")
            .with_counts(3, 3, 0)
            .with_status(RunStatus::Completed)
            .with_results(vec![TestResult::new("t1", ResultStatus::Passed)])];
        let coordinator = ExecutionCoordinator::new(api, 4);
        coordinator.start(&request()).await.unwrap();

        let run = coordinator.refresh_run("run-1", OnError::Surface).await.unwrap().unwrap();
        assert_eq!(run.results.len(), 1);
        assert_eq!(coordinator.snapshot().await.status, ExecutionStatus::Idle);
    }
}

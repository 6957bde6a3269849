//! Batch execution CLI commands.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use futures::stream;
use serde::Serialize;
use tracing::warn;

use crate::cli::context::AppContext;
use crate::cli::output::progress::{create_progress_bar, hidden};
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::errors::OnError;
use crate::domain::models::{ExecutionRequest, TestResult, TestRun};
use crate::services::{EventRouter, ExecutionEvent, ExecutionSnapshot, LiveSessionTracker};

#[derive(Args, Debug)]
pub struct ExecutionArgs {
    #[command(subcommand)]
    pub command: ExecutionCommands,
}

#[derive(Subcommand, Debug)]
pub enum ExecutionCommands {
    /// Start a batch execution
    Start {
        /// Test ids to run; all tests when omitted
        tests: Vec<String>,
        /// Concurrent workers (defaults to execution.max_concurrent_workers)
        #[arg(short, long)]
        concurrency: Option<u32>,
        /// Only re-run tests that failed last time
        #[arg(long)]
        failed_only: bool,
        /// Wait for the run to finish and print its results
        #[arg(short, long)]
        wait: bool,
    },
    /// Show the execution currently running on the server
    Status,
    /// Pause the running execution
    Pause,
    /// Resume a paused execution
    Resume,
    /// Stop the running execution
    Stop,
    /// List recent runs
    Runs,
    /// Show one run with its results
    Show {
        /// Run ID
        run_id: String,
    },
    /// Apply a recorded event stream (one JSON event per line) and print the
    /// resulting execution and transcript state
    Replay {
        /// File of newline-delimited execution events
        file: PathBuf,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotOutput {
    #[serde(flatten)]
    pub snapshot: ExecutionSnapshot,
}

impl CommandOutput for SnapshotOutput {
    fn to_human(&self) -> String {
        let s = &self.snapshot;
        let mut lines = vec![
            format!("Status: {}", s.status),
            format!("Run: {}", s.current_run_id.as_deref().unwrap_or("-")),
            format!(
                "Progress: {}/{} ({} passed, {} failed)",
                s.progress.completed, s.progress.total, s.progress.passed, s.progress.failed
            ),
        ];
        if !s.running_tests.is_empty() {
            lines.push(String::new());
            lines.push(TableFormatter::new().format_running_tests(&s.running_tests));
        }
        if let Some(ref error) = s.error {
            lines.push(format!("Error: {error}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ActionOutput {
    pub success: bool,
    pub message: String,
}

impl CommandOutput for ActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

#[derive(Debug, Serialize)]
pub struct RunListOutput {
    pub runs: Vec<TestRun>,
    pub total: usize,
}

impl CommandOutput for RunListOutput {
    fn to_human(&self) -> String {
        if self.runs.is_empty() {
            return "No runs found.".to_string();
        }
        format!(
            "Found {} run(s):\n{}",
            self.total,
            TableFormatter::new().format_runs(&self.runs)
        )
    }
}

#[derive(Debug, Serialize)]
pub struct RunDetailOutput {
    pub run: TestRun,
}

impl CommandOutput for RunDetailOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let results: Vec<TestResult> = self.run.results.iter().map(|r| (**r).clone()).collect();
        let mut lines = vec![formatter.format_runs(std::slice::from_ref(&self.run))];
        if results.is_empty() {
            lines.push("No results recorded.".to_string());
        } else {
            lines.push(formatter.format_results(&results));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutput {
    pub applied: usize,
    pub skipped: usize,
    pub snapshot: ExecutionSnapshot,
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub test_id: String,
    pub turns: usize,
    pub api_calls: usize,
    pub is_live: bool,
}

impl CommandOutput for ReplayOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Applied {} event(s), skipped {} unreadable line(s)",
            self.applied, self.skipped
        )];
        lines.push(
            SnapshotOutput {
                snapshot: self.snapshot.clone(),
            }
            .to_human(),
        );
        for session in &self.sessions {
            lines.push(format!(
                "  {}: {} turn(s), {} api call(s){}",
                session.test_id,
                session.turns,
                session.api_calls,
                if session.is_live { " [live]" } else { "" }
            ));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: ExecutionArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let coordinator = ctx.coordinator();

    match args.command {
        ExecutionCommands::Start {
            tests,
            concurrency,
            failed_only,
            wait,
        } => {
            coordinator.check_active().await?;

            let concurrency = concurrency.unwrap_or(ctx.config.execution.max_concurrent_workers);
            let mut request = ExecutionRequest::new(concurrency).with_tests(tests);
            request.failed_only = failed_only;
            let run_id = coordinator.start(&request).await?;

            if !wait {
                let out = ActionOutput {
                    success: true,
                    message: format!("Execution started: {run_id}"),
                };
                output(&out, json_mode);
                return Ok(());
            }

            let total = u64::try_from(request.test_ids.len()).unwrap_or_default();
            let pb = if json_mode { hidden() } else { create_progress_bar(total) };
            pb.set_message(run_id.clone());
            let interval = Duration::from_millis(ctx.config.execution.poll_interval_ms);

            let run = loop {
                tokio::time::sleep(interval).await;
                let Some(run) = coordinator.refresh_run(&run_id, OnError::Suppress).await? else {
                    continue;
                };
                if run.total > 0 {
                    pb.set_length(u64::from(run.total));
                }
                pb.set_position(u64::from(run.passed + run.failed));
                if run.status.is_terminal() {
                    break run;
                }
            };
            pb.finish_and_clear();

            output(&RunDetailOutput { run }, json_mode);
        }

        ExecutionCommands::Status => {
            let snapshot = coordinator.check_active().await?;
            output(&SnapshotOutput { snapshot }, json_mode);
        }

        ExecutionCommands::Pause => {
            coordinator.check_active().await?;
            coordinator.pause().await?;
            let run_id = coordinator.snapshot().await.current_run_id.unwrap_or_default();
            let out = ActionOutput {
                success: true,
                message: format!("Execution paused: {run_id}"),
            };
            output(&out, json_mode);
        }

        ExecutionCommands::Resume => {
            coordinator.check_active().await?;
            coordinator.resume().await?;
            let run_id = coordinator.snapshot().await.current_run_id.unwrap_or_default();
            let out = ActionOutput {
                success: true,
                message: format!("Execution resumed: {run_id}"),
            };
            output(&out, json_mode);
        }

        ExecutionCommands::Stop => {
            let snapshot = coordinator.check_active().await?;
            let out = match snapshot.current_run_id {
                None => ActionOutput {
                    success: true,
                    message: "No execution running.".to_string(),
                },
                Some(run_id) => {
                    coordinator.stop().await?;
                    ActionOutput {
                        success: true,
                        message: format!("Execution stopped: {run_id}"),
                    }
                }
            };
            output(&out, json_mode);
        }

        ExecutionCommands::Runs => {
            let runs = coordinator.refresh_runs(OnError::Surface).await?;
            let out = RunListOutput {
                total: runs.len(),
                runs: runs.iter().map(|r| (**r).clone()).collect(),
            };
            output(&out, json_mode);
        }

        ExecutionCommands::Show { run_id } => {
            let run = coordinator
                .refresh_run(&run_id, OnError::Surface)
                .await?
                .with_context(|| format!("Run not found: {run_id}"))?;
            output(&RunDetailOutput { run }, json_mode);
        }

        ExecutionCommands::Replay { file } => {
            let contents = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let live = LiveSessionTracker::new();
            let router = EventRouter::new(coordinator.clone(), live.clone());

            let mut skipped = 0;
            let mut events = Vec::new();
            for (line_no, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ExecutionEvent>(line) {
                    Ok(event) => events.push(event),
                    Err(err) => {
                        warn!(line = line_no + 1, error = %err, "skipping unreadable event");
                        skipped += 1;
                    }
                }
            }
            let applied = router.consume(stream::iter(events)).await;

            let sessions = live
                .sessions()
                .await
                .into_iter()
                .map(|state| SessionSummary {
                    turns: state.turns.len(),
                    api_calls: state.api_calls.len(),
                    is_live: state.is_live,
                    test_id: state.test_id,
                })
                .collect();

            let out = ReplayOutput {
                applied,
                skipped,
                snapshot: coordinator.snapshot().await,
                sessions,
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}

//! Cross-environment comparison CLI commands.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::progress::{create_spinner_with_message, hidden};
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::errors::OnError;
use crate::domain::models::{ComparisonListEntry, ComparisonRequest, Environment};
use crate::services::{ComparisonOrchestrator, ComparisonView, ResumeOutcome};

#[derive(Args, Debug)]
pub struct CompareArgs {
    #[command(subcommand)]
    pub command: CompareCommands,
}

#[derive(Subcommand, Debug)]
pub enum CompareCommands {
    /// Start a comparison and follow it until it finishes
    Start {
        /// Test ids to replicate
        #[arg(required = true)]
        tests: Vec<String>,
        /// Environments to run on (production, sandbox_a, sandbox_b)
        #[arg(short, long, value_delimiter = ',', default_value = "production,sandbox_a,sandbox_b")]
        envs: Vec<Environment>,
        /// Return right after starting; follow later with `compare resume`
        #[arg(short, long)]
        detach: bool,
    },
    /// Pick up the comparison left in flight by an earlier invocation
    Resume,
    /// Show the results of one comparison
    Show {
        /// Comparison ID
        comparison_id: String,
    },
    /// List past comparisons
    History,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonViewOutput {
    #[serde(flatten)]
    pub view: ComparisonView,
}

impl CommandOutput for ComparisonViewOutput {
    fn to_human(&self) -> String {
        let view = &self.view;
        let formatter = TableFormatter::new();
        let status = view
            .run
            .as_ref()
            .map_or("unknown", |run| run.status.as_str());
        let mut lines = vec![format!(
            "Comparison: {} ({status})",
            view.comparison_id.as_deref().unwrap_or("-")
        )];
        if view.matrix.is_empty() {
            lines.push("No results yet.".to_string());
        } else {
            lines.push(formatter.format_matrix(&view.matrix));
        }
        lines.push(formatter.format_summary(&view.summary));
        if !view.summary.improvements.is_empty() {
            lines.push(format!("Improved: {}", view.summary.improvements.join(", ")));
        }
        if !view.summary.regressions.is_empty() {
            lines.push(format!("Regressed: {}", view.summary.regressions.join(", ")));
        }
        if let Some(ref error) = view.error {
            lines.push(format!("Error: {error}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonActionOutput {
    pub success: bool,
    pub message: String,
    pub comparison_id: Option<String>,
}

impl CommandOutput for ComparisonActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryOutput {
    pub comparisons: Vec<ComparisonListEntry>,
    pub total: usize,
}

impl CommandOutput for HistoryOutput {
    fn to_human(&self) -> String {
        if self.comparisons.is_empty() {
            return "No comparisons found.".to_string();
        }
        format!(
            "Found {} comparison(s):\n{}",
            self.total,
            TableFormatter::new().format_history(&self.comparisons)
        )
    }
}

pub async fn execute(args: CompareArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let orchestrator = ctx.comparisons();

    match args.command {
        CompareCommands::Start { tests, envs, detach } => {
            let request = ComparisonRequest::new(envs, tests);
            let started = orchestrator.start(&request).await?;

            if detach {
                orchestrator.cancel_polling().await;
                let out = ComparisonActionOutput {
                    success: true,
                    message: format!(
                        "Comparison started: {}. Follow it with `testflow compare resume`.",
                        started.comparison_id
                    ),
                    comparison_id: Some(started.comparison_id),
                };
                output(&out, json_mode);
                return Ok(());
            }

            follow(&orchestrator, &started.comparison_id, json_mode).await?;
        }

        CompareCommands::Resume => match orchestrator.resume().await? {
            ResumeOutcome::NothingToResume => {
                let out = ComparisonActionOutput {
                    success: true,
                    message: "No comparison in flight.".to_string(),
                    comparison_id: None,
                };
                output(&out, json_mode);
            }
            ResumeOutcome::LoadedFinal { .. } => {
                output(&ComparisonViewOutput { view: orchestrator.view().await }, json_mode);
            }
            ResumeOutcome::Resumed { comparison_id } => {
                follow(&orchestrator, &comparison_id, json_mode).await?;
            }
        },

        CompareCommands::Show { comparison_id } => {
            orchestrator
                .load(&comparison_id)
                .await
                .with_context(|| format!("Failed to load comparison {comparison_id}"))?;
            output(&ComparisonViewOutput { view: orchestrator.view().await }, json_mode);
        }

        CompareCommands::History => {
            let comparisons = orchestrator.refresh_history(OnError::Surface).await?;
            let out = HistoryOutput {
                total: comparisons.len(),
                comparisons,
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}

/// Watch the poll loop until it ends. Ctrl-C stops watching but leaves the
/// in-flight marker so `compare resume` can pick the job up again.
async fn follow(orchestrator: &ComparisonOrchestrator, comparison_id: &str, json_mode: bool) -> Result<()> {
    let spinner = if json_mode {
        hidden()
    } else {
        create_spinner_with_message(format!("comparison {comparison_id} running"))
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while orchestrator.is_polling().await {
        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(500)) => {
                let view = orchestrator.view().await;
                spinner.set_message(format!(
                    "comparison {comparison_id} running, {} test(s) reported",
                    view.matrix.len()
                ));
            }
            _ = &mut ctrl_c => {
                orchestrator.cancel_polling().await;
                spinner.finish_and_clear();
                let out = ComparisonActionOutput {
                    success: true,
                    message: format!(
                        "Stopped following {comparison_id}. Resume with `testflow compare resume`."
                    ),
                    comparison_id: Some(comparison_id.to_string()),
                };
                output(&out, json_mode);
                return Ok(());
            }
        }
    }
    spinner.finish_and_clear();

    if let Some(result) = orchestrator.wait().await {
        result?;
    }
    output(&ComparisonViewOutput { view: orchestrator.view().await }, json_mode);
    Ok(())
}

//! Workflow CLI commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::progress::{create_spinner_with_message, hidden};
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{ExecutionRequest, WorkflowPhase};
use crate::services::{WorkflowOptions, WorkflowOutcome, WorkflowRunner};

#[derive(Args, Debug)]
pub struct WorkflowArgs {
    #[command(subcommand)]
    pub command: WorkflowCommands,
}

#[derive(Subcommand, Debug)]
pub enum WorkflowCommands {
    /// Run test → analyze → fix → verify → deploy until the workflow settles
    Run {
        /// Test ids for the testing phase; all tests when omitted
        tests: Vec<String>,
        /// Start at this phase; earlier phases are marked skipped
        #[arg(long, value_name = "PHASE")]
        skip_to: Option<WorkflowPhase>,
        /// Existing test run to analyze when skipping past testing
        #[arg(short, long)]
        run: Option<String>,
        /// Concurrent workers for the testing phase
        #[arg(short, long)]
        concurrency: Option<u32>,
        /// Diagnose with the rule-based analyzer only
        #[arg(long)]
        no_llm: bool,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutput {
    pub succeeded: bool,
    #[serde(flatten)]
    pub outcome: WorkflowOutcome,
}

impl CommandOutput for WorkflowOutput {
    fn to_human(&self) -> String {
        let run = &self.outcome.run;
        let mut lines = vec![format!("Workflow {}", run.id)];
        lines.push(TableFormatter::new().format_phases(run));
        lines.push(format!("Fix iterations: {}", run.fix_iterations));
        match self.outcome.failed_phase {
            Some(phase) => lines.push(format!("Workflow stopped: {phase} phase failed")),
            None => lines.push("Workflow finished".to_string()),
        }
        lines.join("\n")
    }
}

pub async fn execute(args: WorkflowArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    match args.command {
        WorkflowCommands::Run {
            tests,
            skip_to,
            run,
            concurrency,
            no_llm,
        } => {
            let concurrency = concurrency.unwrap_or(ctx.config.execution.max_concurrent_workers);
            let request = ExecutionRequest::new(concurrency).with_tests(tests);
            let mut options = WorkflowOptions::from_config(&ctx.config, request);
            options.run_id = run;
            if no_llm {
                options.use_llm_diagnosis = false;
            }

            let mut runner = WorkflowRunner::new(ctx.coordinator(), ctx.fixes(), ctx.api.clone(), options);

            let spinner = if json_mode {
                hidden()
            } else {
                create_spinner_with_message("workflow running")
            };
            let outcome = runner.run(skip_to).await;
            spinner.finish_and_clear();

            let outcome = outcome?;
            let succeeded = outcome.succeeded();
            output(&WorkflowOutput { succeeded, outcome }, json_mode);
            if !succeeded {
                // the outcome was already printed; only the exit status remains
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

//! Fix review CLI commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, truncate, CommandOutput, TableFormatter};
use crate::domain::models::{BatchApplyReport, Fix, FixStatus, VerificationReport};

#[derive(Args, Debug)]
pub struct FixArgs {
    /// Only consider fixes generated for this run
    #[arg(short, long, global = true)]
    pub run: Option<String>,

    #[command(subcommand)]
    pub command: FixCommands,
}

#[derive(Subcommand, Debug)]
pub enum FixCommands {
    /// List generated fixes
    List {
        /// Filter by status (pending, applied, verified, rejected)
        #[arg(short, long)]
        status: Option<FixStatus>,
    },
    /// Apply fixes; all pending fixes when no ids are given
    Apply {
        fix_ids: Vec<String>,
    },
    /// Verify applied fixes; all applied fixes when no ids are given
    Verify {
        fix_ids: Vec<String>,
    },
    /// Reject a fix (pending → rejected, applied → pending)
    Reject {
        fix_id: String,
    },
}

#[derive(Debug, Serialize)]
pub struct FixListOutput {
    pub fixes: Vec<Fix>,
    pub total: usize,
}

impl CommandOutput for FixListOutput {
    fn to_human(&self) -> String {
        if self.fixes.is_empty() {
            return "No fixes found.".to_string();
        }
        format!(
            "Found {} fix(es):\n{}",
            self.total,
            TableFormatter::new().format_fixes(&self.fixes)
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutput {
    pub applied: usize,
    pub failed: usize,
    #[serde(flatten)]
    pub report: BatchApplyReport,
}

impl CommandOutput for ApplyOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Applied {} fix(es), {} failed", self.applied, self.failed)];
        for outcome in &self.report.results {
            if outcome.success {
                lines.push(format!(
                    "  ✓ {} {}",
                    outcome.fix_id,
                    outcome.new_version.as_deref().unwrap_or("")
                ));
            } else {
                lines.push(format!(
                    "  ✗ {}: {}",
                    outcome.fix_id,
                    truncate(outcome.error.as_deref().unwrap_or("unknown error"), 80)
                ));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutput {
    pub verified: Vec<String>,
    #[serde(flatten)]
    pub report: VerificationReport,
}

impl CommandOutput for VerifyOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Verification {}: {} of {} fix(es) verified",
            if self.report.overall_effective { "effective" } else { "not effective" },
            self.verified.len(),
            self.report.fix_ids.len()
        )];
        for result in &self.report.results {
            lines.push(format!(
                "  {} {}{}",
                if result.effective { "✓" } else { "✗" },
                result.fix_id,
                result
                    .test_id
                    .as_deref()
                    .map(|t| format!(" ({t})"))
                    .unwrap_or_default()
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct RejectOutput {
    pub fix: Fix,
}

impl CommandOutput for RejectOutput {
    fn to_human(&self) -> String {
        format!("Fix {} is now {}", self.fix.fix_id, self.fix.status)
    }
}

pub async fn execute(args: FixArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let tracker = ctx.fixes();
    tracker.refresh(args.run.as_deref()).await?;

    match args.command {
        FixCommands::List { status } => {
            let fixes = match status {
                Some(status) => tracker.with_status(status).await,
                None => tracker.fixes().await,
            };
            let out = FixListOutput {
                total: fixes.len(),
                fixes,
            };
            output(&out, json_mode);
        }

        FixCommands::Apply { fix_ids } => {
            let fix_ids = if fix_ids.is_empty() {
                tracker.pending_ids().await
            } else {
                fix_ids
            };
            let report = tracker.apply_batch(&fix_ids).await?;
            let applied = report.results.iter().filter(|r| r.success).count();
            let out = ApplyOutput {
                applied,
                failed: report.results.len() - applied,
                report,
            };
            output(&out, json_mode);
        }

        FixCommands::Verify { fix_ids } => {
            let fix_ids = if fix_ids.is_empty() {
                tracker.applied_ids().await
            } else {
                fix_ids
            };
            if fix_ids.is_empty() {
                anyhow::bail!("No applied fixes to verify");
            }
            let report = tracker.verify(&fix_ids).await?;
            let verified = tracker
                .verified_ids()
                .await
                .into_iter()
                .filter(|id| fix_ids.contains(id))
                .collect();
            output(&VerifyOutput { verified, report }, json_mode);
        }

        FixCommands::Reject { fix_id } => {
            let fix = tracker.reject(&fix_id).await?;
            output(&RejectOutput { fix }, json_mode);
        }
    }

    Ok(())
}

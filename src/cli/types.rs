//! CLI type definitions
//!
//! Clap structures for the top-level command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::commands::compare::CompareArgs;
use crate::cli::commands::execution::ExecutionArgs;
use crate::cli::commands::fix::FixArgs;
use crate::cli::commands::workflow::WorkflowArgs;

#[derive(Parser, Debug)]
#[command(name = "testflow")]
#[command(about = "Testflow - test, diagnose, fix, verify and deploy agent test suites", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .testflow/
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Keep client state in memory; nothing is written to the state database
    #[arg(long, global = true)]
    pub ephemeral: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start, watch and control batch executions
    Execution(ExecutionArgs),

    /// Run tests across production and sandbox environments
    Compare(CompareArgs),

    /// Review, apply, verify and deploy fixes
    Fix(FixArgs),

    /// Drive the test → analyze → fix → verify → deploy loop
    Workflow(WorkflowArgs),
}

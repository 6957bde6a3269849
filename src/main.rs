//! Testflow CLI entry point.

use anyhow::Context;
use clap::Parser;

use testflow::cli::{handle_error, AppContext, Cli, Commands};
use testflow::infrastructure::config::ConfigLoader;
use testflow::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load().context("Failed to load .testflow configuration")?,
    };

    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;
    let ctx = AppContext::build(config, cli.ephemeral).await?;

    match cli.command {
        Commands::Execution(args) => testflow::cli::commands::execution::execute(args, &ctx, cli.json).await,
        Commands::Compare(args) => testflow::cli::commands::compare::execute(args, &ctx, cli.json).await,
        Commands::Fix(args) => testflow::cli::commands::fix::execute(args, &ctx, cli.json).await,
        Commands::Workflow(args) => testflow::cli::commands::workflow::execute(args, &ctx, cli.json).await,
    }
}

//! Leafwise CLI - plant disease scanning and the growers' forum from the terminal

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::ask::run_ask;
use crate::commands::auth_cmd::run_auth;
use crate::commands::comments::run_comments;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::library::run_library;
use crate::commands::posts::run_posts;
use crate::commands::scans::{run_scan, run_scans};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive: Directive = "leafwise=info"
        .parse()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Config { command } => run_config(command, profile)?,
        Commands::Auth { command } => run_auth(command, profile).await?,
        Commands::Posts { command } => run_posts(command, profile).await?,
        Commands::Comments { command } => run_comments(command, profile).await?,
        Commands::Scans { command } => run_scans(command, profile).await?,
        Commands::Scan { image } => run_scan(&image, profile).await?,
        Commands::Library { filter } => run_library(&filter).await?,
        Commands::Ask { question } => run_ask(&question, profile).await?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}

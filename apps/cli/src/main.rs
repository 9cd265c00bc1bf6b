mod cli;
mod commands;
mod local;
mod progress;

use anyhow::Result;
use bulkup_upload::UploaderConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => UploaderConfig::load_from(path)?,
        None => UploaderConfig::load()?,
    };

    match cli.command {
        Commands::Scan {
            dir,
            unattended,
            json,
        } => commands::scan(&config, &dir, unattended, json).await,
        Commands::Upload(args) => commands::upload(&config, args).await,
        Commands::Config { write } => commands::show_config(&config, write),
    }
}

// eSIM device crawler
//
// `run` performs one crawl-and-deliver cycle and exits non-zero on failure.
// `serve` exposes the same cycle behind an HTTP trigger.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use esim_crawler::cleanup::{log_stale_log_removal, remove_stale_log};
use esim_crawler::logging::init_logging;
use esim_crawler::server::{AppState, serve};
use esim_crawler::{ChromeFetcher, Config, Pipeline};

#[derive(Parser)]
#[command(name = "esim-crawler")]
#[command(about = "Crawl the eSIM compatible device list and deliver it to a webhook")]
struct Cli {
    /// YAML config file (defaults to $ESIM_CRAWLER_CONFIG, then ./config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one crawl-and-deliver cycle
    Run,
    /// Serve the HTTP trigger endpoint
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // The previous log must go before the appender reopens it
    let stale_log = config
        .logging
        .file
        .then(|| remove_stale_log(&config.files.log_file));
    let _log_guard = init_logging(&config.logging, &config.files.log_file)
        .context("Failed to initialize logging")?;
    if let Some(removal) = &stale_log {
        log_stale_log_removal(&config.files.log_file, removal);
    }

    let fetcher = Arc::new(ChromeFetcher::new(&config));
    let pipeline = Pipeline::new(config.clone(), fetcher).context("Failed to build pipeline")?;

    match cli.command {
        Commands::Run => {
            let summary = pipeline.run_once().await?;
            tracing::info!(
                outcome = summary.outcome,
                devices = summary.device_count,
                attempts = summary.delivery_attempts,
                "Run finished"
            );
            Ok(())
        }
        Commands::Serve => {
            let state = AppState::new(Arc::new(pipeline));
            serve(state, &config.server.host, config.server.port)
                .await
                .context("Trigger server failed")
        }
    }
}

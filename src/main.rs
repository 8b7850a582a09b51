//! Main entry point for the animal-loader CLI

use animal_loader::cli::{Cli, Commands};
use animal_loader::shutdown::ShutdownCoordinator;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    // Check if JSON output is requested via environment variable
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("animal_loader=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    // Ctrl+C stops pagination; in-flight retries still drain before exit.
    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing in-flight work...");
                shutdown.request_shutdown();
            }
        }
    });

    let result = match cli.command {
        Commands::Run(ref args) => args
            .execute(shutdown.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Probe(ref args) => args.execute().await.map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

//! Run and probe command implementations

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::CliError;
use crate::config::LoaderConfig;
use crate::fetcher::ApiClient;
use crate::metrics;
use crate::pipeline::Pipeline;
use crate::shutdown::SharedShutdown;

/// Upper bound on the retry pool size to keep the source from being hammered
/// by our own recovery traffic.
const MAX_RETRY_CONCURRENCY: usize = 64;

/// Parse and validate a retry-pool concurrency value.
fn parse_retry_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("retry concurrency must be at least 1".to_string());
    }
    if value > MAX_RETRY_CONCURRENCY {
        return Err(format!(
            "retry concurrency {value} exceeds maximum of {MAX_RETRY_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Animal loader command line interface
#[derive(Debug, Parser)]
#[command(name = "animal-loader", version, about = "Load animals from the shelter API to their new home")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a full extract-transform-load run
    Run(RunArgs),
    /// Check that the source API is reachable and report its page count
    Probe(ProbeArgs),
}

/// Arguments for the `run` command
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Base URL of the animal API
    #[arg(long, env = "BASE_URL", default_value = crate::config::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Records per posted batch (the destination caps this at 100)
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = crate::config::DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size: usize,

    /// Retry budget per transiently failing call
    #[arg(long, env = "MAX_RETRIES", default_value_t = crate::config::DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Lower bound of the randomized retry wait, in seconds
    #[arg(long, env = "RETRY_WAIT_MIN", default_value_t = crate::config::DEFAULT_RETRY_WAIT_MIN_SECS)]
    pub retry_wait_min: u64,

    /// Upper bound of the randomized retry wait, in seconds
    #[arg(long, env = "RETRY_WAIT_MAX", default_value_t = crate::config::DEFAULT_RETRY_WAIT_MAX_SECS)]
    pub retry_wait_max: u64,

    /// Concurrent retry operations in flight at once
    #[arg(long, env = "RETRY_CONCURRENCY", value_parser = parse_retry_concurrency, default_value_t = crate::config::DEFAULT_RETRY_CONCURRENCY)]
    pub retry_concurrency: usize,

    /// Per-request timeout, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = crate::config::DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,

    /// Skip TLS certificate verification
    #[arg(long, env = "INSECURE_SKIP_TLS_VERIFY")]
    pub insecure: bool,

    /// Stop after reading this many listing pages
    #[arg(long, env = "MAX_PAGES")]
    pub max_pages: Option<u32>,

    /// Expose Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl RunArgs {
    /// Map arguments to a validated run configuration.
    pub fn to_config(&self) -> Result<LoaderConfig, CliError> {
        let config = LoaderConfig {
            base_url: self.base_url.clone(),
            max_batch_size: self.max_batch_size,
            max_retries: self.max_retries,
            retry_wait_min: Duration::from_secs(self.retry_wait_min),
            retry_wait_max: Duration::from_secs(self.retry_wait_max),
            retry_concurrency: self.retry_concurrency,
            request_timeout: Duration::from_secs(self.request_timeout),
            verify_tls: !self.insecure,
            max_pages: self.max_pages,
        };
        config.validate().map_err(CliError::InvalidArgument)?;
        Ok(config)
    }

    /// Execute the run command.
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = self.to_config()?;

        if let Some(addr) = self.metrics_addr {
            metrics::init_metrics(addr)
                .await
                .map_err(|e| CliError::Configuration(e.to_string()))?;
        }

        let pipeline = Pipeline::new(config)
            .map_err(|e| CliError::Configuration(format!("failed to build HTTP client: {e}")))?
            .with_shutdown(shutdown);

        let outcome = pipeline.run().await;

        if outcome.is_clean() {
            info!(
                loaded = outcome.loaded,
                pages_read = outcome.pages_read,
                batches_posted = outcome.batches_posted,
                "All animals found home"
            );
        } else {
            warn!(
                loaded = outcome.loaded,
                failed = outcome.failed.len(),
                pages_failed = outcome.pages_failed.len(),
                "Run completed with permanent failures"
            );
            for item in &outcome.failed {
                warn!(animal = item.id, error = %item.error, "Animal not loaded");
            }
            for page in &outcome.pages_failed {
                warn!(page = page.page, error = %page.error, "Page not read");
            }
        }

        Ok(())
    }
}

/// Arguments for the `probe` command
#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Base URL of the animal API
    #[arg(long, env = "BASE_URL", default_value = crate::config::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Per-request timeout, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = crate::config::DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,

    /// Skip TLS certificate verification
    #[arg(long, env = "INSECURE_SKIP_TLS_VERIFY")]
    pub insecure: bool,
}

impl ProbeArgs {
    /// Execute the probe command.
    pub async fn execute(&self) -> Result<(), CliError> {
        let config = LoaderConfig {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout),
            verify_tls: !self.insecure,
            ..LoaderConfig::default()
        };
        config.validate().map_err(CliError::InvalidArgument)?;

        let client = Arc::new(ApiClient::new(&config).map_err(|e| {
            CliError::Configuration(format!("failed to build HTTP client: {e}"))
        })?);

        let listing = client.fetch_listing(1).await?;
        info!(
            total_pages = listing.total_pages,
            first_page_items = listing.items.len(),
            "Source API reachable"
        );
        println!(
            "source ok: {} pages, {} animals on page 1",
            listing.total_pages,
            listing.items.len()
        );
        Ok(())
    }
}

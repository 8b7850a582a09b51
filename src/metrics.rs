//! Production observability metrics for the animal loader
//!
//! Uses the `metrics` crate facade for low-overhead collection; every helper
//! is a no-op until [`init_metrics`] installs the Prometheus exporter, so
//! the hot paths can record unconditionally.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

/// Initialize the metrics system with a Prometheus scrape endpoint.
///
/// Called once at startup when metrics are enabled; idempotent.
pub async fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the animal API"
    );

    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );

    describe_counter!(
        "retries_scheduled_total",
        Unit::Count,
        "Total number of tasks handed to the background retry pool"
    );

    describe_counter!(
        "retries_total",
        Unit::Count,
        "Total number of retry attempts issued"
    );

    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );

    describe_counter!(
        "pages_read_total",
        Unit::Count,
        "Listing pages successfully read"
    );

    describe_counter!(
        "batches_posted_total",
        Unit::Count,
        "Batches the destination confirmed"
    );

    describe_histogram!(
        "batch_size_records",
        Unit::Count,
        "Records per confirmed batch"
    );

    describe_counter!(
        "batch_failures_total",
        Unit::Count,
        "Batches that permanently failed"
    );

    describe_counter!(
        "records_loaded_total",
        Unit::Count,
        "Records confirmed loaded by the destination"
    );

    describe_counter!(
        "records_failed_total",
        Unit::Count,
        "Records that permanently failed to load"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Record a completed HTTP request with its status and timing.
pub fn record_request(endpoint: &str, status: u16, duration: Duration) {
    counter!(
        "http_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "endpoint" => endpoint.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record an HTTP request that failed at the transport level.
pub fn record_network_error(endpoint: &str, duration: Duration) {
    counter!(
        "http_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => "network_error",
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "endpoint" => endpoint.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a task handed to the background retry pool.
pub fn record_retry_scheduled() {
    counter!("retries_scheduled_total").increment(1);
}

/// Record one retry attempt and the backoff that preceded it.
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!("retry_backoff_duration_seconds").record(duration.as_secs_f64());
}

/// Record one successfully read listing page.
pub fn record_page_read() {
    counter!("pages_read_total").increment(1);
}

/// Record a confirmed batch of `size` records.
pub fn record_batch_posted(size: usize) {
    counter!("batches_posted_total").increment(1);
    histogram!("batch_size_records").record(size as f64);
}

/// Record a permanently failed batch and its contained records.
pub fn record_batch_failed(size: usize) {
    counter!("batch_failures_total").increment(1);
    counter!("records_failed_total").increment(size as u64);
}

/// Record records the destination confirmed.
pub fn record_records_loaded(count: u64) {
    counter!("records_loaded_total").increment(count);
}

/// Record records that permanently failed.
pub fn record_records_failed(count: u64) {
    counter!("records_failed_total").increment(count);
}

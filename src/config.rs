//! Loader configuration
//!
//! All knobs are collected into an explicit [`LoaderConfig`] handed to
//! [`crate::pipeline::Pipeline`] at construction, so nothing in the core
//! reads process-wide state.

use std::time::Duration;

/// Default base URL of the animal API.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3123/animals/v1";

/// Maximum records per posted batch.
/// The destination rejects anything above 100 with a 400.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Maximum number of retries for a transiently failing call.
/// 5 retries bounds a single flaky call to ~3 minutes of background work at
/// the top of the wait window without risking infinite loops.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Lower bound of the randomized retry wait, in seconds.
pub const DEFAULT_RETRY_WAIT_MIN_SECS: u64 = 3;

/// Upper bound of the randomized retry wait, in seconds.
/// The window must stay above the server's 5-15 second stall range so a
/// retry is not issued into the middle of the same stall.
pub const DEFAULT_RETRY_WAIT_MAX_SECS: u64 = 30;

/// Number of retry operations allowed in flight at once.
pub const DEFAULT_RETRY_CONCURRENCY: usize = 10;

/// Per-request timeout, in seconds.
/// Stalled responses (the server sleeps 5-15 s under chaos) must eventually
/// surface as retryable transport errors rather than hang a worker.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Run configuration for a single pipeline execution.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Base URL of the animal API, without a trailing slash
    pub base_url: String,
    /// Records per posted batch, in `[1, 100]`
    pub max_batch_size: usize,
    /// Retry budget per transiently failing call
    pub max_retries: u32,
    /// Lower bound of the randomized retry wait
    pub retry_wait_min: Duration,
    /// Upper bound of the randomized retry wait
    pub retry_wait_max: Duration,
    /// Concurrent retry operations in flight at once
    pub retry_concurrency: usize,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Whether to verify TLS certificates
    pub verify_tls: bool,
    /// Optional cap on the number of listing pages to read
    pub max_pages: Option<u32>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_wait_min: Duration::from_secs(DEFAULT_RETRY_WAIT_MIN_SECS),
            retry_wait_max: Duration::from_secs(DEFAULT_RETRY_WAIT_MAX_SECS),
            retry_concurrency: DEFAULT_RETRY_CONCURRENCY,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            verify_tls: true,
            max_pages: None,
        }
    }
}

impl LoaderConfig {
    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("Base URL cannot be empty".to_string());
        }

        if self.max_batch_size == 0 {
            return Err("Batch size must be at least 1".to_string());
        }

        if self.retry_wait_min > self.retry_wait_max {
            return Err(format!(
                "Retry wait minimum ({:?}) must not exceed maximum ({:?})",
                self.retry_wait_min, self.retry_wait_max
            ));
        }

        if self.retry_concurrency == 0 {
            return Err("Retry concurrency must be at least 1".to_string());
        }

        Ok(())
    }
}

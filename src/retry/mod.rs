//! Retry policy and background retry coordination
//!
//! [`RetryPolicy`] decides whether an outcome earns another attempt and how
//! long to wait; [`coordinator::RetryCoordinator`] owns the waiting so the
//! pagination driver never does.

pub mod coordinator;

pub use coordinator::{RetryCoordinator, TaskKey, TaskResolution, TaskValue};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::LoaderConfig;
use crate::fetcher::FetchError;

/// Decides retry eligibility and backoff waits.
///
/// The wait is drawn uniformly from a fixed `[min, max]` window on every
/// attempt; the window already dominates the server's 5-15 second stalls, so
/// no exponential scaling is applied. The random source is injectable so
/// tests can pin the sequence.
pub struct RetryPolicy {
    max_retries: u32,
    wait_min: Duration,
    wait_max: Duration,
    rng: Mutex<StdRng>,
}

impl RetryPolicy {
    /// Create a policy with an entropy-seeded random source.
    pub fn new(max_retries: u32, wait_min: Duration, wait_max: Duration) -> Self {
        Self::with_rng(max_retries, wait_min, wait_max, StdRng::from_entropy())
    }

    /// Create a policy whose waits are reproducible from `seed`.
    pub fn seeded(max_retries: u32, wait_min: Duration, wait_max: Duration, seed: u64) -> Self {
        Self::with_rng(max_retries, wait_min, wait_max, StdRng::seed_from_u64(seed))
    }

    /// Create a policy from run configuration.
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(
            config.max_retries,
            config.retry_wait_min,
            config.retry_wait_max,
        )
    }

    fn with_rng(max_retries: u32, wait_min: Duration, wait_max: Duration, rng: StdRng) -> Self {
        Self {
            max_retries,
            wait_min,
            wait_max,
            rng: Mutex::new(rng),
        }
    }

    /// Whether a call that has already been retried `attempt` times and just
    /// produced `outcome` should be retried again.
    pub fn should_retry(&self, attempt: u32, outcome: &FetchError) -> bool {
        attempt < self.max_retries && outcome.is_retryable()
    }

    /// Wait before the next attempt. The window is fixed regardless of
    /// `attempt`.
    pub fn wait_duration(&self, _attempt: u32) -> Duration {
        let min = self.wait_min.as_millis() as u64;
        let max = self.wait_max.as_millis() as u64;
        let mut rng = self.rng.lock().expect("retry rng lock poisoned");
        Duration::from_millis(rng.gen_range(min..=max))
    }

    /// Configured retry budget.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

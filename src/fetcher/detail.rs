//! Per-animal detail fetching
//!
//! The first attempt runs inline in the caller; a transient failure is
//! handed to the retry coordinator and reported as deferred, so the
//! pagination driver keeps moving while the retry pool recovers the record.

use std::sync::Arc;
use tracing::warn;

use crate::fetcher::{ApiClient, FetchError};
use crate::retry::coordinator::task_op;
use crate::retry::{RetryCoordinator, TaskKey, TaskValue};
use crate::transform::normalize;
use crate::Animal;

/// Outcome of one detail fetch dispatch.
#[derive(Debug)]
pub enum FetchDisposition {
    /// Fetched and normalized inline
    Loaded(Animal),
    /// Handed to the retry coordinator; resolves through the completion
    /// channel
    Deferred,
    /// A retry for this animal is already pending; nothing new scheduled
    Duplicate,
    /// Permanent failure, surfaced immediately
    Failed(FetchError),
}

/// Fetches and normalizes one animal's detail record.
pub struct DetailFetcher {
    client: Arc<ApiClient>,
    coordinator: RetryCoordinator,
}

impl DetailFetcher {
    /// Create a fetcher over the shared client and retry coordinator.
    pub fn new(client: Arc<ApiClient>, coordinator: RetryCoordinator) -> Self {
        Self {
            client,
            coordinator,
        }
    }

    /// Fetch the detail record for `id`, normalizing on success.
    pub async fn fetch(&self, id: u64) -> FetchDisposition {
        match self.client.fetch_detail(id).await {
            Ok(detail) => FetchDisposition::Loaded(normalize(detail)),
            Err(error) if error.is_retryable() => {
                let client = Arc::clone(&self.client);
                let accepted = self.coordinator.submit(
                    TaskKey::Animal(id),
                    error,
                    task_op(move || {
                        let client = Arc::clone(&client);
                        async move {
                            client
                                .fetch_detail(id)
                                .await
                                .map(|detail| TaskValue::Record(normalize(detail)))
                        }
                    }),
                );
                if accepted {
                    FetchDisposition::Deferred
                } else {
                    warn!(animal = id, "Detail fetch already pending retry");
                    FetchDisposition::Duplicate
                }
            }
            Err(error) => FetchDisposition::Failed(error),
        }
    }
}

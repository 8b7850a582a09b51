//! Pipeline orchestration
//!
//! One sequential driver walks the listing, dispatches detail fetches,
//! feeds normalized records to the batch loader, and absorbs background
//! retry resolutions from the coordinator's completion channel. The driver
//! blocks only on first-attempt calls; every backoff sleep happens inside a
//! coordinator worker. `run` is infallible: permanent failures are recorded
//! in the [`RunOutcome`] instead of aborting the run.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::LoaderConfig;
use crate::fetcher::{ApiClient, DetailFetcher, FetchDisposition, FetchError, PageOutcome, PageReader};
use crate::loader::{BatchDisposition, BatchLoader};
use crate::metrics;
use crate::retry::{RetryCoordinator, RetryPolicy, TaskKey, TaskResolution, TaskValue};
use crate::shutdown::SharedShutdown;
use crate::{Animal, ListedAnimal};

/// An animal that permanently failed to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    /// Animal identifier
    pub id: u64,
    /// Terminal error, rendered for reporting
    pub error: String,
}

/// A listing page that permanently failed to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPage {
    /// 1-based page index
    pub page: u32,
    /// Terminal error, rendered for reporting
    pub error: String,
}

/// Aggregate result of one pipeline run; the sole failure surface.
#[derive(Debug, Default)]
pub struct RunOutcome {
    /// Listing pages successfully read, including recovered ones
    pub pages_read: u32,
    /// Listing pages that permanently failed
    pub pages_failed: Vec<FailedPage>,
    /// Records confirmed loaded by the destination
    pub loaded: u64,
    /// Animals that permanently failed to load
    pub failed: Vec<FailedItem>,
    /// Batches the destination confirmed
    pub batches_posted: u64,
}

impl RunOutcome {
    /// Whether the run completed without any permanent failure.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.pages_failed.is_empty()
    }
}

/// Orchestrates page reading, detail fetching, transformation, and batched
/// loading for one run.
pub struct Pipeline {
    config: LoaderConfig,
    client: Arc<ApiClient>,
    policy: Arc<RetryPolicy>,
    shutdown: Option<SharedShutdown>,
}

impl Pipeline {
    /// Build a pipeline from run configuration.
    ///
    /// # Errors
    /// Fails only if the underlying HTTP client cannot be constructed.
    pub fn new(config: LoaderConfig) -> Result<Self, reqwest::Error> {
        let client = Arc::new(ApiClient::new(&config)?);
        let policy = Arc::new(RetryPolicy::from_config(&config));
        Ok(Self {
            config,
            client,
            policy,
            shutdown: None,
        })
    }

    /// Attach a shared shutdown handle; a request stops pagination early but
    /// in-flight work still drains.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Override the retry policy, e.g. with a seeded one for tests.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Execute the run to completion and return its outcome.
    pub async fn run(&self) -> RunOutcome {
        info!(base_url = %self.client.base_url(), "Starting load run");

        let (completions_tx, mut completions) = mpsc::unbounded_channel();
        let coordinator = RetryCoordinator::new(
            Arc::clone(&self.policy),
            self.config.retry_concurrency,
            completions_tx,
        );

        let mut state = RunState {
            reader: PageReader::new(
                Arc::clone(&self.client),
                coordinator.clone(),
                self.config.max_pages,
            ),
            fetcher: DetailFetcher::new(Arc::clone(&self.client), coordinator.clone()),
            loader: BatchLoader::new(
                Arc::clone(&self.client),
                coordinator.clone(),
                self.config.max_batch_size,
            ),
            outcome: RunOutcome::default(),
            outstanding: 0,
        };

        // Forward progress: one page at a time, never waiting on a retry.
        loop {
            if self.shutdown_requested() {
                warn!("Shutdown requested - stopping pagination, draining in-flight work");
                break;
            }

            match state.reader.next_page().await {
                PageOutcome::EndOfPages => break,
                PageOutcome::Items { page, items } => {
                    state.outcome.pages_read += 1;
                    metrics::record_page_read();
                    state.dispatch_page(page, items).await;
                }
                PageOutcome::Deferred { page } => {
                    debug!(page, "Listing fetch deferred to retry pool");
                    state.outstanding += 1;
                }
                PageOutcome::Failed { page, error } => {
                    error!(page, error = %error, "Listing page permanently failed");
                    state.outcome.pages_failed.push(FailedPage {
                        page,
                        error: error.to_string(),
                    });
                }
            }

            // Absorb whatever the retry pool already resolved, without
            // blocking the next page read.
            while let Ok(resolution) = completions.try_recv() {
                state.outstanding -= 1;
                state.absorb(resolution).await;
            }
        }

        // All pages dispatched; wait out the remaining retries.
        while state.outstanding > 0 {
            match completions.recv().await {
                Some(resolution) => {
                    state.outstanding -= 1;
                    state.absorb(resolution).await;
                }
                None => break,
            }
        }

        // Final partial batch, then any retry it spawned.
        if let Some(disposition) = state.loader.flush().await {
            state.apply_batch(disposition);
        }
        while state.outstanding > 0 {
            match completions.recv().await {
                Some(resolution) => {
                    state.outstanding -= 1;
                    state.absorb(resolution).await;
                }
                None => break,
            }
        }

        coordinator.drain().await;

        let outcome = state.outcome;
        info!(
            pages_read = outcome.pages_read,
            pages_failed = outcome.pages_failed.len(),
            loaded = outcome.loaded,
            failed = outcome.failed.len(),
            batches_posted = outcome.batches_posted,
            "Run complete"
        );
        outcome
    }
}

/// Mutable state owned by the driver for the duration of one run.
struct RunState {
    reader: PageReader,
    fetcher: DetailFetcher,
    loader: BatchLoader,
    outcome: RunOutcome,
    outstanding: usize,
}

impl RunState {
    /// Dispatch detail fetches for one page's items, in listing order.
    async fn dispatch_page(&mut self, page: u32, items: Vec<ListedAnimal>) {
        debug!(page, items = items.len(), "Dispatching detail fetches");
        for item in items {
            match self.fetcher.fetch(item.id).await {
                FetchDisposition::Loaded(animal) => self.load_record(animal).await,
                FetchDisposition::Deferred => self.outstanding += 1,
                FetchDisposition::Duplicate => {}
                FetchDisposition::Failed(error) => {
                    warn!(animal = item.id, error = %error, "Detail fetch permanently failed");
                    self.record_failed_item(item.id, &error);
                }
            }
        }
    }

    /// Feed one normalized record to the loader.
    async fn load_record(&mut self, animal: Animal) {
        let disposition = self.loader.accept(animal).await;
        self.apply_batch(disposition);
    }

    /// Fold a batch disposition into the outcome.
    fn apply_batch(&mut self, disposition: BatchDisposition) {
        match disposition {
            BatchDisposition::Buffered => {}
            BatchDisposition::Delivered { batch, delivered } => {
                debug!(batch, delivered, "Batch delivered inline");
                self.outcome.batches_posted += 1;
                self.outcome.loaded += delivered as u64;
                metrics::record_records_loaded(delivered as u64);
            }
            BatchDisposition::Deferred { batch } => {
                debug!(batch, "Batch post deferred to retry pool");
                self.outstanding += 1;
            }
            BatchDisposition::Failed { batch, ids, error } => {
                self.record_failed_batch(batch, ids, &error);
            }
        }
    }

    /// Fold one background retry resolution into the run.
    async fn absorb(&mut self, resolution: TaskResolution) {
        let TaskResolution {
            key,
            attempts,
            result,
        } = resolution;

        match (key, result) {
            (TaskKey::Page(page), Ok(TaskValue::Listing(listing))) => {
                info!(page, attempts, "Listing page recovered after retry");
                self.reader.observe_listing(&listing);
                self.outcome.pages_read += 1;
                metrics::record_page_read();
                self.dispatch_page(page, listing.items).await;
            }
            (TaskKey::Page(page), Err(error)) => {
                error!(page, attempts, error = %error, "Listing page permanently failed");
                self.outcome.pages_failed.push(FailedPage {
                    page,
                    error: error.to_string(),
                });
            }
            (TaskKey::Animal(id), Ok(TaskValue::Record(animal))) => {
                info!(animal = id, attempts, "Detail fetch recovered after retry");
                self.load_record(animal).await;
            }
            (TaskKey::Animal(id), Err(error)) => {
                warn!(animal = id, attempts, error = %error, "Detail fetch permanently failed");
                self.record_failed_item(id, &error);
            }
            (TaskKey::Batch(batch), Ok(TaskValue::BatchPosted)) => {
                match self.loader.resolve(batch) {
                    Some(ids) => {
                        info!(batch, attempts, size = ids.len(), "Batch recovered after retry");
                        self.outcome.batches_posted += 1;
                        self.outcome.loaded += ids.len() as u64;
                        metrics::record_batch_posted(ids.len());
                        metrics::record_records_loaded(ids.len() as u64);
                    }
                    None => warn!(batch, "Resolution for unknown batch"),
                }
            }
            (TaskKey::Batch(batch), Err(error)) => match self.loader.resolve(batch) {
                Some(ids) => self.record_failed_batch(batch, ids, &error),
                None => warn!(batch, "Resolution for unknown batch"),
            },
            (key, Ok(_)) => {
                // Task values are constructed alongside their keys; a
                // mismatch would be a coordinator bug.
                warn!(task = %key, "Mismatched retry resolution value; dropped");
            }
        }
    }

    fn record_failed_item(&mut self, id: u64, error: &FetchError) {
        metrics::record_records_failed(1);
        self.outcome.failed.push(FailedItem {
            id,
            error: error.to_string(),
        });
    }

    fn record_failed_batch(&mut self, batch: u64, ids: Vec<u64>, error: &FetchError) {
        error!(batch, size = ids.len(), error = %error, "Batch permanently failed");
        metrics::record_batch_failed(ids.len());
        let message = error.to_string();
        self.outcome.failed.extend(ids.into_iter().map(|id| FailedItem {
            id,
            error: message.clone(),
        }));
    }
}

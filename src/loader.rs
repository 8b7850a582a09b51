//! Batch accumulation and posting
//!
//! Records buffer in arrival order and are sealed into a batch when the
//! buffer reaches the configured size. A sealed batch is posted inline once;
//! a transient failure hands it to the retry coordinator while accumulation
//! continues. Composition is fixed at seal time: retries post the same
//! `Arc`'d records, and a permanently failed batch reports every contained
//! id rather than silently dropping.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::fetcher::{ApiClient, FetchError};
use crate::metrics;
use crate::retry::coordinator::task_op;
use crate::retry::{RetryCoordinator, TaskKey, TaskValue};
use crate::Animal;

/// Outcome of accepting a record or flushing the buffer.
#[derive(Debug)]
pub enum BatchDisposition {
    /// Buffered below the seal threshold; nothing posted
    Buffered,
    /// A batch was sealed and posted inline
    Delivered {
        /// Seal sequence number
        batch: u64,
        /// Records delivered
        delivered: usize,
    },
    /// A sealed batch failed transiently and was handed to the coordinator
    Deferred {
        /// Seal sequence number
        batch: u64,
    },
    /// A sealed batch failed permanently on its first attempt
    Failed {
        /// Seal sequence number
        batch: u64,
        /// Ids of every record the batch contained
        ids: Vec<u64>,
        /// Terminal error for the batch
        error: FetchError,
    },
}

/// Accumulates normalized records and posts them in bounded batches.
pub struct BatchLoader {
    client: Arc<ApiClient>,
    coordinator: RetryCoordinator,
    capacity: usize,
    buffer: Vec<Animal>,
    next_seq: u64,
    pending: HashMap<u64, Vec<u64>>,
}

impl BatchLoader {
    /// Create a loader sealing batches of `capacity` records.
    pub fn new(client: Arc<ApiClient>, coordinator: RetryCoordinator, capacity: usize) -> Self {
        Self {
            client,
            coordinator,
            capacity,
            buffer: Vec::with_capacity(capacity),
            next_seq: 1,
            pending: HashMap::new(),
        }
    }

    /// Records currently buffered below the seal threshold.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Accept one record, posting a sealed batch once the buffer fills.
    pub async fn accept(&mut self, record: Animal) -> BatchDisposition {
        self.buffer.push(record);
        if self.buffer.len() >= self.capacity {
            self.post_sealed().await
        } else {
            BatchDisposition::Buffered
        }
    }

    /// Post whatever remains in the buffer as a final, possibly smaller
    /// batch. Returns `None` when the buffer is empty.
    pub async fn flush(&mut self) -> Option<BatchDisposition> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.post_sealed().await)
    }

    /// Forget a deferred batch once its retry resolved, returning the ids it
    /// contained for outcome accounting.
    pub fn resolve(&mut self, batch: u64) -> Option<Vec<u64>> {
        self.pending.remove(&batch)
    }

    async fn post_sealed(&mut self) -> BatchDisposition {
        let batch: Vec<Animal> = std::mem::take(&mut self.buffer);
        let seq = self.next_seq;
        self.next_seq += 1;
        let ids: Vec<u64> = batch.iter().map(|animal| animal.id).collect();

        debug!(batch = seq, size = batch.len(), "Sealed batch, posting");

        match self.client.post_home(&batch).await {
            Ok(receipt) => {
                info!(batch = seq, size = ids.len(), message = %receipt.message, "Batch posted");
                metrics::record_batch_posted(ids.len());
                BatchDisposition::Delivered {
                    batch: seq,
                    delivered: ids.len(),
                }
            }
            Err(error) if error.is_retryable() => {
                // Shared between attempts so the composition never changes.
                let sealed = Arc::new(batch);
                let client = Arc::clone(&self.client);
                self.pending.insert(seq, ids);
                self.coordinator.submit(
                    TaskKey::Batch(seq),
                    error,
                    task_op(move || {
                        let client = Arc::clone(&client);
                        let sealed = Arc::clone(&sealed);
                        async move {
                            client
                                .post_home(&sealed)
                                .await
                                .map(|_| TaskValue::BatchPosted)
                        }
                    }),
                );
                BatchDisposition::Deferred { batch: seq }
            }
            Err(error) => BatchDisposition::Failed {
                batch: seq,
                ids,
                error,
            },
        }
    }
}

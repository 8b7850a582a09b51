//! Background retry coordination
//!
//! The pagination driver never sleeps on a backoff: anything that failed
//! with a retryable outcome is handed here as a [`TaskKey`] plus an async
//! operation, and a bounded pool of workers runs the wait/reissue cycle.
//! Every accepted task resolves exactly once - success, permanent failure,
//! or retry exhaustion - as a [`TaskResolution`] on the completion channel
//! supplied at construction.

use futures_util::future::BoxFuture;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, warn};

use crate::fetcher::FetchError;
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::{Animal, ListingPage};

/// Identity of a deferred unit of work.
///
/// At most one physical request per key is in flight at any time; admission
/// for a key already pending is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKey {
    /// A listing page fetch
    Page(u32),
    /// A detail fetch for one animal
    Animal(u64),
    /// A batch post, by seal sequence number
    Batch(u64),
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Page(page) => write!(f, "page {page}"),
            TaskKey::Animal(id) => write!(f, "animal {id}"),
            TaskKey::Batch(seq) => write!(f, "batch {seq}"),
        }
    }
}

/// Successful payload of a resolved task.
#[derive(Debug)]
pub enum TaskValue {
    /// A recovered listing page
    Listing(ListingPage),
    /// A recovered, already-normalized detail record
    Record(Animal),
    /// A batch that finally reached the destination
    BatchPosted,
}

/// Terminal result of one task, delivered on the completion channel.
#[derive(Debug)]
pub struct TaskResolution {
    /// Which task resolved
    pub key: TaskKey,
    /// Retries performed before resolution
    pub attempts: u32,
    /// Success payload or the terminal error
    pub result: Result<TaskValue, FetchError>,
}

/// Boxed retry operation; called once per attempt.
pub type TaskOp = Box<dyn Fn() -> BoxFuture<'static, Result<TaskValue, FetchError>> + Send + Sync>;

/// Wrap an async closure into the boxed form the coordinator stores.
pub fn task_op<F, Fut>(factory: F) -> TaskOp
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskValue, FetchError>> + Send + 'static,
{
    Box::new(move || {
        let fut: BoxFuture<'static, Result<TaskValue, FetchError>> = Box::pin(factory());
        fut
    })
}

/// Bounded-concurrency pool that owns retries for failed fetches and posts.
#[derive(Clone)]
pub struct RetryCoordinator {
    policy: Arc<RetryPolicy>,
    permits: Arc<Semaphore>,
    pending: Arc<Mutex<HashSet<TaskKey>>>,
    in_flight: Arc<watch::Sender<usize>>,
    completions: mpsc::UnboundedSender<TaskResolution>,
}

impl RetryCoordinator {
    /// Create a coordinator with `concurrency` worker slots. Resolutions are
    /// sent on `completions`.
    pub fn new(
        policy: Arc<RetryPolicy>,
        concurrency: usize,
        completions: mpsc::UnboundedSender<TaskResolution>,
    ) -> Self {
        let (in_flight, _) = watch::channel(0usize);
        Self {
            policy,
            permits: Arc::new(Semaphore::new(concurrency)),
            pending: Arc::new(Mutex::new(HashSet::new())),
            in_flight: Arc::new(in_flight),
            completions,
        }
    }

    /// Accept a task whose first attempt just failed with `first_error`.
    ///
    /// Returns `false` without scheduling anything if a task with the same
    /// key is already pending; the earlier task's resolution covers it.
    pub fn submit(&self, key: TaskKey, first_error: FetchError, op: TaskOp) -> bool {
        {
            let mut pending = self.pending.lock().expect("retry registry poisoned");
            if !pending.insert(key) {
                debug!(task = %key, "Retry already pending; duplicate trigger ignored");
                return false;
            }
        }

        self.in_flight.send_modify(|n| *n += 1);
        warn!(task = %key, error = %first_error, "Scheduling background retry");
        metrics::record_retry_scheduled();

        let this = self.clone();
        tokio::spawn(async move {
            this.run_task(key, first_error, op).await;
        });
        true
    }

    /// Number of tasks accepted but not yet resolved.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until every accepted task has resolved.
    ///
    /// Already-enqueued tasks keep running to success or exhaustion; nothing
    /// is abandoned.
    pub async fn drain(&self) {
        let mut watcher = self.in_flight.subscribe();
        // wait_for inspects the current value first, so an idle pool returns
        // immediately.
        let _ = watcher.wait_for(|in_flight| *in_flight == 0).await;
    }

    /// Worker body: sleep, reissue, requeue until resolution.
    async fn run_task(&self, key: TaskKey, first_error: FetchError, op: TaskOp) {
        let mut attempt: u32 = 0;
        let mut last_error = first_error;

        let result = loop {
            if !self.policy.should_retry(attempt, &last_error) {
                break Err(FetchError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(last_error),
                });
            }

            // The slot is held through the backoff sleep and the reissued
            // call; a further transient failure releases it and requeues.
            let permit = match self.permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => break Err(last_error),
            };

            attempt += 1;
            let wait = self.policy.wait_duration(attempt);
            debug!(
                task = %key,
                attempt,
                wait_ms = wait.as_millis() as u64,
                "Backing off before retry"
            );
            metrics::record_retry_backoff(wait, attempt);
            tokio::time::sleep(wait).await;

            let outcome = op().await;
            drop(permit);

            match outcome {
                Ok(value) => break Ok(value),
                Err(error) if error.is_retryable() => {
                    warn!(task = %key, attempt, error = %error, "Retry attempt failed; requeueing");
                    last_error = error;
                }
                Err(error) => break Err(error),
            }
        };

        self.pending
            .lock()
            .expect("retry registry poisoned")
            .remove(&key);

        match &result {
            Ok(_) => debug!(task = %key, attempts = attempt, "Background retry resolved"),
            Err(error) => {
                warn!(task = %key, attempts = attempt, error = %error, "Background retry failed permanently");
            }
        }

        // The driver may already be gone during shutdown; resolution is then
        // intentionally dropped.
        let _ = self.completions.send(TaskResolution {
            key,
            attempts: attempt,
            result,
        });
        self.in_flight.send_modify(|n| *n -= 1);
    }
}

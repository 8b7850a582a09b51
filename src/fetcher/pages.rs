//! Listing pagination
//!
//! Pages are read strictly in increasing order; the total page count is
//! discovered from the first successful listing response. A transiently
//! failing page is escalated to the retry coordinator and reading continues
//! with the next page, so one flaky page never stalls the run.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::fetcher::{ApiClient, FetchError};
use crate::retry::coordinator::task_op;
use crate::retry::{RetryCoordinator, TaskKey, TaskValue};
use crate::{ListedAnimal, ListingPage};

/// Hard upper bound on pages read in one run, against a source that never
/// reports a total.
const PAGE_SAFETY_CAP: u32 = 10_000;

/// Outcome of one `next_page` call.
#[derive(Debug)]
pub enum PageOutcome {
    /// The page was read inline; items arrive in listing order
    Items {
        /// 1-based page index
        page: u32,
        /// Animals listed on the page
        items: Vec<ListedAnimal>,
    },
    /// The first attempt failed transiently; the page will resolve through
    /// the coordinator's completion channel
    Deferred {
        /// 1-based page index
        page: u32,
    },
    /// The page failed permanently; reading continues with the next page
    Failed {
        /// 1-based page index
        page: u32,
        /// Terminal error for this page
        error: FetchError,
    },
    /// The page index moved past the discovered total or a configured cap
    EndOfPages,
}

/// Sequential reader over the listing endpoint.
pub struct PageReader {
    client: Arc<ApiClient>,
    coordinator: RetryCoordinator,
    next_page: u32,
    total_pages: Option<u32>,
    page_cap: Option<u32>,
}

impl PageReader {
    /// Create a reader starting at page 1.
    pub fn new(
        client: Arc<ApiClient>,
        coordinator: RetryCoordinator,
        page_cap: Option<u32>,
    ) -> Self {
        Self {
            client,
            coordinator,
            next_page: 1,
            total_pages: None,
            page_cap,
        }
    }

    /// Total page count, once a listing response has reported it.
    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    /// Record listing metadata from a successful response, including one
    /// recovered through the retry coordinator.
    pub fn observe_listing(&mut self, listing: &ListingPage) {
        if self.total_pages.is_none() {
            info!(total_pages = listing.total_pages, "Discovered total page count");
            self.total_pages = Some(listing.total_pages);
        }
    }

    /// Read the next page, in strictly increasing order.
    pub async fn next_page(&mut self) -> PageOutcome {
        let page = self.next_page;

        if let Some(total) = self.total_pages {
            if page > total {
                debug!(total_pages = total, "Pagination complete");
                return PageOutcome::EndOfPages;
            }
        }
        if let Some(cap) = self.page_cap {
            if page > cap {
                info!(page_cap = cap, "Configured page cap reached");
                return PageOutcome::EndOfPages;
            }
        }
        if page > PAGE_SAFETY_CAP {
            warn!(
                page_cap = PAGE_SAFETY_CAP,
                "Page safety cap reached without a discovered total; stopping"
            );
            return PageOutcome::EndOfPages;
        }

        self.next_page += 1;

        match self.client.fetch_listing(page).await {
            Ok(listing) => {
                self.observe_listing(&listing);
                if listing.items.is_empty() {
                    debug!(page, "Empty listing page");
                }
                PageOutcome::Items {
                    page,
                    items: listing.items,
                }
            }
            Err(error) if error.is_retryable() => {
                let client = Arc::clone(&self.client);
                // Page indices are unique, so admission cannot collide.
                self.coordinator.submit(
                    TaskKey::Page(page),
                    error,
                    task_op(move || {
                        let client = Arc::clone(&client);
                        async move { client.fetch_listing(page).await.map(TaskValue::Listing) }
                    }),
                );
                PageOutcome::Deferred { page }
            }
            Err(error) => PageOutcome::Failed { page, error },
        }
    }
}

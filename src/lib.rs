//! # Animal Loader Library
//!
//! A concurrent extract-transform-load pipeline for the animal shelter API.
//! Reads paginated animal listings from an unreliable source, enriches each
//! animal with a per-item detail fetch, normalizes the `friends` and
//! `born_at` fields, and posts the results to the destination endpoint in
//! bounded batches.
//!
//! ## Features
//!
//! - **Forward Progress Under Chaos**: the source API stalls and throws 5xx
//!   errors by design; failed calls are retried by a bounded background pool
//!   while pagination keeps moving
//! - **Bounded Batching**: transformed records are posted in batches of at
//!   most 100, sealed in arrival order and never recomposed
//! - **No Silent Drops**: every animal either loads or is recorded as a
//!   permanent failure in the run outcome
//! - **Deterministic Testing**: randomized backoff accepts a seeded random
//!   source
//!
//! ## Quick Start
//!
//! ```no_run
//! use animal_loader::config::LoaderConfig;
//! use animal_loader::pipeline::Pipeline;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LoaderConfig {
//!     base_url: "http://localhost:3123/animals/v1".to_string(),
//!     ..LoaderConfig::default()
//! };
//!
//! let outcome = Pipeline::new(config)?.run().await;
//! println!(
//!     "loaded {} animals across {} pages ({} permanent failures)",
//!     outcome.loaded,
//!     outcome.pages_read,
//!     outcome.failed.len()
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`] - Run configuration passed explicitly to the pipeline
//! - [`fetcher`] - HTTP primitive, page reader, and per-item detail fetcher
//! - [`transform`] - Pure normalization of raw detail records
//! - [`retry`] - Retry policy and the background retry coordinator
//! - [`loader`] - Batch accumulation and posting
//! - [`pipeline`] - Orchestration and the run outcome
//! - [`shutdown`] - Graceful shutdown coordination
//! - [`metrics`] - Optional Prometheus observability

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// CLI command implementations
pub mod cli;

/// Run configuration
pub mod config;

/// HTTP primitive and fetchers
pub mod fetcher;

/// Batch accumulation and posting
pub mod loader;

/// Observability metrics
pub mod metrics;

/// Pipeline orchestration
pub mod pipeline;

/// Retry policy and background retry coordination
pub mod retry;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Pure record normalization
pub mod transform;

// Re-export commonly used types
pub use config::LoaderConfig;
pub use pipeline::{Pipeline, RunOutcome};

/// One entry of a listing page. Only the id is needed to request the detail
/// record; the name is kept for log context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListedAnimal {
    /// Animal identifier, the handle for the detail fetch
    pub id: u64,
    /// Display name, if the listing includes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One page of the paginated listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingPage {
    /// 1-based index of this page
    pub page: u32,
    /// Total number of pages the source will serve
    pub total_pages: u32,
    /// Animals listed on this page, in listing order
    pub items: Vec<ListedAnimal>,
}

/// Raw detail record as served by the source API.
///
/// `friends` arrives as a comma-delimited string (or, from newer sources, an
/// already-split array) and `born_at` as an epoch-milliseconds number or a
/// timestamp string; both may be absent. Fields this crate does not
/// transform are captured in `extra` and passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimalDetail {
    /// Animal identifier
    pub id: u64,
    /// Display name
    pub name: String,
    /// Birth timestamp in whatever shape the source produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub born_at: Option<Value>,
    /// Friends in whatever shape the source produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friends: Option<Value>,
    /// Fields passed through without transformation
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized animal record as accepted by the destination API.
///
/// `friends` is always an ordered list (empty when the source had none) and
/// `born_at`, when present, is an RFC 3339 UTC timestamp string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Animal {
    /// Animal identifier
    pub id: u64,
    /// Display name
    pub name: String,
    /// Ordered friend names
    pub friends: Vec<String>,
    /// Birth timestamp as RFC 3339 UTC, omitted when absent or unparseable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub born_at: Option<String>,
    /// Fields passed through without transformation
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Confirmation body returned by the destination on a successful batch post.
#[derive(Debug, Clone, Deserialize)]
pub struct HomeReceipt {
    /// Human-readable confirmation, e.g. "Helped 100 find home"
    pub message: String,
}

//! Fetching from the source and destination APIs
//!
//! [`http::ApiClient`] is the HTTP primitive: one request in, a classified
//! outcome out, no retry logic. [`pages::PageReader`] walks the listing and
//! [`detail::DetailFetcher`] resolves individual animals; both escalate
//! transient failures to the retry coordinator instead of blocking.

pub mod detail;
pub mod http;
pub mod pages;

pub use detail::{DetailFetcher, FetchDisposition};
pub use http::ApiClient;
pub use pages::{PageOutcome, PageReader};

/// Fetch errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Retryable server-side failure (500, 502, 503, 504)
    #[error("server error {status} from {endpoint}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Endpoint path that failed
        endpoint: String,
    },

    /// Retryable transport-level failure (timeout, connection reset)
    #[error("network error for {endpoint}: {message}")]
    NetworkError {
        /// Endpoint path that failed
        endpoint: String,
        /// Underlying transport error
        message: String,
    },

    /// Non-retryable HTTP status; surfaces immediately as a permanent failure
    #[error("request to {endpoint} rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Endpoint path that failed
        endpoint: String,
        /// Response body, for diagnostics
        body: String,
    },

    /// Response body could not be decoded; not retryable
    #[error("failed to decode response from {endpoint}: {message}")]
    ParseError {
        /// Endpoint path that failed
        endpoint: String,
        /// Underlying decode error
        message: String,
    },

    /// A retryable failure survived the whole retry budget
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Retries performed before giving up
        attempts: u32,
        /// The last transient error observed
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether this outcome is eligible for retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::ServerError { .. } | FetchError::NetworkError { .. }
        )
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

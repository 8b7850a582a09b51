//! CLI error types and conversions

use crate::fetcher::FetchError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Fetch error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

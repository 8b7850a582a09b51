//! HTTP primitive for the animal API
//!
//! One request in, one classified outcome out. Retry discipline lives in
//! [`crate::retry`]; this client only executes a single call and maps the
//! result into the [`FetchError`] taxonomy:
//! - 2xx with a decodable body -> `Ok`
//! - 500/502/503/504 -> [`FetchError::ServerError`] (retryable)
//! - transport failure (timeout, reset) -> [`FetchError::NetworkError`] (retryable)
//! - any other non-2xx -> [`FetchError::Rejected`]
//! - undecodable body -> [`FetchError::ParseError`]

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Instant;
use tracing::debug;

use crate::config::LoaderConfig;
use crate::fetcher::{FetchError, FetchResult};
use crate::metrics;
use crate::{Animal, AnimalDetail, HomeReceipt, ListingPage};

/// Statuses the chaos middleware throws and the retry pool recovers.
const RETRYABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Unified HTTP client for all animal API interactions.
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client from run configuration.
    ///
    /// # Errors
    /// Fails only if the underlying HTTP client cannot be constructed.
    pub fn new(config: &LoaderConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;
        Ok(Self::with_client(client, config.base_url.clone()))
    }

    /// Create a client around an existing `reqwest::Client`.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one listing page.
    pub async fn fetch_listing(&self, page: u32) -> FetchResult<ListingPage> {
        self.get_json("/animals", &[("page", page.to_string())])
            .await
    }

    /// Fetch the detail record for one animal.
    pub async fn fetch_detail(&self, id: u64) -> FetchResult<AnimalDetail> {
        self.get_json(&format!("/animals/{id}"), &[]).await
    }

    /// Post a sealed batch to the destination endpoint.
    pub async fn post_home(&self, animals: &[Animal]) -> FetchResult<HomeReceipt> {
        let endpoint = "/home";
        let url = format!("{}{}", self.base_url, endpoint);
        let started = Instant::now();

        debug!(batch_size = animals.len(), "Posting batch to {}", url);

        let response = self
            .client
            .post(&url)
            .json(&animals)
            .send()
            .await
            .map_err(|e| {
                metrics::record_network_error(endpoint, started.elapsed());
                FetchError::NetworkError {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                }
            })?;

        metrics::record_request(endpoint, response.status().as_u16(), started.elapsed());
        let response = Self::check_status(endpoint, response).await?;
        response
            .json::<HomeReceipt>()
            .await
            .map_err(|e| FetchError::ParseError {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })
    }

    /// Execute a GET request with generic deserialization.
    async fn get_json<T>(&self, endpoint: &str, query: &[(&str, String)]) -> FetchResult<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let started = Instant::now();

        debug!("Making GET request to: {} with {} params", url, query.len());

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                metrics::record_network_error(endpoint, started.elapsed());
                FetchError::NetworkError {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                }
            })?;

        metrics::record_request(endpoint, response.status().as_u16(), started.elapsed());
        let response = Self::check_status(endpoint, response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::ParseError {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })
    }

    /// Map a non-2xx status into the error taxonomy.
    async fn check_status(
        endpoint: &str,
        response: reqwest::Response,
    ) -> FetchResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        if RETRYABLE_STATUSES.contains(&code) {
            return Err(FetchError::ServerError {
                status: code,
                endpoint: endpoint.to_string(),
            });
        }

        // Anything else, 501 included, is a permanent rejection.
        let body = response.text().await.unwrap_or_default();
        Err(FetchError::Rejected {
            status: code,
            endpoint: endpoint.to_string(),
            body,
        })
    }
}

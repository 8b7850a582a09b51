//! Unit tests for HTTP outcome classification
//!
//! The client itself never retries; these tests pin down which outcomes are
//! classified as retryable and which surface as permanent failures.

use animal_loader::fetcher::{ApiClient, FetchError};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::with_client(Client::new(), server.uri())
}

#[tokio::test]
async fn test_successful_detail_fetch_parses_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/animals/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "name": "Lion",
            "born_at": 1655323200000i64,
            "friends": "Tiger,Elephant",
        })))
        .mount(&server)
        .await;

    let detail = client_for(&server).fetch_detail(1).await.unwrap();
    assert_eq!(detail.id, 1);
    assert_eq!(detail.name, "Lion");
    assert_eq!(detail.friends, Some(json!("Tiger,Elephant")));
}

#[tokio::test]
async fn test_successful_listing_fetch_sends_page_param() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/animals"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 3,
            "total_pages": 5,
            "items": [{"id": 42, "name": "Heron"}],
        })))
        .mount(&server)
        .await;

    let listing = client_for(&server).fetch_listing(3).await.unwrap();
    assert_eq!(listing.page, 3);
    assert_eq!(listing.total_pages, 5);
    assert_eq!(listing.items[0].id, 42);
}

#[tokio::test]
async fn test_503_is_a_retryable_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/animals/4"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Sorry!"))
        .mount(&server)
        .await;

    let error = client_for(&server).fetch_detail(4).await.unwrap_err();
    assert!(error.is_retryable());
    assert!(matches!(error, FetchError::ServerError { status: 503, .. }));
}

#[tokio::test]
async fn test_501_is_a_permanent_rejection() {
    // 501 is server-side but outside the retryable set.
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/animals/4"))
        .respond_with(ResponseTemplate::new(501))
        .mount(&server)
        .await;

    let error = client_for(&server).fetch_detail(4).await.unwrap_err();
    assert!(!error.is_retryable());
    assert!(matches!(error, FetchError::Rejected { status: 501, .. }));
}

#[tokio::test]
async fn test_404_is_a_permanent_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/animals/999999"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let error = client_for(&server).fetch_detail(999_999).await.unwrap_err();
    assert!(!error.is_retryable());
    assert!(matches!(error, FetchError::Rejected { status: 404, .. }));
}

#[tokio::test]
async fn test_undecodable_body_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/animals/4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let error = client_for(&server).fetch_detail(4).await.unwrap_err();
    assert!(!error.is_retryable());
    assert!(matches!(error, FetchError::ParseError { .. }));
}

#[tokio::test]
async fn test_timeout_is_a_retryable_network_error() {
    let server = MockServer::start().await;
    // The chaos middleware stalls responses for seconds; a bounded client
    // timeout must turn that into a retryable transport error.
    Mock::given(method("GET"))
        .and(path("/animals/4"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_json(json!({"id": 4, "name": "Sloth"})),
        )
        .mount(&server)
        .await;

    let client = Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let api = ApiClient::with_client(client, server.uri());

    let error = api.fetch_detail(4).await.unwrap_err();
    assert!(error.is_retryable());
    assert!(matches!(error, FetchError::NetworkError { .. }));
}

#[tokio::test]
async fn test_post_home_returns_confirmation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/home"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "Helped 1 find home"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let animal = animal_loader::Animal {
        id: 1,
        name: "Lion".to_string(),
        friends: vec!["Tiger".to_string()],
        born_at: Some("2022-06-15T20:00:00Z".to_string()),
        extra: serde_json::Map::new(),
    };

    let receipt = client_for(&server).post_home(&[animal]).await.unwrap();
    assert_eq!(receipt.message, "Helped 1 find home");
}

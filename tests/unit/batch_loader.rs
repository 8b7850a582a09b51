//! Unit tests for batch sealing and flushing

use animal_loader::fetcher::ApiClient;
use animal_loader::loader::{BatchDisposition, BatchLoader};
use animal_loader::retry::{RetryCoordinator, RetryPolicy};
use animal_loader::Animal;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn make_animal(id: u64) -> Animal {
    Animal {
        id,
        name: format!("animal-{id}"),
        friends: vec!["Tiger".to_string()],
        born_at: None,
        extra: serde_json::Map::new(),
    }
}

fn loader_for(
    server: &MockServer,
    capacity: usize,
) -> (BatchLoader, mpsc::UnboundedReceiver<animal_loader::retry::TaskResolution>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let policy = Arc::new(RetryPolicy::new(
        2,
        Duration::from_millis(1),
        Duration::from_millis(3),
    ));
    let coordinator = RetryCoordinator::new(policy, 4, tx);
    let client = Arc::new(ApiClient::with_client(Client::new(), server.uri()));
    (BatchLoader::new(client, coordinator, capacity), rx)
}

async fn mount_home_ok(server: &MockServer, expected_posts: u64) {
    Mock::given(method("POST"))
        .and(path("/home"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "Helped them find home"})),
        )
        .expect(expected_posts)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_capacity_plus_one_records_yield_full_then_partial_batch() {
    let server = MockServer::start().await;
    mount_home_ok(&server, 2).await;
    let (mut loader, _rx) = loader_for(&server, 100);

    for id in 0..100 {
        let disposition = loader.accept(make_animal(id)).await;
        if id < 99 {
            assert!(matches!(disposition, BatchDisposition::Buffered));
        } else {
            assert!(matches!(
                disposition,
                BatchDisposition::Delivered {
                    batch: 1,
                    delivered: 100
                }
            ));
        }
    }

    let disposition = loader.accept(make_animal(100)).await;
    assert!(matches!(disposition, BatchDisposition::Buffered));
    assert_eq!(loader.buffered(), 1);

    let flushed = loader.flush().await.unwrap();
    assert!(matches!(
        flushed,
        BatchDisposition::Delivered {
            batch: 2,
            delivered: 1
        }
    ));
    assert_eq!(loader.buffered(), 0);

    // Exactly one full batch followed by one partial batch hit the wire.
    let requests = server.received_requests().await.unwrap();
    let sizes: Vec<usize> = requests
        .iter()
        .map(|request| {
            serde_json::from_slice::<Vec<Animal>>(&request.body)
                .unwrap()
                .len()
        })
        .collect();
    assert_eq!(sizes, vec![100, 1]);
}

#[tokio::test]
async fn test_flush_on_empty_buffer_posts_nothing() {
    let server = MockServer::start().await;
    mount_home_ok(&server, 0).await;
    let (mut loader, _rx) = loader_for(&server, 100);

    assert!(loader.flush().await.is_none());
}

#[tokio::test]
async fn test_batch_order_follows_buffer_fill_order() {
    let server = MockServer::start().await;
    mount_home_ok(&server, 1).await;
    let (mut loader, _rx) = loader_for(&server, 3);

    for id in [7, 3, 9] {
        loader.accept(make_animal(id)).await;
    }

    let requests = server.received_requests().await.unwrap();
    let posted: Vec<Animal> = serde_json::from_slice(&requests[0].body).unwrap();
    let ids: Vec<u64> = posted.iter().map(|animal| animal.id).collect();
    assert_eq!(ids, vec![7, 3, 9]);
}

#[tokio::test]
async fn test_permanent_post_failure_reports_all_contained_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/home"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Sorry, only 100 animals at a time"))
        .mount(&server)
        .await;
    let (mut loader, _rx) = loader_for(&server, 2);

    loader.accept(make_animal(1)).await;
    let disposition = loader.accept(make_animal(2)).await;

    match disposition {
        BatchDisposition::Failed { batch, ids, .. } => {
            assert_eq!(batch, 1);
            assert_eq!(ids, vec![1, 2]);
        }
        other => panic!("expected permanent batch failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_transient_post_failure_defers_and_retry_reposts_same_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/home"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_home_ok(&server, 1).await;
    let (mut loader, mut rx) = loader_for(&server, 2);

    loader.accept(make_animal(1)).await;
    let disposition = loader.accept(make_animal(2)).await;
    assert!(matches!(disposition, BatchDisposition::Deferred { batch: 1 }));

    let resolution = rx.recv().await.unwrap();
    assert!(resolution.result.is_ok());
    assert_eq!(loader.resolve(1), Some(vec![1, 2]));

    // The retried post carried the same sealed composition.
    let requests = server.received_requests().await.unwrap();
    let retried: Vec<Animal> = serde_json::from_slice(&requests.last().unwrap().body).unwrap();
    let ids: Vec<u64> = retried.iter().map(|animal| animal.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

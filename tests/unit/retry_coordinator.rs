//! Unit tests for the background retry coordinator

use animal_loader::fetcher::FetchError;
use animal_loader::retry::coordinator::task_op;
use animal_loader::retry::{RetryCoordinator, RetryPolicy, TaskKey, TaskValue};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn fast_policy(max_retries: u32) -> Arc<RetryPolicy> {
    Arc::new(RetryPolicy::new(
        max_retries,
        Duration::from_millis(1),
        Duration::from_millis(3),
    ))
}

fn transient() -> FetchError {
    FetchError::ServerError {
        status: 503,
        endpoint: "/animals/4".to_string(),
    }
}

fn permanent() -> FetchError {
    FetchError::Rejected {
        status: 404,
        endpoint: "/animals/4".to_string(),
        body: String::new(),
    }
}

#[tokio::test]
async fn test_task_recovers_after_transient_failures() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = RetryCoordinator::new(fast_policy(5), 2, tx);

    let calls = Arc::new(AtomicU32::new(0));
    let op = task_op({
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(TaskValue::BatchPosted)
                }
            }
        }
    });

    assert!(coordinator.submit(TaskKey::Batch(1), transient(), op));

    let resolution = rx.recv().await.unwrap();
    assert_eq!(resolution.key, TaskKey::Batch(1));
    assert_eq!(resolution.attempts, 3);
    assert!(matches!(resolution.result, Ok(TaskValue::BatchPosted)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(coordinator.in_flight(), 0);
}

#[tokio::test]
async fn test_budget_exhaustion_resolves_with_retry_exhausted() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = RetryCoordinator::new(fast_policy(2), 2, tx);

    let calls = Arc::new(AtomicU32::new(0));
    let op = task_op({
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<TaskValue, _>(transient())
            }
        }
    });

    coordinator.submit(TaskKey::Animal(4), transient(), op);

    let resolution = rx.recv().await.unwrap();
    assert_eq!(resolution.key, TaskKey::Animal(4));
    match resolution.result {
        Err(FetchError::RetryExhausted { attempts, last }) => {
            assert_eq!(attempts, 2);
            assert!(last.is_retryable());
        }
        other => panic!("expected retry exhaustion, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_permanent_failure_stops_retrying_immediately() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = RetryCoordinator::new(fast_policy(5), 2, tx);

    let calls = Arc::new(AtomicU32::new(0));
    let op = task_op({
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<TaskValue, _>(permanent())
            }
        }
    });

    coordinator.submit(TaskKey::Animal(4), transient(), op);

    let resolution = rx.recv().await.unwrap();
    assert!(matches!(
        resolution.result,
        Err(FetchError::Rejected { status: 404, .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_duplicate_key_admission_is_rejected() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = RetryCoordinator::new(fast_policy(5), 4, tx);

    let calls = Arc::new(AtomicU32::new(0));
    let slow_op = |calls: &Arc<AtomicU32>| {
        task_op({
            let calls = Arc::clone(calls);
            move || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(TaskValue::BatchPosted)
                }
            }
        })
    };

    // Two concurrent triggers for the same key: exactly one physical
    // re-fetch may be in flight.
    assert!(coordinator.submit(TaskKey::Animal(4), transient(), slow_op(&calls)));
    assert!(!coordinator.submit(TaskKey::Animal(4), transient(), slow_op(&calls)));

    let resolution = rx.recv().await.unwrap();
    assert_eq!(resolution.key, TaskKey::Animal(4));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Nothing else resolves.
    coordinator.drain().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_key_is_admittable_again_after_resolution() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = RetryCoordinator::new(fast_policy(5), 2, tx);

    let ok_op = || {
        task_op(move || async move { Ok(TaskValue::BatchPosted) })
    };

    assert!(coordinator.submit(TaskKey::Animal(4), transient(), ok_op()));
    rx.recv().await.unwrap();

    assert!(coordinator.submit(TaskKey::Animal(4), transient(), ok_op()));
    rx.recv().await.unwrap();
}

#[tokio::test]
async fn test_worker_bound_serializes_excess_tasks() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = RetryCoordinator::new(fast_policy(5), 1, tx);

    let current = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    for id in 0..4 {
        let op = task_op({
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            move || {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(TaskValue::BatchPosted)
                }
            }
        });
        assert!(coordinator.submit(TaskKey::Animal(id), transient(), op));
    }

    for _ in 0..4 {
        let resolution = rx.recv().await.unwrap();
        assert!(resolution.result.is_ok());
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_drain_returns_immediately_when_idle() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let coordinator = RetryCoordinator::new(fast_policy(5), 2, tx);
    coordinator.drain().await;
    assert_eq!(coordinator.in_flight(), 0);
}

#[tokio::test]
async fn test_drain_waits_for_in_flight_tasks() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = RetryCoordinator::new(fast_policy(5), 2, tx);

    let op = task_op(move || async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(TaskValue::BatchPosted)
    });
    coordinator.submit(TaskKey::Batch(1), transient(), op);
    assert_eq!(coordinator.in_flight(), 1);

    coordinator.drain().await;
    assert_eq!(coordinator.in_flight(), 0);
    assert!(rx.try_recv().is_ok());
}

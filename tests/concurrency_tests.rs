//! Concurrency and accounting tests for the scheduler and aggregator.
//!
//! These drive the scheduler with in-process clients so that tens of
//! thousands of virtual users can run in a test without a network.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use flashsale_loadtest::client::TransactionClient;
use flashsale_loadtest::metrics::OutcomeMetrics;
use flashsale_loadtest::outcome::{OutcomeCategory, TransactionResponse};
use flashsale_loadtest::plan::TestPlan;
use flashsale_loadtest::scheduler::{RunResult, Scheduler};

/// Counts requests per userId and answers 200.
#[derive(Default)]
struct SubjectCounter {
    counts: Mutex<HashMap<String, u64>>,
}

#[async_trait]
impl TransactionClient for SubjectCounter {
    async fn post_transaction(
        &self,
        _url: &str,
        _headers: &HeaderMap,
        body: Vec<u8>,
    ) -> TransactionResponse {
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let user = body["userId"].as_str().unwrap().to_string();
        *self.counts.lock().unwrap().entry(user).or_insert(0) += 1;
        tokio::task::yield_now().await;
        TransactionResponse::completed(200, "ok")
    }
}

/// Cycles through one response of every kind.
struct Rotating {
    next: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl TransactionClient for Rotating {
    async fn post_transaction(
        &self,
        _url: &str,
        _headers: &HeaderMap,
        _body: Vec<u8>,
    ) -> TransactionResponse {
        let n = self
            .next
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        match n % 5 {
            0 => TransactionResponse::completed(200, "ok"),
            1 => TransactionResponse::completed(409, "sold out"),
            2 => TransactionResponse::completed(503, "too many clients"),
            3 => TransactionResponse::transport_error(
                flashsale_loadtest::errors::TransportErrorKind::Connect,
                "connection refused",
            ),
            _ => TransactionResponse::completed(500, "internal error"),
        }
    }
}

/// Panics on every request.
struct Exploding;

#[async_trait]
impl TransactionClient for Exploding {
    async fn post_transaction(
        &self,
        _url: &str,
        _headers: &HeaderMap,
        _body: Vec<u8>,
    ) -> TransactionResponse {
        panic!("client blew up");
    }
}

async fn run_with(plan: TestPlan, client: Arc<dyn TransactionClient>) -> RunResult {
    let metrics = Arc::new(OutcomeMetrics::new("concurrency").unwrap());
    Scheduler::new(Arc::new(plan), client, metrics).run().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn ten_thousand_increments_are_never_lost() {
    for _ in 0..5 {
        let metrics = Arc::new(OutcomeMetrics::new("increments").unwrap());
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..10_000usize {
            let metrics = metrics.clone();
            tasks.spawn(async move {
                metrics.increment(OutcomeCategory::ALL[i % OutcomeCategory::COUNT]);
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total(), 10_000);
        for category in OutcomeCategory::ALL {
            assert_eq!(snapshot.get(category), 2_000);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn burst_of_ten_thousand_vus_accounts_for_every_attempt() {
    for _ in 0..3 {
        let client = Arc::new(Rotating {
            next: std::sync::atomic::AtomicUsize::new(0),
        });
        let result = run_with(TestPlan::default().with_vu_count(10_000), client).await;

        assert_eq!(result.launched, 10_000);
        assert_eq!(result.aborted, 0);
        assert_eq!(result.snapshot.total(), 10_000);
        for category in OutcomeCategory::ALL {
            assert_eq!(result.snapshot.get(category), 2_000, "{}", category);
        }
    }
}

#[tokio::test]
async fn zero_vus_completes_with_zero_snapshot() {
    let client = Arc::new(SubjectCounter::default());
    let result = run_with(TestPlan::default().with_vu_count(0), client.clone()).await;

    assert!(result.snapshot.is_empty());
    assert_eq!(result.launched, 0);
    assert!(client.counts.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn subjects_are_drawn_roughly_uniformly() {
    let client = Arc::new(SubjectCounter::default());
    let plan = TestPlan::default()
        .with_vu_count(30_000)
        .with_user_ids(["a", "b", "c"])
        .with_seed(Some(2024));

    let result = run_with(plan, client.clone()).await;
    assert_eq!(result.snapshot.total(), 30_000);

    let counts = client.counts.lock().unwrap();
    assert_eq!(counts.len(), 3);
    for user in ["a", "b", "c"] {
        let n = counts[user];
        // Expected 10_000 each; the standard deviation is about 82.
        assert!((9_400..=10_600).contains(&n), "{} drawn {} times", user, n);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_seed_reproduces_subject_draws() {
    let mut runs = Vec::new();
    for _ in 0..2 {
        let client = Arc::new(SubjectCounter::default());
        let plan = TestPlan::default()
            .with_vu_count(2_000)
            .with_iterations_per_vu(2)
            .with_seed(Some(7));
        let result = run_with(plan, client.clone()).await;
        assert_eq!(result.seed, 7);
        let counts = client.counts.lock().unwrap().clone();
        runs.push(counts);
    }
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn panicking_vu_still_counts_its_attempt() {
    let plan = TestPlan::default().with_vu_count(50);
    let result = run_with(plan, Arc::new(Exploding)).await;

    assert_eq!(result.launched, 50);
    assert_eq!(result.aborted, 50);
    assert_eq!(result.snapshot.get(OutcomeCategory::TransportFailure), 50);
    assert_eq!(result.snapshot.total(), 50);
}

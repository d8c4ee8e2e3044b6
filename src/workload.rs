use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::client::TransactionClient;
use crate::errors::TransportErrorKind;
use crate::metrics::OutcomeMetrics;
use crate::outcome::{classify, OutcomeCategory, TransactionResponse};
use crate::plan::TestPlan;

/// Longest body excerpt written to the log for a failed transaction.
const MAX_LOGGED_BODY_CHARS: usize = 512;

/// JSON body of one transaction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest<'a> {
    pub wallet_id: &'a str,
    pub user_id: &'a str,
    pub amount: i64,
}

impl<'a> TransactionRequest<'a> {
    /// Builds a request for a subject drawn uniformly, with replacement, from
    /// the plan's pool. Returns `None` only for an empty pool.
    pub fn random<R: Rng + ?Sized>(plan: &'a TestPlan, rng: &mut R) -> Option<Self> {
        let user_id = plan.user_ids.choose(rng)?;
        Some(Self {
            wallet_id: &plan.wallet_id,
            user_id,
            amount: plan.amount,
        })
    }
}

/// Shared handles a virtual user needs. Cloning is a handful of `Arc` bumps.
#[derive(Clone)]
pub struct WorkloadContext {
    pub plan: Arc<TestPlan>,
    pub client: Arc<dyn TransactionClient>,
    pub metrics: Arc<OutcomeMetrics>,
}

/// Records exactly one outcome for one attempt.
///
/// If the slot is dropped before [`OutcomeSlot::record`] runs (a panic or a
/// dropped future mid-request), the attempt is counted as a transport failure
/// so that no outcome is ever lost.
struct OutcomeSlot<'a> {
    metrics: &'a OutcomeMetrics,
    vu_id: usize,
    recorded: bool,
}

impl<'a> OutcomeSlot<'a> {
    fn new(metrics: &'a OutcomeMetrics, vu_id: usize) -> Self {
        Self {
            metrics,
            vu_id,
            recorded: false,
        }
    }

    fn record(mut self, category: OutcomeCategory) {
        self.metrics.increment(category);
        self.recorded = true;
    }
}

impl Drop for OutcomeSlot<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            warn!(
                vu_id = self.vu_id,
                "Iteration ended without an outcome, counting as transport failure"
            );
            self.metrics.increment(OutcomeCategory::TransportFailure);
        }
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(1);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Runs one attempt: pick a subject, POST, classify, record. Never retries.
pub async fn run_iteration<R: Rng + ?Sized>(
    ctx: &WorkloadContext,
    vu_id: usize,
    rng: &mut R,
) -> OutcomeCategory {
    let slot = OutcomeSlot::new(&ctx.metrics, vu_id);

    let response = match encode_request(&ctx.plan, rng) {
        Ok(body) => send(ctx, body).await,
        Err(message) => TransactionResponse::transport_error(TransportErrorKind::Other, message),
    };

    let category = classify(&response);
    log_outcome(vu_id, category, &response);
    slot.record(category);
    category
}

fn encode_request<R: Rng + ?Sized>(plan: &TestPlan, rng: &mut R) -> Result<Vec<u8>, String> {
    let request = TransactionRequest::random(plan, rng)
        .ok_or_else(|| "subject pool is empty, request not sent".to_string())?;
    serde_json::to_vec(&request).map_err(|e| format!("failed to encode request body: {}", e))
}

async fn send(ctx: &WorkloadContext, body: Vec<u8>) -> TransactionResponse {
    let _in_flight = ctx.metrics.track_in_flight();
    let started = Instant::now();
    let response = ctx
        .client
        .post_transaction(&ctx.plan.target_url, &json_headers(), body)
        .await;
    ctx.metrics.observe_duration(started.elapsed().as_secs_f64());
    response
}

fn log_outcome(vu_id: usize, category: OutcomeCategory, response: &TransactionResponse) {
    match response {
        TransactionResponse::TransportError { kind, message } => {
            warn!(
                vu_id = vu_id,
                error_kind = %kind,
                error = %message,
                "Transaction failed without a response"
            );
        }
        TransactionResponse::Completed { status, body } => match category {
            OutcomeCategory::ResourceExhaustion => {
                error!(
                    vu_id = vu_id,
                    status_code = status,
                    body = %excerpt(body),
                    "DB error"
                );
            }
            OutcomeCategory::Other => {
                error!(
                    vu_id = vu_id,
                    status_code = status,
                    body = %excerpt(body),
                    "Unexpected error"
                );
            }
            _ => {
                debug!(
                    vu_id = vu_id,
                    status_code = status,
                    outcome = %category,
                    "Transaction completed"
                );
            }
        },
    }
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(MAX_LOGGED_BODY_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Runs every iteration of one virtual user. Returns the number of attempts.
pub async fn run_virtual_user<R: Rng + Send>(
    ctx: WorkloadContext,
    vu_id: usize,
    mut rng: R,
) -> usize {
    let iterations = ctx.plan.iterations_per_vu;
    for _ in 0..iterations {
        run_iteration(&ctx, vu_id, &mut rng).await;
    }
    debug!(vu_id = vu_id, iterations = iterations, "Virtual user finished");
    iterations
}

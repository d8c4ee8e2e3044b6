//! Per-run outcome aggregation backed by Prometheus counters.
//!
//! [`OutcomeMetrics`] is built once per run and shared by `Arc` with every
//! virtual user. Each outcome category has its own pre-resolved `IntCounter`,
//! so `increment` is a single atomic add with no caller-side locking. The
//! counters live in a per-run `Registry` rather than the process-wide default
//! one, which keeps runs (and tests) isolated from each other.

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::outcome::OutcomeCategory;

/// Default Prometheus namespace for all run metrics.
pub const DEFAULT_METRIC_NAMESPACE: &str = "flashsale_loadtest";

/// Checks that `namespace` can prefix a Prometheus metric name.
pub fn validate_metric_namespace(namespace: &str) -> Result<(), String> {
    let mut chars = namespace.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_' || first == ':')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err("Use letters, digits, '_' or ':', not starting with a digit.".to_string())
    }
}

/// Thread-safe outcome counters plus request-level instrumentation.
pub struct OutcomeMetrics {
    registry: Registry,
    outcomes: [IntCounter; OutcomeCategory::COUNT],
    in_flight: IntGauge,
    request_duration: Histogram,
}

impl OutcomeMetrics {
    /// Creates the counters and registers them in a fresh registry.
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let outcome_vec = IntCounterVec::new(
            Opts::new(
                "transaction_outcomes_total",
                "Number of transaction attempts by outcome category",
            )
            .namespace(namespace),
            &["outcome"],
        )?;
        let in_flight = IntGauge::with_opts(
            Opts::new(
                "transactions_in_flight",
                "Number of transaction requests currently in flight",
            )
            .namespace(namespace),
        )?;
        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "transaction_duration_seconds",
                "Transaction request latencies in seconds.",
            )
            .namespace(namespace),
        )?;

        registry.register(Box::new(outcome_vec.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        // Resolve every label up front so the zero counts are exported too.
        let outcomes = OutcomeCategory::ALL.map(|c| outcome_vec.with_label_values(&[c.name()]));

        Ok(Self {
            registry,
            outcomes,
            in_flight,
            request_duration,
        })
    }

    /// Records one attempt under `category`.
    pub fn increment(&self, category: OutcomeCategory) {
        self.outcomes[category.index()].inc();
    }

    /// Reads every counter.
    ///
    /// Call after the scheduler has reported completion; while units are still
    /// running the values are a moving, non-decreasing view.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counts: OutcomeCategory::ALL.map(|c| self.outcomes[c.index()].get()),
        }
    }

    /// Marks a request as in flight until the returned guard is dropped.
    pub fn track_in_flight(&self) -> InFlightGuard<'_> {
        self.in_flight.inc();
        InFlightGuard {
            gauge: &self.in_flight,
        }
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.get()
    }

    pub fn observe_duration(&self, seconds: f64) {
        self.request_duration.observe(seconds);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes the registry in Prometheus text format.
    pub fn gather_text(&self) -> String {
        encode_registry(&self.registry)
    }
}

/// Decrements the in-flight gauge on drop.
pub struct InFlightGuard<'a> {
    gauge: &'a IntGauge,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Frozen per-category counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    counts: [u64; OutcomeCategory::COUNT],
}

impl MetricsSnapshot {
    pub fn get(&self, category: OutcomeCategory) -> u64 {
        self.counts[category.index()]
    }

    /// Sum over all categories; equals the number of attempts recorded.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Iterates categories in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = (OutcomeCategory, u64)> + '_ {
        OutcomeCategory::ALL.iter().map(|c| (*c, self.get(*c)))
    }

    /// Folds the categories into the public bucket names.
    pub fn buckets(&self) -> ErrorBuckets {
        let mut buckets = ErrorBuckets::default();
        for (category, count) in self.iter() {
            match category.error_bucket() {
                None => buckets.success += count,
                Some("errors_sold_out") => buckets.errors_sold_out += count,
                Some("errors_db_connection") => buckets.errors_db_connection += count,
                Some(_) => buckets.errors_other += count,
            }
        }
        buckets
    }
}

impl Serialize for MetricsSnapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<&'static str, u64> = self.iter().map(|(c, n)| (c.name(), n)).collect();
        map.serialize(serializer)
    }
}

/// Success count plus the three public error buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ErrorBuckets {
    pub success: u64,
    pub errors_sold_out: u64,
    pub errors_db_connection: u64,
    pub errors_other: u64,
}

fn encode_registry(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::from("# ERROR ENCODING METRICS");
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!(error = %e, "Metrics output is not valid UTF-8");
        String::from("# ERROR ENCODING METRICS TO UTF-8")
    })
}

/// HTTP handler for the Prometheus metrics endpoint.
pub async fn metrics_handler(
    _req: Request<Body>,
    metrics: Arc<OutcomeMetrics>,
) -> Result<Response<Body>, hyper::Error> {
    let body = metrics.gather_text();
    let mut response = Response::new(Body::from(body));
    let content_type = TextEncoder::new()
        .format_type()
        .parse::<hyper::header::HeaderValue>();
    if let Ok(content_type) = content_type {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}

/// Starts the Prometheus metrics HTTP server. Runs until the task is dropped.
pub async fn start_metrics_server(port: u16, metrics: Arc<OutcomeMetrics>) {
    let addr = ([0, 0, 0, 0], port).into();

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                let metrics = metrics.clone();
                async move { metrics_handler(req, metrics).await }
            }))
        }
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_svc),
        Err(e) => {
            error!(port = port, error = %e, "Failed to bind metrics server");
            return;
        }
    };
    info!(port = port, addr = %addr, "Metrics server listening");

    if let Err(e) = server.await {
        error!(error = %e, "Metrics server error");
    }
}

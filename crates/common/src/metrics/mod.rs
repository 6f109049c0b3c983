//! Metrics and observability utilities
//!
//! Prometheus-style metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all KBridge metrics
pub const METRICS_PREFIX: &str = "kbridge";

/// Histogram buckets for remote call latency (in seconds)
pub const REMOTE_CALL_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Outcome of a single retrieval invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// No knowledge base given, no remote call made
    Skipped,
    /// Service reachable, nothing matched
    Empty,
    /// Service reachable, at least one source returned
    Hit,
    /// Remote call failed
    Failed,
}

impl RetrievalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalOutcome::Skipped => "skipped",
            RetrievalOutcome::Empty => "empty",
            RetrievalOutcome::Hit => "hit",
            RetrievalOutcome::Failed => "failed",
        }
    }
}

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_retrieval_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total retrieval invocations by outcome"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Knowledge base retrieval latency in seconds"
    );

    describe_histogram!(
        format!("{}_retrieval_sources_count", METRICS_PREFIX),
        Unit::Count,
        "Sources returned per retrieval"
    );

    describe_counter!(
        format!("{}_knowledge_base_listings_total", METRICS_PREFIX),
        Unit::Count,
        "Total knowledge base listing calls"
    );

    describe_counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total model calls"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Model call latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record retrieval metrics
pub fn record_retrieval(outcome: RetrievalOutcome, duration_secs: Option<f64>, source_count: usize) {
    counter!(
        format!("{}_retrieval_requests_total", METRICS_PREFIX),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    // Skipped calls never left the process
    if let Some(duration_secs) = duration_secs {
        histogram!(
            format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
            "outcome" => outcome.as_str()
        )
        .record(duration_secs);
    }

    if outcome != RetrievalOutcome::Skipped {
        histogram!(format!("{}_retrieval_sources_count", METRICS_PREFIX))
            .record(source_count as f64);
    }
}

/// Helper to record knowledge base listing metrics.
///
/// The region is caller-supplied, so it is never used as a label.
pub fn record_listing(success: bool, count: usize) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_knowledge_base_listings_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    tracing::debug!(status, count, "Recorded listing metrics");
}

/// Helper to record model call metrics
pub fn record_generation(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_generation_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

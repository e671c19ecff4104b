//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all LessonForge metrics
pub const METRICS_PREFIX: &str = "lessonforge";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.075,  // 75ms
    0.100,  // 100ms
    0.150,  // 150ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for LLM calls and whole sessions (much slower)
pub const GENERATION_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 1m
    120.0,  // 2m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Session metrics
    describe_counter!(
        format!("{}_sessions_total", METRICS_PREFIX),
        Unit::Count,
        "Streaming sessions by final state"
    );

    describe_gauge!(
        format!("{}_sessions_active", METRICS_PREFIX),
        Unit::Count,
        "Streaming sessions currently open"
    );

    describe_histogram!(
        format!("{}_session_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Streaming session duration in seconds"
    );

    describe_counter!(
        format!("{}_chunks_relayed_total", METRICS_PREFIX),
        Unit::Count,
        "Content chunks relayed to clients"
    );

    // Quality metrics
    describe_counter!(
        format!("{}_quality_checks_total", METRICS_PREFIX),
        Unit::Count,
        "Quality assessments by outcome"
    );

    // LLM metrics
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM provider requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "LLM provider latency in seconds (time to response headers when streaming)"
    );

    describe_counter!(
        format!("{}_llm_retries_total", METRICS_PREFIX),
        Unit::Count,
        "LLM requests retried after a transient failure"
    );

    // Pipeline metrics
    describe_counter!(
        format!("{}_validations_total", METRICS_PREFIX),
        Unit::Count,
        "Validations recorded, by approval"
    );

    describe_counter!(
        format!("{}_rate_limited_total", METRICS_PREFIX),
        Unit::Count,
        "Requests rejected by the per-user rate limit"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Tracks one streaming session; records its outcome when finished
pub struct SessionMetrics {
    start: Instant,
}

impl SessionMetrics {
    pub fn start() -> Self {
        gauge!(format!("{}_sessions_active", METRICS_PREFIX)).increment(1.0);
        Self { start: Instant::now() }
    }

    pub fn finish(self, outcome: &str) {
        gauge!(format!("{}_sessions_active", METRICS_PREFIX)).decrement(1.0);

        counter!(
            format!("{}_sessions_total", METRICS_PREFIX),
            "outcome" => outcome.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_session_duration_seconds", METRICS_PREFIX),
            "outcome" => outcome.to_string()
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}

/// Helper to record relayed chunks
pub fn record_chunk_relayed() {
    counter!(format!("{}_chunks_relayed_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record a quality assessment: `ok`, `failed` or `cached`
pub fn record_quality_check(outcome: &str) {
    counter!(
        format!("{}_quality_checks_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Helper to record LLM provider metrics
pub fn record_llm_request(model: &str, mode: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "mode" => mode.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_llm_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string(),
            "mode" => mode.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record a retry
pub fn record_llm_retry(provider: &str) {
    counter!(
        format!("{}_llm_retries_total", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .increment(1);
}

/// Helper to record a validation upsert
pub fn record_validation(approved: bool) {
    counter!(
        format!("{}_validations_total", METRICS_PREFIX),
        "approved" => approved.to_string()
    )
    .increment(1);
}

/// Helper to record a rate-limited request
pub fn record_rate_limited() {
    counter!(format!("{}_rate_limited_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, GENERATION_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }

        // P50 target (50ms) should be in buckets
        assert!(LATENCY_BUCKETS.contains(&0.050));
        // P99 target (150ms) should be in buckets
        assert!(LATENCY_BUCKETS.contains(&0.150));
    }

    #[test]
    fn test_session_metrics() {
        let session = SessionMetrics::start();
        record_chunk_relayed();
        session.finish("completed");
        // Just verify it runs without a recorder installed
    }
}

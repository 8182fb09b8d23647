//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Gateway Metrics
    pub static ref GATEWAY_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snapgram_gateway_requests_total", "Total number of backend requests"),
        &["operation", "outcome"]
    ).expect("metric can be created");
    pub static ref GATEWAY_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "snapgram_gateway_request_duration_seconds",
            "Backend request duration in seconds"
        ).buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["operation"]
    ).expect("metric can be created");

    // Query Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snapgram_cache_hits_total", "Total number of query cache hits"),
        &["query"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snapgram_cache_misses_total", "Total number of query cache misses"),
        &["query"]
    ).expect("metric can be created");
    pub static ref CACHE_DEDUPLICATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snapgram_cache_deduplicated_total", "Queries attached to an in-flight fetch"),
        &["query"]
    ).expect("metric can be created");
    pub static ref CACHE_INVALIDATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snapgram_cache_invalidations_total", "Total number of query invalidations"),
        &["query"]
    ).expect("metric can be created");
    pub static ref CACHE_ENTRIES: IntGauge = IntGauge::new(
        "snapgram_cache_entries",
        "Current number of query cache entries"
    ).expect("metric can be created");

    // Media Metrics
    pub static ref MEDIA_UPLOADS_TOTAL: IntCounter = IntCounter::new(
        "snapgram_media_uploads_total",
        "Total number of media uploads"
    ).expect("metric can be created");
    pub static ref MEDIA_COMPENSATIONS_TOTAL: IntCounter = IntCounter::new(
        "snapgram_media_compensations_total",
        "Uploaded media deleted after a failed follow-up step"
    ).expect("metric can be created");

    // Session Metrics
    pub static ref SESSION_CHECKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snapgram_session_checks_total", "Total number of identity checks"),
        &["outcome"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; registration happens on the first call.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(GATEWAY_REQUESTS_TOTAL.clone()))
            .expect("GATEWAY_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(GATEWAY_REQUEST_DURATION_SECONDS.clone()))
            .expect("GATEWAY_REQUEST_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(CACHE_HITS_TOTAL.clone()))
            .expect("CACHE_HITS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CACHE_MISSES_TOTAL.clone()))
            .expect("CACHE_MISSES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CACHE_DEDUPLICATED_TOTAL.clone()))
            .expect("CACHE_DEDUPLICATED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CACHE_INVALIDATIONS_TOTAL.clone()))
            .expect("CACHE_INVALIDATIONS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CACHE_ENTRIES.clone()))
            .expect("CACHE_ENTRIES can be registered");
        REGISTRY
            .register(Box::new(MEDIA_UPLOADS_TOTAL.clone()))
            .expect("MEDIA_UPLOADS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(MEDIA_COMPENSATIONS_TOTAL.clone()))
            .expect("MEDIA_COMPENSATIONS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SESSION_CHECKS_TOTAL.clone()))
            .expect("SESSION_CHECKS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Render all registered metrics in Prometheus text format.
pub fn gather() -> Result<String, crate::error::AppError> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::error::AppError::internal(format!("failed to encode metrics: {e}")))?;
    String::from_utf8(buffer).map_err(crate::error::AppError::internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_includes_registered_counters() {
        init_metrics();
        init_metrics();
        MEDIA_UPLOADS_TOTAL.inc();

        let text = gather().unwrap();
        assert!(text.contains("snapgram_media_uploads_total"));
    }
}

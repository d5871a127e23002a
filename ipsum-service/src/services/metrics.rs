//! Prometheus metrics for ipsum-service.
//!
//! Counts generation requests by mode and outcome, upstream latency, and
//! the shape of relayed streams.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{Once, OnceLock};

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub static GENERATION_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static UPSTREAM_LATENCY_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static STREAM_CHUNKS_TOTAL: OnceLock<IntCounter> = OnceLock::new();
pub static MALFORMED_FRAMES_TOTAL: OnceLock<IntCounter> = OnceLock::new();

static INIT: Once = Once::new();

/// Initialize all metrics. Safe to call more than once; only the first
/// call registers anything.
pub fn init_metrics() {
    INIT.call_once(|| {
        let registry = Registry::new();

        let generation_requests = IntCounterVec::new(
            Opts::new(
                "ipsum_generation_requests_total",
                "Total generation requests by response mode and outcome",
            ),
            &["mode", "outcome"],
        )
        .expect("Failed to create ipsum_generation_requests_total metric");

        // Time until the upstream answered (full body for buffered mode,
        // response headers for streaming mode)
        let upstream_latency = HistogramVec::new(
            HistogramOpts::new(
                "ipsum_upstream_latency_seconds",
                "Upstream chat-completion latency in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["mode"],
        )
        .expect("Failed to create ipsum_upstream_latency_seconds metric");

        let stream_chunks = IntCounter::new(
            "ipsum_stream_chunks_total",
            "Text chunks forwarded to streaming clients",
        )
        .expect("Failed to create ipsum_stream_chunks_total metric");

        let malformed_frames = IntCounter::new(
            "ipsum_malformed_frames_total",
            "Upstream stream frames skipped because their JSON did not parse",
        )
        .expect("Failed to create ipsum_malformed_frames_total metric");

        registry
            .register(Box::new(generation_requests.clone()))
            .expect("Failed to register ipsum_generation_requests_total");
        registry
            .register(Box::new(upstream_latency.clone()))
            .expect("Failed to register ipsum_upstream_latency_seconds");
        registry
            .register(Box::new(stream_chunks.clone()))
            .expect("Failed to register ipsum_stream_chunks_total");
        registry
            .register(Box::new(malformed_frames.clone()))
            .expect("Failed to register ipsum_malformed_frames_total");

        let _ = REGISTRY.set(registry);
        let _ = GENERATION_REQUESTS_TOTAL.set(generation_requests);
        let _ = UPSTREAM_LATENCY_SECONDS.set(upstream_latency);
        let _ = STREAM_CHUNKS_TOTAL.set(stream_chunks);
        let _ = MALFORMED_FRAMES_TOTAL.set(malformed_frames);

        tracing::info!("Prometheus metrics initialized");
    });
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

/// Record the outcome of a generation request.
pub fn record_generation(mode: &str, outcome: &str) {
    if let Some(counter) = GENERATION_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[mode, outcome]).inc();
    }
}

/// Record upstream latency.
pub fn record_upstream_latency(mode: &str, duration_secs: f64) {
    if let Some(histogram) = UPSTREAM_LATENCY_SECONDS.get() {
        histogram.with_label_values(&[mode]).observe(duration_secs);
    }
}

pub fn record_stream_chunk() {
    if let Some(counter) = STREAM_CHUNKS_TOTAL.get() {
        counter.inc();
    }
}

pub fn record_malformed_frame() {
    if let Some(counter) = MALFORMED_FRAMES_TOTAL.get() {
        counter.inc();
    }
}

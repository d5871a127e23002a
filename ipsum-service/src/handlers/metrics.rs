use crate::services::metrics::get_metrics;
use axum::{http::header, response::IntoResponse};

/// GET /metrics in Prometheus text exposition format.
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        get_metrics(),
    )
}

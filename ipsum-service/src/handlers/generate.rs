//! `POST /api/generate-lorem`: validate, prompt, call upstream, relay.

use crate::models::{GenerateLoremRequest, GenerateLoremResponse, GenerationRequest};
use crate::services::metrics;
use crate::services::prompt::render_prompt;
use crate::startup::AppState;
use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use service_core::error::AppError;
use std::convert::Infallible;
use std::time::Instant;

pub const CREDENTIAL_MISSING: &str = "Upstream API key is not configured";

/// Generate themed placeholder text.
///
/// With `stream` (the default) the response is `text/plain` and carries
/// the cleaned deltas as they arrive; otherwise the full text is returned
/// as `{success: true, text}`.
pub async fn generate_lorem(
    State(state): State<AppState>,
    payload: Result<Json<GenerateLoremRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let result = generate(&state, payload).await;

    match &result {
        // The relay records its own outcome once the stream ends
        Ok(("stream", _)) => {}
        Ok((mode, _)) => metrics::record_generation(mode, "success"),
        Err(AppError::BadRequest(_)) => metrics::record_generation("none", "invalid_input"),
        Err(AppError::ConfigError(_)) => metrics::record_generation("none", "config_error"),
        Err(_) => metrics::record_generation("none", "upstream_error"),
    }

    result.map(|(_, response)| response)
}

async fn generate(
    state: &AppState,
    payload: Result<Json<GenerateLoremRequest>, JsonRejection>,
) -> Result<(&'static str, Response), AppError> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected generation request body");
        AppError::bad_request("Invalid request body")
    })?;

    let request = GenerationRequest::try_from(payload)?;

    if !state.mistral.is_configured() {
        return Err(AppError::config(CREDENTIAL_MISSING));
    }

    tracing::info!(
        theme = %request.theme,
        paragraphs = request.paragraphs,
        paragraph_length = %request.paragraph_length,
        stream = request.stream,
        model = %state.mistral.model(),
        "Generating placeholder text"
    );

    let prompt = render_prompt(&request);
    let started = Instant::now();

    if request.stream {
        let deltas = state.mistral.generate_stream(&prompt).await?;
        metrics::record_upstream_latency("stream", started.elapsed().as_secs_f64());

        let body = Body::from_stream(deltas.map(|text| {
            metrics::record_stream_chunk();
            Ok::<_, Infallible>(text)
        }));

        let response = (
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            ],
            body,
        )
            .into_response();

        Ok(("stream", response))
    } else {
        let text = state.mistral.generate(&prompt).await?;
        metrics::record_upstream_latency("buffered", started.elapsed().as_secs_f64());

        tracing::debug!(text_len = text.len(), "Generated placeholder text");

        Ok(("buffered", Json(GenerateLoremResponse::new(text)).into_response()))
    }
}

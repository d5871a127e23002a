//! Mistral chat-completions client.
//!
//! Issues exactly one request per generation, either buffered or as an
//! event stream that is decoded and cleaned while it is relayed.

use super::metrics;
use super::sse::{FrameEvent, LineDecoder, parse_line};
use super::text::clean_completion;
use crate::config::{API_KEY_PLACEHOLDER, UpstreamConfig};
use axum::body::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Sampling temperature for every request.
pub const TEMPERATURE: f32 = 0.7;

/// Output token ceiling for every request.
pub const MAX_TOKENS: u32 = 1000;

/// Written to the client when the upstream stream had no body at all.
pub const NO_BODY_NOTICE: &str = "Error: upstream returned no response body";

/// Error type for upstream operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    ApiError {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Upstream response contained no text")]
    NoContent,
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NoContent => AppError::UpstreamError {
                message: "No text generated".to_string(),
                source: anyhow::Error::new(ProviderError::NoContent),
            },
            other => AppError::UpstreamError {
                message: "Failed to generate text".to_string(),
                source: anyhow::Error::new(other),
            },
        }
    }
}

/// Cleaned text deltas in arrival order. The stream ends when the upstream
/// sends `[DONE]` or its body ends.
pub type TextStream = Pin<Box<dyn futures::Stream<Item = String> + Send>>;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the chat-completions endpoint.
#[derive(Clone)]
pub struct MistralClient {
    config: UpstreamConfig,
    client: Client,
}

impl MistralClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// True when an API key is present and is not the sample placeholder.
    pub fn is_configured(&self) -> bool {
        let key = self.config.api_key.expose_secret();
        !key.trim().is_empty() && key != API_KEY_PLACEHOLDER
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Callers check `is_configured` first; an unset key is sent as-is.
    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            stream,
        };

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            stream,
            "Sending request to Mistral API"
        );

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Mistral API returned an error");
            return Err(ProviderError::ApiError { status, body });
        }

        Ok(response)
    }

    /// Wait for the full completion and return its cleaned text.
    pub async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let response = self.send(prompt, false).await?;
        let body: ChatResponse = response.json().await?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|t| !t.is_empty())
            .ok_or(ProviderError::NoContent)?;

        Ok(clean_completion(&text))
    }

    /// Start a streamed completion. Errors before the first byte (bad
    /// status, unreachable host) are returned here; after that the stream
    /// simply ends.
    pub async fn generate_stream(&self, prompt: &str) -> Result<TextStream, ProviderError> {
        let response = self.send(prompt, true).await?;
        Ok(relay(response.bytes_stream().boxed()))
    }
}

struct RelayState {
    body: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    received_any: bool,
    /// Reported once the relay is dropped. Stays `client_disconnected`
    /// unless the upstream side finished first.
    outcome: &'static str,
}

impl Drop for RelayState {
    fn drop(&mut self) {
        metrics::record_generation("stream", self.outcome);
    }
}

impl RelayState {
    /// Stop reading the upstream body and remember why.
    fn close(&mut self, outcome: &'static str) {
        self.body = None;
        self.outcome = outcome;
    }

    /// Handle one complete line. Returns false once `[DONE]` is seen.
    fn accept(&mut self, line: &str) -> bool {
        match parse_line(line) {
            Some(FrameEvent::Delta(text)) => self.pending.push_back(text),
            Some(FrameEvent::Done) => return false,
            Some(FrameEvent::Malformed(e)) => {
                metrics::record_malformed_frame();
                tracing::debug!(error = %e, "Skipping malformed upstream frame");
            }
            None => {}
        }
        true
    }
}

/// Turn an upstream SSE byte stream into cleaned text deltas.
///
/// The upstream body is owned by the returned stream, so dropping it (the
/// client went away, or the response finished) closes the upstream
/// connection as well.
pub fn relay(body: BoxStream<'static, reqwest::Result<Bytes>>) -> TextStream {
    let state = RelayState {
        body: Some(body),
        decoder: LineDecoder::new(),
        pending: VecDeque::new(),
        received_any: false,
        outcome: "client_disconnected",
    };

    let stream = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.pending.pop_front() {
                return Some((text, state));
            }

            let body = state.body.as_mut()?;

            match body.next().await {
                Some(Ok(chunk)) => {
                    state.received_any |= !chunk.is_empty();
                    for line in state.decoder.push(&chunk) {
                        if !state.accept(&line) {
                            state.close("success");
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Upstream stream failed mid-response");
                    state.close("upstream_error");
                }
                None => {
                    if let Some(line) = state.decoder.finish() {
                        state.accept(&line);
                    }
                    if state.received_any {
                        state.close("success");
                    } else {
                        tracing::error!("Upstream stream had no response body");
                        state.pending.push_back(NO_BODY_NOTICE.to_string());
                        state.close("empty_body");
                    }
                }
            }
        }
    });

    Box::pin(stream)
}

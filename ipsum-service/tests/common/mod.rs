//! Test helper module for ipsum-service integration tests.
//!
//! Spins up a fake chat-completions server on a random local port and
//! builds the service router pointed at it.

#![allow(dead_code)]

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use futures::stream;
use http_body_util::BodyExt;
use ipsum_service::config::{
    Environment, IpsumConfig, RateLimitConfig, SecurityConfig, UpstreamConfig,
};
use ipsum_service::{AppState, build_router};
use secrecy::Secret;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower::util::ServiceExt;

pub const TEST_API_KEY: &str = "test_api_key_mock";

/// Canned answers for the fake upstream.
#[derive(Clone)]
pub enum UpstreamReply {
    /// Buffered completion with this message content.
    Completion(String),
    /// Buffered completion whose body is this raw JSON.
    RawJson(Value),
    /// Event-stream body written as these separate chunks.
    EventStream(Vec<String>),
    /// Error status with a body the service must not leak.
    Failure(StatusCode, String),
}

/// A chat-completion request as received by the fake upstream.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct UpstreamState {
    reply: UpstreamReply,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    hits: Arc<AtomicUsize>,
}

pub struct FakeUpstream {
    pub base_url: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    hits: Arc<AtomicUsize>,
}

impl FakeUpstream {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_call(&self) -> RecordedCall {
        self.calls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("upstream was never called")
    }
}

async fn chat_completions(
    State(state): State<UpstreamState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.calls.lock().unwrap().push(RecordedCall {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    match state.reply {
        UpstreamReply::Completion(content) => Json(json!({
            "id": "cmpl-test",
            "object": "chat.completion",
            "model": "mistral-large-latest",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        UpstreamReply::RawJson(value) => Json(value).into_response(),
        UpstreamReply::EventStream(chunks) => {
            let body = Body::from_stream(stream::iter(
                chunks.into_iter().map(Ok::<_, Infallible>),
            ));
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }
        UpstreamReply::Failure(status, message) => (status, message).into_response(),
    }
}

/// Start the fake upstream on 127.0.0.1 with a random port.
pub async fn spawn_upstream(reply: UpstreamReply) -> FakeUpstream {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let hits = Arc::new(AtomicUsize::new(0));
    let state = UpstreamState {
        reply,
        calls: calls.clone(),
        hits: hits.clone(),
    };

    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake upstream");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    FakeUpstream {
        base_url: format!("http://127.0.0.1:{}/v1", port),
        calls,
        hits,
    }
}

/// One `data:` frame carrying a content delta.
pub fn delta_frame(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({ "choices": [{ "index": 0, "delta": { "content": content } }] })
    )
}

pub fn test_config(base_url: &str, api_key: &str) -> IpsumConfig {
    IpsumConfig {
        common: service_core::config::Config {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        environment: Environment::Test,
        service_name: "ipsum-service".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        upstream: UpstreamConfig {
            api_key: Secret::new(api_key.to_string()),
            base_url: base_url.to_string(),
            model: "mistral-large-latest".to_string(),
            timeout_seconds: 5,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:4000".to_string()],
        },
        rate_limit: RateLimitConfig {
            requests: 50,
            window_seconds: 900,
            trust_proxy: false,
        },
    }
}

pub fn test_app(config: IpsumConfig) -> Router {
    build_router(AppState::new(config).expect("Failed to build app state"))
}

/// Router wired to a fake upstream answering with `reply`.
pub async fn app_with_upstream(reply: UpstreamReply) -> (Router, FakeUpstream) {
    let upstream = spawn_upstream(reply).await;
    let app = test_app(test_config(&upstream.base_url, TEST_API_KEY));
    (app, upstream)
}

pub fn generate_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/generate-lorem")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn post_generate(app: &Router, body: Value) -> Response {
    app.clone().oneshot(generate_request(body)).await.unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

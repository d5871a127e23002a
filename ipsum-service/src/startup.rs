//! Application startup and lifecycle management.
//!
//! Builds the shared state, assembles the router with its middleware
//! stack, and runs the HTTP server until a shutdown signal arrives.

use crate::config::IpsumConfig;
use crate::handlers;
use crate::services::MistralClient;
use crate::services::metrics;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, Request, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use service_core::error::{AppError, panic_response};
use service_core::middleware::{
    rate_limit::{IpRateLimit, IpRateLimiter, create_ip_rate_limiter, ip_rate_limit_middleware},
    security_headers::security_headers_middleware,
    tracing::{REQUEST_ID_HEADER, request_id_middleware},
};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

/// Shared application state. Read-only after construction.
#[derive(Clone)]
pub struct AppState {
    pub config: IpsumConfig,
    pub mistral: MistralClient,
    pub rate_limiter: IpRateLimiter,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: IpsumConfig) -> Result<Self, AppError> {
        let mistral = MistralClient::new(config.upstream.clone())?;
        let rate_limiter = create_ip_rate_limiter(
            config.rate_limit.requests,
            config.rate_limit.window_seconds,
        );

        Ok(Self {
            config,
            mistral,
            rate_limiter,
            started_at: Instant::now(),
        })
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) if value != "*" => Some(value),
            Ok(_) => {
                tracing::error!("Wildcard CORS origin is not allowed with credentials, skipping");
                None
            }
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(REQUEST_ID_HEADER)])
}

pub fn build_router(state: AppState) -> Router {
    metrics::init_metrics();

    // Only generation is rate limited
    let generate_route = Router::new()
        .route("/api/generate-lorem", post(handlers::generate_lorem))
        .layer(from_fn_with_state(
            IpRateLimit {
                limiter: state.rate_limiter.clone(),
                trust_proxy: state.config.rate_limit.trust_proxy,
            },
            ip_rate_limit_middleware,
        ));

    let cors = cors_layer(&state.config.security.allowed_origins);

    Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .merge(generate_route)
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: IpsumConfig) -> Result<Self, AppError> {
        let address = config.common.bind_address();
        let state = AppState::new(config)?;

        if state.mistral.is_configured() {
            tracing::info!(model = %state.mistral.model(), "Upstream provider configured");
        } else {
            tracing::warn!("MISTRAL_API_KEY is not configured; generation requests will fail");
        }

        tracing::info!(
            requests = state.config.rate_limit.requests,
            window_seconds = state.config.rate_limit.window_seconds,
            trust_proxy = state.config.rate_limit.trust_proxy,
            "Rate limiter initialized"
        );

        // Port 0 binds a random port (used by tests)
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Ipsum service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until a shutdown signal is received.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(
            self.listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}

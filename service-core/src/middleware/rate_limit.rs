use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

/// Rate limiter keyed by client IP address
pub type IpRateLimiter = Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>>;

/// Middleware state: the limiter plus how to identify the caller.
#[derive(Clone)]
pub struct IpRateLimit {
    pub limiter: IpRateLimiter,
    /// Key on the first `X-Forwarded-For` hop. Only safe behind a proxy
    /// that overwrites the header.
    pub trust_proxy: bool,
}

/// Longest window governor's nanosecond arithmetic can hold comfortably.
const MAX_WINDOW_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Create a keyed rate limiter allowing `attempts` requests per IP within
/// `window_seconds` (capped at 30 days). The whole quota is available as an
/// initial burst and replenishes evenly across the window.
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    let attempts = attempts.max(1);
    let window_ms = window_seconds
        .min(MAX_WINDOW_SECONDS)
        .saturating_mul(1000)
        .max(1);
    let period = Duration::from_millis((window_ms / attempts as u64).max(1));
    let burst = NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN);

    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst);

    Arc::new(RateLimiter::dashmap(quota))
}

/// Resolve the caller's IP. The socket peer is used unless `trust_proxy`
/// is set, in which case the first `X-Forwarded-For` hop wins.
pub fn client_ip(request: &Request, trust_proxy: bool) -> Option<IpAddr> {
    let forwarded_ip = trust_proxy
        .then(|| request.headers().get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    forwarded_ip.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(rate_limit): State<IpRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match client_ip(&request, rate_limit.trust_proxy) {
        Some(ip) => match rate_limit.limiter.check_key(&ip) {
            Ok(_) => Ok(next.run(request).await),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                tracing::warn!(
                    client_ip = %ip,
                    retry_after_secs = wait_time.as_secs(),
                    "Rate limit exceeded"
                );
                Err(AppError::TooManyRequests(
                    "Too many requests from this IP, please try again later.".to_string(),
                    Some(wait_time.as_secs()),
                ))
            }
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}

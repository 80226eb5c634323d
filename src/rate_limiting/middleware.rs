use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{instrument, warn};

use super::rate_limit_state::RateLimitState;
use crate::api::{error::ApiError, health_checks::HEALTH_PATH};

static RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
static RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
static RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");
static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Middleware function that enforces rate limits.
///
/// Identifies the client, then checks whether the request fits in its quota.
/// Allowed responses carry `RateLimit-*` headers; rejected requests get a 429
/// envelope with a `Retry-After` header. The health endpoint is exempt.
#[instrument(skip_all, fields(ip = tracing::field::Empty))]
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == HEALTH_PATH {
        return next.run(req).await;
    }

    let Some(ip) = client_ip(&req, state.config().trust_proxy) else {
        warn!("Could not determine client address, allowing request");
        return next.run(req).await;
    };

    tracing::Span::current().record("ip", tracing::field::display(&ip));

    match state.check_rate_limit(ip) {
        Ok(status) => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            insert_number(headers, &RATELIMIT_LIMIT, u64::from(status.limit));
            insert_number(headers, &RATELIMIT_REMAINING, u64::from(status.remaining));
            insert_number(headers, &RATELIMIT_RESET, ceil_secs(status.reset_after));
            response
        }
        Err(exceeded) => {
            let mut response = ApiError::TooManyRequests.into_response();
            let headers = response.headers_mut();
            let retry_after = ceil_secs(exceeded.retry_after);
            insert_number(headers, &header::RETRY_AFTER, retry_after);
            insert_number(headers, &RATELIMIT_LIMIT, u64::from(exceeded.limit));
            insert_number(headers, &RATELIMIT_REMAINING, 0);
            insert_number(headers, &RATELIMIT_RESET, retry_after);
            response
        }
    }
}

fn client_ip(req: &Request, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        let forwarded = req
            .headers()
            .get(&X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse().ok());

        if forwarded.is_some() {
            return forwarded;
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0.ip())
}

fn ceil_secs(duration: std::time::Duration) -> u64 {
    duration.as_millis().div_ceil(1000).try_into().unwrap_or(u64::MAX)
}

fn insert_number(headers: &mut HeaderMap, name: &HeaderName, value: u64) {
    headers.insert(name.clone(), HeaderValue::from(value));
}

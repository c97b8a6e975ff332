//! Ordered request gates for `/v1/*`: pre-auth IP bucket, bearer
//! authentication with a per-endpoint scope table, then the per-(tenant,
//! endpoint) rate limit. Handlers downstream only ever see authenticated,
//! in-budget requests.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

use agentos_auth::AuthContext;
use agentos_core::{ApiError, Scope};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::ratelimit::RateDecision;
use crate::state::AppState;

/// Client address for the pre-auth bucket. Behind a trusted proxy the first
/// `X-Forwarded-For` hop wins; otherwise the socket peer address.
pub fn client_ip(request: &Request, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        if let Some(forwarded) = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|value| value.trim().parse::<IpAddr>().ok())
        {
            return forwarded;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// The metrics/limits label for a request path: the first segment after
/// `/v1/` (so `/v1/admin/create-key` is `admin`), or the path itself for
/// the non-versioned endpoints.
pub fn endpoint_label(path: &str) -> String {
    match path.strip_prefix("/v1/") {
        Some(rest) => rest.split('/').next().unwrap_or("unknown").to_string(),
        None => path.trim_start_matches('/').to_string(),
    }
}

/// Scopes that may call each endpoint; `admin` always passes.
pub fn required_scopes(path: &str) -> &'static [Scope] {
    match endpoint_label(path).as_str() {
        "put" | "delete" => &[Scope::MemoryWrite],
        "search" => &[Scope::SearchRead],
        "admin" => &[Scope::Admin],
        _ => &[Scope::MemoryRead],
    }
}

fn limit_for_endpoint(state: &AppState, endpoint: &str) -> u32 {
    match endpoint {
        "search" => state.config.search_rate_limit_per_minute,
        "admin" => state.config.admin_rate_limit_per_minute,
        _ => state.config.rate_limit_requests_per_minute,
    }
}

fn apply_rate_headers(headers: &mut HeaderMap, prefix: &str, decision: &RateDecision) {
    let pairs = [
        (format!("{prefix}-Limit"), decision.limit.to_string()),
        (format!("{prefix}-Remaining"), decision.remaining.to_string()),
        (format!("{prefix}-Reset"), decision.reset_epoch_secs.to_string()),
    ];
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.insert(name, value);
        }
    }
}

/// Gate 1: per-IP token bucket, before any auth or database work.
pub async fn preauth_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request, state.config.trust_proxy);
    let decision = state.preauth.check(ip);

    if !decision.allowed {
        metrics::counter!("agentos_rate_limit_denials_total", "scope" => "preauth").increment(1);
        let mut response =
            AppError(ApiError::PreAuthRateLimited { retry_after_secs: decision.retry_after_secs })
                .into_response();
        apply_rate_headers(response.headers_mut(), "X-PreAuth-RateLimit", &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_headers(response.headers_mut(), "X-PreAuth-RateLimit", &decision);
    response
}

/// Gates 2 and 3: bearer authentication, then the endpoint scope table.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    let context = match state.authenticator.authenticate(header).await {
        Ok(context) => context,
        Err(err) => return AppError(err).into_response(),
    };

    if let Err(err) = context.require_any_scope(required_scopes(request.uri().path())) {
        return AppError(err).into_response();
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

/// Gate 4: per-(tenant, endpoint) window limit, after authentication.
pub async fn endpoint_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = endpoint_label(request.uri().path());
    let Some(context) = request.extensions().get::<AuthContext>().cloned() else {
        // The auth gate always runs first; a missing context is a wiring bug.
        return AppError(ApiError::internal("auth context missing")).into_response();
    };

    let limit = limit_for_endpoint(&state, &endpoint);
    let decision = state.windows.check(&context.tenant_id.to_string(), &endpoint, limit);

    if !decision.allowed {
        metrics::counter!("agentos_rate_limit_denials_total", "scope" => endpoint.clone())
            .increment(1);
        let mut response =
            AppError(ApiError::RateLimited { retry_after_secs: decision.retry_after_secs })
                .into_response();
        apply_rate_headers(response.headers_mut(), "X-RateLimit", &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_headers(response.headers_mut(), "X-RateLimit", &decision);
    response
}

/// Request count and duration metrics around every route.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = endpoint_label(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::histogram!("agentos_request_duration_seconds", "endpoint" => endpoint.clone())
        .record(start.elapsed().as_secs_f64());
    metrics::counter!("agentos_requests_total", "endpoint" => endpoint, "status" => status)
        .increment(1);
    response
}

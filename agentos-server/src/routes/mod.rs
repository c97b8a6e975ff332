//! Route table and layer stack.

mod admin;
mod memory;
mod search;
mod system;

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::middleware;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the full application router.
///
/// Gate order on `/v1/*` is pre-auth bucket → auth + scope → endpoint rate
/// limit → handler; `route_layer` stacks run outermost-last, so the layers
/// are added innermost-first below.
pub fn app(state: AppState) -> Router {
    let authed = Router::new()
        .route("/v1/put", post(memory::put))
        .route("/v1/get", post(memory::get))
        .route("/v1/delete", post(memory::delete))
        .route("/v1/history", post(memory::history))
        .route("/v1/list", post(memory::list))
        .route("/v1/glob", post(memory::glob))
        .route("/v1/dump", post(memory::dump))
        .route("/v1/agents", post(memory::agents))
        .route("/v1/search", post(search::search))
        .route("/v1/admin/requeue-jobs", post(admin::requeue_jobs))
        .route_layer(from_fn_with_state(state.clone(), middleware::endpoint_rate_limit))
        .route_layer(from_fn_with_state(state.clone(), middleware::authenticate));

    // The bootstrap endpoints authenticate with the admin token in their
    // bodies, not a bearer key: create-key must work before any key exists.
    let bootstrap = Router::new()
        .route("/v1/admin/create-key", post(admin::create_key))
        .route("/v1/admin/revoke-key", post(admin::revoke_key));

    let v1 = authed
        .merge(bootstrap)
        .route_layer(from_fn_with_state(state.clone(), middleware::preauth_limit));

    Router::new()
        .route("/healthz", get(system::healthz))
        .route("/metrics", get(system::metrics))
        .merge(v1)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn(middleware::track_requests))
        .with_state(state)
}

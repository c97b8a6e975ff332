use agentos_core::ApiError;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::observability::constant_time_eq;
use crate::state::AppState;

pub async fn healthz() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Prometheus text endpoint. Hidden unless `ENABLE_METRICS=true`; when
/// `METRICS_TOKEN` is set the bearer token is compared in constant time.
pub async fn metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if !state.config.enable_metrics {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }

    if let Some(expected) = &state.config.metrics_token {
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .unwrap_or("");
        if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            return Err(AppError(ApiError::Unauthorized));
        }
    }

    match &state.metrics {
        Some(handle) => Ok((
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        )
            .into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

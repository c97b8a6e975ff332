//! The single point where [`ApiError`] turns into a wire response.

use std::sync::OnceLock;

use agentos_core::ApiError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::json;

static PRODUCTION: OnceLock<bool> = OnceLock::new();

/// Record the production flag once at startup; 5xx detail is hidden when set.
pub fn set_production(production: bool) {
    let _ = PRODUCTION.set(production);
}

fn is_production() -> bool {
    *PRODUCTION.get().unwrap_or(&false)
}

/// Wrapper so the core error can implement axum's response conversion.
#[derive(Debug)]
pub struct AppError(pub ApiError);

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(code = err.code(), error = %err, "request failed");
        }

        let body = json!({
            "error": { "code": err.code(), "message": err.public_message(is_production()) }
        });
        let mut response = (status, Json(body)).into_response();
        if let Some(retry_after) = err.retry_after_secs() {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// JSON extractor whose rejection is the standard `VALIDATION_ERROR`
/// envelope rather than axum's plain-text default.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(AppError(map_rejection(rejection))),
        }
    }
}

fn map_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::Validation(rejection.body_text())
}

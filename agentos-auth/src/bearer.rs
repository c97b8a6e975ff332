use std::sync::LazyLock;

use agentos_core::{ApiError, Result};
use regex::Regex;

static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Bearer\s+(.+)$").expect("bearer regex"));
static KEY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("key id regex"));
static SECRET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("secret regex"));

/// Split an `Authorization` header value into `(key_id, secret)`.
///
/// The token is `<id>.<secret>`; both halves are length-bounded and limited
/// to URL-safe characters. Anything else is a plain 401; the caller learns
/// nothing about which part was wrong.
pub fn parse_bearer(header_value: &str) -> Result<(String, String)> {
    let token = BEARER_RE
        .captures(header_value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(ApiError::Unauthorized)?;

    let (id, secret) = token.split_once('.').ok_or(ApiError::Unauthorized)?;
    if !KEY_ID_RE.is_match(id) || !SECRET_RE.is_match(secret) {
        return Err(ApiError::Unauthorized);
    }
    Ok((id.to_string(), secret.to_string()))
}

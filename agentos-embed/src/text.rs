//! The deterministic text contract between stored versions and the embedding
//! provider, plus the token approximation recorded against the embed quota.

use serde_json::Value;

/// Embedding input is truncated to this many characters.
pub const MAX_EMBED_TEXT_CHARS: usize = 8000;

/// Bound recorded job errors so a pathological message cannot bloat the row.
pub const MAX_LAST_ERROR_CHARS: usize = 500;

/// Build the text embedded for a version:
/// `"path:<p>\nvalue:<json>\ntags:<json>"`, truncated to 8000 characters.
pub fn build_embedding_text(path: &str, value: &Value, tags: &[String]) -> String {
    let tags_json = Value::from(tags.to_vec()).to_string();
    let text = format!("path:{path}\nvalue:{value}\ntags:{tags_json}");
    truncate_chars(&text, MAX_EMBED_TEXT_CHARS)
}

/// Approximate token count: `ceil(len / 4)` over bytes.
pub fn approx_tokens(text: &str) -> i64 {
    (text.len().div_ceil(4)) as i64
}

/// Truncate on a character boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Reduce an error to a short recordable message.
pub fn short_error(message: &str) -> String {
    truncate_chars(message, MAX_LAST_ERROR_CHARS)
}

//! POSIX-like path semantics: normalization, the reserved `/sys` namespace,
//! and translation of glob patterns to SQL `LIKE` patterns with `\` as the
//! escape character.
//!
//! The glob translation is a documented approximation: `*` (like `**`) maps
//! to `%`, which crosses `/` boundaries. Strict segment semantics are
//! deliberately not implemented.

use crate::error::ApiError;

/// Total normalized path length cap, in bytes.
pub const MAX_PATH_BYTES: usize = 512;
/// Maximum number of `/`-separated segments.
pub const MAX_PATH_SEGMENTS: usize = 64;
/// Maximum glob pattern length, in characters.
pub const MAX_GLOB_CHARS: usize = 512;

/// Normalize a client-supplied path.
///
/// Collapses duplicate `/`, strips the trailing `/` (except for the root),
/// and rejects relative segments. The result always starts with `/`.
pub fn normalize_path(raw: &str) -> crate::Result<String> {
    if !raw.starts_with('/') {
        return Err(ApiError::InvalidPath("path must start with '/'".to_string()));
    }

    let mut segments = Vec::new();
    for segment in raw.split('/') {
        if segment.is_empty() {
            continue;
        }
        if segment == "." || segment == ".." {
            return Err(ApiError::InvalidPath(
                "path must not contain '.' or '..' segments".to_string(),
            ));
        }
        segments.push(segment);
    }

    if segments.len() > MAX_PATH_SEGMENTS {
        return Err(ApiError::InvalidPath(format!(
            "path exceeds {MAX_PATH_SEGMENTS} segments"
        )));
    }

    let normalized = if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    };

    if normalized.len() > MAX_PATH_BYTES {
        return Err(ApiError::InvalidPath(format!("path exceeds {MAX_PATH_BYTES} bytes")));
    }

    Ok(normalized)
}

/// Paths under `/sys` are read-only to clients.
pub fn is_reserved(path: &str) -> bool {
    path == "/sys" || path.starts_with("/sys/")
}

/// Validate a glob pattern before translation.
pub fn validate_glob(pattern: &str) -> crate::Result<()> {
    if !pattern.starts_with('/') {
        return Err(ApiError::InvalidPath("glob pattern must start with '/'".to_string()));
    }
    if pattern.chars().count() > MAX_GLOB_CHARS {
        return Err(ApiError::InvalidPath(format!(
            "glob pattern exceeds {MAX_GLOB_CHARS} characters"
        )));
    }
    for segment in pattern[1..].split('/') {
        if segment.is_empty() {
            return Err(ApiError::InvalidPath(
                "glob pattern must not contain empty segments".to_string(),
            ));
        }
        if segment == "." || segment == ".." {
            return Err(ApiError::InvalidPath(
                "glob pattern must not contain '.' or '..' segments".to_string(),
            ));
        }
    }
    Ok(())
}

/// Translate a glob pattern to a `LIKE` pattern, applied left to right:
/// `**` and `*` become `%`, `?` becomes `_`, and each of `%`, `_`, `\` in
/// the input is escaped with `\`.
pub fn glob_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                }
                out.push('%');
            }
            '?' => out.push('_'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out
}

/// Escape a literal string for use as a `LIKE` prefix, so `%`, `_`, and `\`
/// in the input match only themselves.
pub fn escape_like(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// The directory base a LIST prefix expands to: `prefix + "/"`, except the
/// root, which is already a directory.
pub fn list_base(prefix: &str) -> String {
    if prefix == "/" {
        "/".to_string()
    } else {
        format!("{prefix}/")
    }
}

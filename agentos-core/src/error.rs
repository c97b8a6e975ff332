use thiserror::Error;

/// Every failure the request pipeline can surface, carrying enough shape to
/// render the wire envelope `{"error":{"code","message"}}` plus the HTTP
/// status. Handlers raise these; a single emitter at the transport boundary
/// turns them into responses and metrics.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("missing or invalid bearer credentials")]
    Unauthorized,

    #[error("key does not grant the required scope")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidPath(String),

    #[error("path is reserved for system use")]
    ReservedPath,

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("pre-auth rate limit exceeded")]
    PreAuthRateLimited { retry_after_secs: u64 },

    #[error("too many failed authentication attempts for this key id")]
    AuthLockout,

    #[error("daily write quota exceeded")]
    QuotaWrites,

    #[error("daily search quota exceeded")]
    QuotaSearches,

    #[error("daily embedding token quota exceeded")]
    QuotaEmbedTokens,

    #[error("idempotency key must be 1-128 ASCII characters of [A-Za-z0-9_-]")]
    InvalidIdempotencyKey,

    #[error("idempotency key was already used with a different request body")]
    IdempotencyKeyMismatch,

    #[error("no embeddings provider is configured")]
    EmbeddingsNotConfigured,

    #[error("Embeddings service temporarily unavailable")]
    EmbeddingsApi,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Wrap an unexpected failure. The wrapped detail is logged server-side
    /// and replaced by a generic message in production responses.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }

    /// Stable machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::InvalidPath(_) => "INVALID_PATH",
            ApiError::ReservedPath => "RESERVED_PATH",
            ApiError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::PreAuthRateLimited { .. } => "PREAUTH_RATE_LIMIT_EXCEEDED",
            ApiError::AuthLockout => "AUTH_LOCKOUT",
            ApiError::QuotaWrites => "QUOTA_WRITES_PER_DAY",
            ApiError::QuotaSearches => "QUOTA_SEARCHES",
            ApiError::QuotaEmbedTokens => "QUOTA_EMBED_TOKENS_PER_DAY",
            ApiError::InvalidIdempotencyKey => "INVALID_IDEMPOTENCY_KEY",
            ApiError::IdempotencyKeyMismatch => "IDEMPOTENCY_KEY_MISMATCH",
            ApiError::EmbeddingsNotConfigured => "EMBEDDINGS_NOT_CONFIGURED",
            ApiError::EmbeddingsApi => "EMBEDDINGS_API_ERROR",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status the envelope is emitted with.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Unauthorized => 401,
            ApiError::Forbidden | ApiError::ReservedPath => 403,
            ApiError::Validation(_) | ApiError::InvalidPath(_) | ApiError::InvalidIdempotencyKey => {
                400
            }
            ApiError::RateLimited { .. }
            | ApiError::PreAuthRateLimited { .. }
            | ApiError::AuthLockout
            | ApiError::QuotaWrites
            | ApiError::QuotaSearches
            | ApiError::QuotaEmbedTokens => 429,
            ApiError::IdempotencyKeyMismatch => 422,
            ApiError::EmbeddingsNotConfigured => 503,
            ApiError::EmbeddingsApi => 502,
            ApiError::Internal(_) => 500,
        }
    }

    /// Seconds to advertise in `Retry-After`, when the error is a flow-control
    /// denial with a known horizon.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited { retry_after_secs }
            | ApiError::PreAuthRateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Message as rendered to clients. In production, internal detail is
    /// replaced so nothing about the failure leaks.
    pub fn public_message(&self, production: bool) -> String {
        match self {
            ApiError::Internal(_) if production => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

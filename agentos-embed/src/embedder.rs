use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Vectors are fixed at this dimension; the database column is `vector(1536)`.
pub const EMBEDDING_DIMENSION: usize = 1536;

/// Outbound calls abort after this long.
pub const EMBED_TIMEOUT: Duration = Duration::from_secs(15);

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Why an embedding call failed. Deliberately carries no upstream response
/// content; only the status survives.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request timed out")]
    Timeout,

    #[error("embedding provider returned status {status}")]
    Api { status: u16 },

    #[error("embedding provider returned an invalid vector")]
    InvalidVector,

    #[error("embedding request failed to send")]
    Transport,
}

/// Abstract embedding provider: text in, fixed-dimension vector out, bounded
/// by [`EMBED_TIMEOUT`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded alongside stored vectors.
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// OpenAI `/v1/embeddings` client.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> agentos_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(EMBED_TIMEOUT)
            .build()
            .map_err(|err| agentos_core::ApiError::internal(format!("http client: {err}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": text }))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    EmbedError::Timeout
                } else {
                    tracing::warn!("embedding request failed to send");
                    EmbedError::Transport
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            // The body is dropped unread; only the status is observable.
            tracing::warn!(status = status.as_u16(), "embedding provider returned an error");
            return Err(EmbedError::Api { status: status.as_u16() });
        }

        let parsed: EmbeddingsResponse =
            response.json().await.map_err(|_| EmbedError::InvalidVector)?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or(EmbedError::InvalidVector)?;

        if vector.is_empty() || vector.iter().any(|v| !v.is_finite()) {
            return Err(EmbedError::InvalidVector);
        }
        Ok(vector)
    }
}

/// Deterministic in-process embedder for tests: the vector is derived from
/// the text bytes, so equal inputs embed equally and different inputs rarely
/// collide.
pub struct MockEmbedder {
    dimension: usize,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self { dimension: EMBEDDING_DIMENSION, calls: AtomicUsize::new(0), fail: AtomicBool::new(false) }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension, calls: AtomicUsize::new(0), fail: AtomicBool::new(false) }
    }

    /// Make subsequent calls fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model(&self) -> &str {
        "mock-embedder"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbedError::Api { status: 500 });
        }
        let mut seed = 0u64;
        for byte in text.bytes() {
            seed = seed.wrapping_mul(31).wrapping_add(u64::from(byte));
        }
        let vector = (0..self.dimension)
            .map(|i| {
                let x = seed.wrapping_add(i as u64).wrapping_mul(2654435761) as u32;
                (x as f32 / u32::MAX as f32) - 0.5
            })
            .collect();
        Ok(vector)
    }
}

//! Vector similarity search: embed the query, rank by cosine distance,
//! post-filter by tags. Rate limiting happens in the transport pipeline;
//! the daily search quota is counted here, before any provider call.

use agentos_core::{path as paths, AgentName, ApiError, Result, TenantId, VersionId};
use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::Serialize;
use serde_json::Value;

use crate::memory::MemoryEngine;

pub const SEARCH_LIMIT_MAX: i64 = 50;
pub const SEARCH_LIMIT_DEFAULT: i64 = 10;
pub const QUERY_MAX_CHARS: usize = 2000;
pub const PATH_PREFIX_MAX_CHARS: usize = 512;
pub const TAGS_ANY_MAX: usize = 20;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub agent: AgentName,
    pub query: String,
    pub limit: Option<i64>,
    pub path_prefix: Option<String>,
    pub tags_any: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub value: Value,
    pub tags: Vec<String>,
    pub similarity: f64,
    pub version_id: VersionId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// No embedder configured; the caller renders an empty result with a note.
    NotConfigured,
    Hits(Vec<SearchHit>),
}

impl MemoryEngine {
    pub async fn search(
        &self,
        tenant_id: TenantId,
        request: SearchRequest,
    ) -> Result<SearchOutcome> {
        if request.query.is_empty() || request.query.chars().count() > QUERY_MAX_CHARS {
            return Err(ApiError::Validation(format!(
                "query must be 1-{QUERY_MAX_CHARS} characters"
            )));
        }
        if request.tags_any.len() > TAGS_ANY_MAX {
            return Err(ApiError::Validation(format!(
                "tags_any accepts at most {TAGS_ANY_MAX} tags"
            )));
        }
        if let Some(prefix) = &request.path_prefix {
            if prefix.chars().count() > PATH_PREFIX_MAX_CHARS {
                return Err(ApiError::Validation(format!(
                    "path_prefix must be at most {PATH_PREFIX_MAX_CHARS} characters"
                )));
            }
        }
        let limit = request.limit.unwrap_or(SEARCH_LIMIT_DEFAULT).clamp(1, SEARCH_LIMIT_MAX);

        self.quotas().record_search(tenant_id).await?;

        let Some(embedder) = &self.embedder else {
            return Ok(SearchOutcome::NotConfigured);
        };

        let query_vector = embedder.embed(&request.query).await.map_err(|err| {
            tracing::warn!(error = %err, "query embedding failed");
            ApiError::EmbeddingsApi
        })?;

        let prefix_pattern = request
            .path_prefix
            .as_deref()
            .map(|prefix| format!("{}%", paths::escape_like(prefix)));

        let rows = agentos_store::embeddings::search_similar(
            self.pool(),
            tenant_id.as_uuid(),
            request.agent.as_str(),
            Vector::from(query_vector),
            prefix_pattern.as_deref(),
            limit,
        )
        .await?;

        let hits = rows
            .into_iter()
            .filter(|row| {
                request.tags_any.is_empty()
                    || row.tags.iter().any(|tag| request.tags_any.contains(tag))
            })
            .map(|row| SearchHit {
                path: row.path,
                value: row.value,
                tags: row.tags,
                similarity: row.similarity,
                version_id: VersionId::from(row.version_id),
                created_at: row.created_at,
            })
            .collect();

        Ok(SearchOutcome::Hits(hits))
    }
}

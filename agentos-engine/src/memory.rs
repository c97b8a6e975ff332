//! Core PUT/GET/DELETE/HISTORY/LIST/GLOB/DUMP/AGENTS semantics.
//!
//! Writes append an immutable version and move the latest pointer in one
//! transaction. A DELETE is just another version (a tombstone), so the
//! audit trail survives and a later PUT resurrects the path. Reads join
//! through the latest pointer and hide tombstones and expired versions.

use std::sync::Arc;

use agentos_core::{
    canonical, path as paths, AgentName, ApiError, Result, TenantId, VersionId,
};
use agentos_embed::text::{build_embedding_text, short_error};
use agentos_embed::Embedder;
use agentos_store::entries::{self, NewVersion};
use agentos_store::{jobs, PgPool};
use chrono::{DateTime, Duration, Utc};
use pgvector::Vector;
use serde::Serialize;
use serde_json::Value;

use crate::dump_cache::DumpCache;
use crate::quota::QuotaService;

/// Row caps and limit defaults, per operation.
pub const LIST_CAP: i64 = 500;
pub const GLOB_CAP: i64 = 500;
pub const HISTORY_MAX: i64 = 100;
pub const HISTORY_DEFAULT: i64 = 20;
pub const DUMP_MAX: i64 = 500;
pub const DUMP_DEFAULT: i64 = 200;

#[derive(Debug, Clone)]
pub struct PutRequest {
    pub agent: AgentName,
    pub path: String,
    pub value: Value,
    pub ttl_seconds: Option<i64>,
    pub tags: Vec<String>,
    pub importance: Option<f64>,
    pub searchable: bool,
}

/// What a successful write returns.
#[derive(Debug, Clone, Serialize)]
pub struct WriteReceipt {
    pub version_id: VersionId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub path: String,
    pub value: Value,
    pub version_id: VersionId,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum GetOutcome {
    Miss,
    Hit(EntryView),
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub version_id: VersionId,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct DumpEntry {
    pub path: String,
    pub value: Value,
    pub tags: Vec<String>,
    pub importance: f64,
    pub version_id: VersionId,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct DumpOutcome {
    pub entries: Vec<DumpEntry>,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub id: String,
    pub memory_count: i64,
}

pub struct MemoryEngine {
    pool: PgPool,
    quotas: QuotaService,
    dump_cache: DumpCache,
    pub(crate) embedder: Option<Arc<dyn Embedder>>,
}

impl MemoryEngine {
    pub fn new(pool: PgPool, quotas: QuotaService, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { pool, quotas, dump_cache: DumpCache::new(), embedder }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Whether an embedding provider is wired in. Without one, search
    /// degrades to an empty result and queued jobs stay queued.
    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    pub(crate) fn quotas(&self) -> &QuotaService {
        &self.quotas
    }

    /// Append a new version and point the triple at it.
    pub async fn put(&self, tenant_id: TenantId, request: PutRequest) -> Result<WriteReceipt> {
        let path = paths::normalize_path(&request.path)?;
        if paths::is_reserved(&path) {
            return Err(ApiError::ReservedPath);
        }

        let importance = request.importance.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&importance) {
            return Err(ApiError::Validation("importance must be within [0, 1]".to_string()));
        }
        if let Some(ttl) = request.ttl_seconds {
            if ttl < 1 {
                return Err(ApiError::Validation("ttl_seconds must be positive".to_string()));
            }
        }

        let version_id = VersionId::new();
        let created_at = Utc::now();
        let expires_at = request.ttl_seconds.map(|ttl| created_at + Duration::seconds(ttl));
        let content_hash = canonical::content_hash(&path, &request.value);

        entries::insert_version(
            &self.pool,
            &NewVersion {
                id: version_id.as_uuid(),
                tenant_id: tenant_id.as_uuid(),
                agent_id: request.agent.as_str(),
                path: &path,
                value: &request.value,
                tags: &request.tags,
                importance,
                searchable: request.searchable,
                content_hash: &content_hash,
                created_at,
                expires_at,
                deleted_at: None,
            },
        )
        .await?;

        if request.searchable {
            self.embed_or_enqueue(tenant_id, version_id, &request, &path).await?;
        }

        self.dump_cache.invalidate(tenant_id.as_uuid(), request.agent.as_str());
        tracing::debug!(
            tenant_id = %tenant_id,
            agent = request.agent.as_str(),
            path = %path,
            version_id = %version_id,
            "put"
        );
        Ok(WriteReceipt { version_id, created_at })
    }

    /// Try the configured embedder inline; fall back to the queue. A failed
    /// inline attempt never fails the write.
    async fn embed_or_enqueue(
        &self,
        tenant_id: TenantId,
        version_id: VersionId,
        request: &PutRequest,
        path: &str,
    ) -> Result<()> {
        let Some(embedder) = &self.embedder else {
            return jobs::enqueue(&self.pool, version_id.as_uuid(), tenant_id.as_uuid(), None)
                .await;
        };

        let text = build_embedding_text(path, &request.value, &request.tags);
        match embedder.embed(&text).await {
            Ok(vector) => {
                agentos_store::embeddings::upsert_embedding(
                    &self.pool,
                    version_id.as_uuid(),
                    tenant_id.as_uuid(),
                    request.agent.as_str(),
                    path,
                    embedder.model(),
                    Vector::from(vector),
                )
                .await?;
                jobs::record_done(&self.pool, version_id.as_uuid(), tenant_id.as_uuid()).await
            }
            Err(err) => {
                let message = short_error(&err.to_string());
                tracing::debug!(version_id = %version_id, error = %message, "inline embed failed, queueing");
                jobs::enqueue(
                    &self.pool,
                    version_id.as_uuid(),
                    tenant_id.as_uuid(),
                    Some(&message),
                )
                .await
            }
        }
    }

    /// Latest visible value for a path, if any.
    pub async fn get(
        &self,
        tenant_id: TenantId,
        agent: &AgentName,
        raw_path: &str,
    ) -> Result<GetOutcome> {
        let path = paths::normalize_path(raw_path)?;
        let row =
            entries::fetch_latest_visible(&self.pool, tenant_id.as_uuid(), agent.as_str(), &path)
                .await?;
        Ok(match row {
            None => GetOutcome::Miss,
            Some(row) => GetOutcome::Hit(EntryView {
                path: row.path,
                value: row.value,
                version_id: VersionId::from(row.id),
                created_at: row.created_at,
                expires_at: row.expires_at,
                tags: row.tags,
            }),
        })
    }

    /// Append a tombstone. Idempotent from the client's point of view: the
    /// path reads as absent afterwards either way.
    pub async fn delete(
        &self,
        tenant_id: TenantId,
        agent: &AgentName,
        raw_path: &str,
    ) -> Result<WriteReceipt> {
        let path = paths::normalize_path(raw_path)?;
        if paths::is_reserved(&path) {
            return Err(ApiError::ReservedPath);
        }

        let version_id = VersionId::new();
        let created_at = Utc::now();
        let empty = Value::Object(serde_json::Map::new());

        entries::insert_version(
            &self.pool,
            &NewVersion {
                id: version_id.as_uuid(),
                tenant_id: tenant_id.as_uuid(),
                agent_id: agent.as_str(),
                path: &path,
                value: &empty,
                tags: &[],
                importance: 0.5,
                searchable: false,
                content_hash: canonical::TOMBSTONE_CONTENT_HASH,
                created_at,
                expires_at: None,
                deleted_at: Some(created_at),
            },
        )
        .await?;

        self.dump_cache.invalidate(tenant_id.as_uuid(), agent.as_str());
        tracing::debug!(tenant_id = %tenant_id, agent = agent.as_str(), path = %path, "delete");
        Ok(WriteReceipt { version_id, created_at })
    }

    /// Version history, newest first, tombstones and expired included.
    pub async fn history(
        &self,
        tenant_id: TenantId,
        agent: &AgentName,
        raw_path: &str,
        limit: Option<i64>,
    ) -> Result<Vec<HistoryEntry>> {
        let path = paths::normalize_path(raw_path)?;
        let limit = limit.unwrap_or(HISTORY_DEFAULT).clamp(1, HISTORY_MAX);
        let rows =
            entries::fetch_history(&self.pool, tenant_id.as_uuid(), agent.as_str(), &path, limit)
                .await?;
        Ok(rows
            .into_iter()
            .map(|row| HistoryEntry {
                version_id: VersionId::from(row.id),
                value: row.value,
                created_at: row.created_at,
                expires_at: row.expires_at,
                deleted_at: row.deleted_at,
            })
            .collect())
    }

    /// Direct children of a prefix, classified as files or directories.
    pub async fn list(
        &self,
        tenant_id: TenantId,
        agent: &AgentName,
        raw_prefix: &str,
    ) -> Result<Vec<ListItem>> {
        let prefix = paths::normalize_path(raw_prefix)?;
        let base = paths::list_base(&prefix);
        let pattern = format!("{}%", paths::escape_like(&base));
        let rows = entries::fetch_paths_like(
            &self.pool,
            tenant_id.as_uuid(),
            agent.as_str(),
            &pattern,
            LIST_CAP,
        )
        .await?;
        Ok(classify_children(&base, &rows))
    }

    /// Paths matching a glob pattern, ascending, capped.
    pub async fn glob(
        &self,
        tenant_id: TenantId,
        agent: &AgentName,
        pattern: &str,
    ) -> Result<Vec<String>> {
        paths::validate_glob(pattern)?;
        let like = paths::glob_to_like(pattern);
        entries::fetch_paths_like(&self.pool, tenant_id.as_uuid(), agent.as_str(), &like, GLOB_CAP)
            .await
    }

    /// Every visible entry for an agent, newest first, behind a 60-second
    /// cache that PUT/DELETE invalidate.
    pub async fn dump(
        &self,
        tenant_id: TenantId,
        agent: &AgentName,
        limit: Option<i64>,
    ) -> Result<DumpOutcome> {
        let limit = limit.unwrap_or(DUMP_DEFAULT).clamp(1, DUMP_MAX);

        if let Some(entries) = self.dump_cache.get(tenant_id.as_uuid(), agent.as_str(), limit) {
            metrics::counter!("agentos_dump_cache_total", "result" => "hit").increment(1);
            return Ok(DumpOutcome { entries, cache_hit: true });
        }
        metrics::counter!("agentos_dump_cache_total", "result" => "miss").increment(1);

        let rows =
            entries::fetch_dump(&self.pool, tenant_id.as_uuid(), agent.as_str(), limit).await?;
        let entries: Vec<DumpEntry> = rows
            .into_iter()
            .map(|row| DumpEntry {
                path: row.path,
                value: row.value,
                tags: row.tags,
                importance: row.importance,
                version_id: VersionId::from(row.id),
                created_at: row.created_at,
                expires_at: row.expires_at,
            })
            .collect();

        self.dump_cache.insert(tenant_id.as_uuid(), agent.as_str(), limit, entries.clone());
        Ok(DumpOutcome { entries, cache_hit: false })
    }

    /// Distinct agents for the tenant with visible entry counts.
    pub async fn agents(&self, tenant_id: TenantId) -> Result<Vec<AgentInfo>> {
        let rows = entries::fetch_agents(&self.pool, tenant_id.as_uuid()).await?;
        Ok(rows
            .into_iter()
            .map(|row| AgentInfo { id: row.agent_id, memory_count: row.memory_count })
            .collect())
    }
}

/// Reduce matched paths to direct children of `base`: the suffix's first
/// segment, classified `dir` when more path follows it, deduplicated by
/// child path (first classification wins; rows arrive path-ascending).
pub fn classify_children(base: &str, matched_paths: &[String]) -> Vec<ListItem> {
    let mut seen = std::collections::HashSet::new();
    let mut items = Vec::new();
    for path in matched_paths {
        let Some(suffix) = path.strip_prefix(base) else {
            continue;
        };
        let Some(first_segment) = suffix.split('/').next().filter(|s| !s.is_empty()) else {
            continue;
        };
        let child_path = format!("{base}{first_segment}");
        if !seen.insert(child_path.clone()) {
            continue;
        }
        let kind = if suffix.len() > first_segment.len() { EntryKind::Dir } else { EntryKind::File };
        items.push(ListItem { path: child_path, kind });
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classify_direct_files_and_dirs() {
        let items = classify_children("/", &paths(&["/a", "/b", "/sub/c"]));
        assert!(items.contains(&ListItem { path: "/a".into(), kind: EntryKind::File }));
        assert!(items.contains(&ListItem { path: "/b".into(), kind: EntryKind::File }));
        assert!(items.contains(&ListItem { path: "/sub".into(), kind: EntryKind::Dir }));
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_classify_nested_base() {
        let items =
            classify_children("/proj/", &paths(&["/proj/readme", "/proj/src/main", "/proj/src/lib"]));
        assert!(items.contains(&ListItem { path: "/proj/readme".into(), kind: EntryKind::File }));
        assert!(items.contains(&ListItem { path: "/proj/src".into(), kind: EntryKind::Dir }));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_classify_deduplicates_children() {
        let items = classify_children("/", &paths(&["/sub/a", "/sub/b", "/sub/c/d"]));
        assert_eq!(items, vec![ListItem { path: "/sub".into(), kind: EntryKind::Dir }]);
    }

    #[test]
    fn test_classify_skips_foreign_paths() {
        let items = classify_children("/a/", &paths(&["/b/x", "/a/y"]));
        assert_eq!(items, vec![ListItem { path: "/a/y".into(), kind: EntryKind::File }]);
    }

    #[test]
    fn test_list_item_serializes_with_type_field() {
        let item = ListItem { path: "/sub".into(), kind: EntryKind::Dir };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json, serde_json::json!({"path": "/sub", "type": "dir"}));
    }
}

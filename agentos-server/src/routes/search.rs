use agentos_auth::AuthContext;
use agentos_core::AgentName;
use agentos_engine::{SearchOutcome, SearchRequest};
use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiJson, AppError};
use crate::state::AppState;

#[derive(Deserialize)]
pub(super) struct SearchBody {
    agent_id: AgentName,
    query: String,
    limit: Option<i64>,
    path_prefix: Option<String>,
    #[serde(default)]
    tags_any: Vec<String>,
}

pub async fn search(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiJson(body): ApiJson<SearchBody>,
) -> Result<Json<Value>, AppError> {
    let outcome = state
        .engine
        .search(
            ctx.tenant_id,
            SearchRequest {
                agent: body.agent_id,
                query: body.query,
                limit: body.limit,
                path_prefix: body.path_prefix,
                tags_any: body.tags_any,
            },
        )
        .await?;

    Ok(Json(match outcome {
        SearchOutcome::NotConfigured => json!({
            "results": [],
            "note": "semantic search is disabled: no embeddings provider is configured",
        }),
        SearchOutcome::Hits(hits) => json!({ "results": hits }),
    }))
}

//! Agent session endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::extract::JsonBody;
use super::middleware_auth::{pick_token, BearerToken};
use super::AppState;
use crate::agent::IterationRequest;
use crate::connection::parse_uuid;
use crate::error::{AgentError, AgentResult};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Deserialize)]
pub struct ListParams {
    limit: Option<i64>,
}

impl ListParams {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

pub async fn handler_iterate(
    State(state): State<Arc<AppState>>,
    BearerToken(header_token): BearerToken,
    JsonBody(mut req): JsonBody<IterationRequest>,
) -> AgentResult<Json<Value>> {
    req.access_token = pick_token(req.access_token.as_deref(), header_token);
    let result = state.orchestrator.iterate(req).await?;
    Ok(Json(serde_json::to_value(result).map_err(anyhow::Error::from)?))
}

pub async fn handler_session_get(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    Path(id): Path<String>,
) -> AgentResult<Json<Value>> {
    let session_id = parse_uuid(&id, "sessionId")?;
    let (session, role) = state
        .orchestrator
        .authorize_session(session_id, token.as_deref())
        .await?;
    Ok(Json(json!({"session": session, "role": role})))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct AbortBody {
    access_token: Option<String>,
}

pub async fn handler_session_abort(
    State(state): State<Arc<AppState>>,
    BearerToken(header_token): BearerToken,
    Path(id): Path<String>,
    body: Bytes,
) -> AgentResult<Json<Value>> {
    let session_id = parse_uuid(&id, "sessionId")?;
    let body: AbortBody = if body.is_empty() {
        AbortBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AgentError::validation(format!("Invalid JSON body: {}", e)))?
    };
    let token = pick_token(body.access_token.as_deref(), header_token);
    let (_, role) = state
        .orchestrator
        .authorize_session(session_id, token.as_deref())
        .await?;
    if !role.can_execute() {
        return Err(AgentError::access_denied("Viewers cannot abort agent sessions"));
    }
    let session = state.orchestrator.abort(session_id).await?;
    Ok(Json(json!({"session": session, "status": "aborted"})))
}

pub async fn handler_session_messages(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> AgentResult<Json<Value>> {
    let session_id = parse_uuid(&id, "sessionId")?;
    state
        .orchestrator
        .authorize_session(session_id, token.as_deref())
        .await?;
    let messages = state.orchestrator.messages(session_id, params.limit()).await?;
    Ok(Json(json!({"messages": messages})))
}

pub async fn handler_session_blackboard(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> AgentResult<Json<Value>> {
    let session_id = parse_uuid(&id, "sessionId")?;
    state
        .orchestrator
        .authorize_session(session_id, token.as_deref())
        .await?;
    let entries = state.orchestrator.blackboard(session_id, params.limit()).await?;
    Ok(Json(json!({"entries": entries})))
}

//! `POST /api/sql`: one SQL action against a target database.
//!
//! The body carries the action name, the target and the action's own
//! parameters side by side:
//!
//! ```json
//! {"action": "get_table_data", "projectId": "…", "connectionId": "…", "table": "users", "limit": 10}
//! ```

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use super::extract::JsonBody;
use super::middleware_auth::{pick_token, BearerToken};
use super::AppState;
use crate::agent::MigrationRecord;
use crate::connection::{parse_uuid, ConnectionTarget};
use crate::error::{AgentError, AgentResult};
use crate::executor::SqlAction;

fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

pub async fn handler_sql(
    State(state): State<Arc<AppState>>,
    BearerToken(header_token): BearerToken,
    JsonBody(body): JsonBody<Value>,
) -> AgentResult<Json<Value>> {
    if !body.is_object() {
        return Err(AgentError::validation("Request body must be a JSON object"));
    }
    let action_name = str_field(&body, "action").ok_or_else(|| AgentError::validation("action is required"))?;
    let project_id = parse_uuid(
        str_field(&body, "projectId").ok_or_else(|| AgentError::validation("projectId is required"))?,
        "projectId",
    )?;
    let target = ConnectionTarget::from_ids(str_field(&body, "databaseId"), str_field(&body, "connectionId"))?;
    let action = SqlAction::parse(action_name, &body)?;
    let token = pick_token(str_field(&body, "accessToken"), header_token);

    let resolver = state.orchestrator.resolver();
    let resolved = resolver.resolve(target, project_id, token.as_deref()).await?;
    info!(action = action.name(), conn = %resolved.target.label(), role = %resolved.role, "sql request");

    let mut runner = state.tools.open(&resolved);
    let outcome = runner.run(&action).await;
    runner.close().await;
    let outcome = outcome?;

    for stmt in &outcome.applied_ddl {
        let record = MigrationRecord::from_statement(project_id, None, stmt);
        state.orchestrator.store().record_migration(&record).await?;
    }
    if let Some(batch) = &outcome.batch {
        state.metrics.count_batch(batch);
    }
    let success = outcome.data.get("success").and_then(Value::as_bool).unwrap_or(true);
    Ok(Json(json!({
        "success": success,
        "action": action.name(),
        "data": outcome.data,
    })))
}

//! Agent session lifecycle.
//!
//! `active` → `completed` | `aborted`. The abort flag is set by the abort
//! endpoint and checked at the start of every iteration; the iteration
//! counter is bumped together with the status so both always agree.

use anyhow::Result;
use uuid::Uuid;

use super::{AgentSessionRow, Database};

const SESSION_COLUMNS: &str = "id, project_id, task_description, agent_type, status,
        abort_requested, iteration_count, created_at, updated_at";

impl Database {
    pub async fn create_agent_session(
        &self,
        project_id: Uuid,
        task_description: &str,
        agent_type: &str,
    ) -> Result<AgentSessionRow> {
        let row = sqlx::query_as::<_, AgentSessionRow>(&format!(
            "INSERT INTO agent_sessions (project_id, task_description, agent_type)
             VALUES ($1, $2, $3)
             RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(project_id)
        .bind(task_description)
        .bind(agent_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_agent_session(&self, id: Uuid) -> Result<Option<AgentSessionRow>> {
        let row = sqlx::query_as::<_, AgentSessionRow>(&format!(
            "SELECT {} FROM agent_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Increment the iteration counter and set the status atomically.
    ///
    /// An abort requested while the iteration was running is kept: the
    /// session stays `aborted` whatever status the iteration reports.
    pub async fn record_session_iteration(&self, id: Uuid, status: &str) -> Result<AgentSessionRow> {
        let row = sqlx::query_as::<_, AgentSessionRow>(&format!(
            "UPDATE agent_sessions
             SET iteration_count = iteration_count + 1,
                 status = CASE WHEN abort_requested THEN 'aborted' ELSE $2 END,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Set the abort flag. Idempotent; returns `None` for unknown sessions.
    pub async fn request_session_abort(&self, id: Uuid) -> Result<Option<AgentSessionRow>> {
        let row = sqlx::query_as::<_, AgentSessionRow>(&format!(
            "UPDATE agent_sessions
             SET abort_requested = TRUE, status = 'aborted', updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

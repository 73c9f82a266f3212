//! Conversation history.

use anyhow::Result;
use serde_json::Value;
use uuid::Uuid;

use super::{AgentMessageRow, Database};

impl Database {
    pub async fn insert_agent_message(
        &self,
        session_id: Uuid,
        role: &str,
        content: &str,
        metadata: &Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_messages (session_id, role, content, metadata)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent `limit` messages, returned oldest-first.
    pub async fn get_recent_agent_messages(&self, session_id: Uuid, limit: i64) -> Result<Vec<AgentMessageRow>> {
        let rows = sqlx::query_as::<_, AgentMessageRow>(
            "SELECT id, session_id, role, content, metadata, created_at
             FROM (
                 SELECT id, session_id, role, content, metadata, created_at
                 FROM agent_messages WHERE session_id = $1
                 ORDER BY created_at DESC, id DESC LIMIT $2
             ) recent
             ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

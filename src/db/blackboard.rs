//! Planning journal storage. Listed most-recent-first.

use anyhow::Result;
use uuid::Uuid;

use super::{BlackboardEntryRow, Database};

impl Database {
    pub async fn insert_blackboard_entry(&self, session_id: Uuid, entry_type: &str, content: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_blackboard (session_id, entry_type, content)
             VALUES ($1, $2, $3)",
        )
        .bind(session_id)
        .bind(entry_type)
        .bind(content)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_blackboard_entries(&self, session_id: Uuid, limit: i64) -> Result<Vec<BlackboardEntryRow>> {
        let rows = sqlx::query_as::<_, BlackboardEntryRow>(
            "SELECT id, session_id, entry_type, content, created_at
             FROM agent_blackboard WHERE session_id = $1
             ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

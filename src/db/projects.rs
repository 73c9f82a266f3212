//! Project membership.
//!
//! The project owner is always `owner`; everyone else gets the role recorded
//! in `project_members`, or nothing.

use anyhow::Result;
use uuid::Uuid;

use super::Database;

impl Database {
    pub async fn get_project_role(&self, project_id: Uuid, user_id: &str) -> Result<Option<String>> {
        let role = sqlx::query_scalar::<_, Option<String>>(
            "SELECT CASE WHEN p.owner_id::text = $2 THEN 'owner' ELSE m.role END
             FROM projects p
             LEFT JOIN project_members m ON m.project_id = p.id AND m.user_id::text = $2
             WHERE p.id = $1",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten();
        Ok(role)
    }
}

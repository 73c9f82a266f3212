//! Migration history: one row per DDL statement applied to a target.

use anyhow::Result;
use uuid::Uuid;

use super::{Database, MigrationRow};
use crate::agent::MigrationRecord;

impl Database {
    pub async fn insert_migration(&self, record: &MigrationRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO migration_history
                 (session_id, project_id, statement_type, object_type, schema_name, object_name, sql)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.session_id)
        .bind(record.project_id)
        .bind(&record.statement_type)
        .bind(&record.object_type)
        .bind(&record.schema)
        .bind(&record.name)
        .bind(&record.sql)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_migrations(&self, project_id: Uuid, limit: i64) -> Result<Vec<MigrationRow>> {
        let rows = sqlx::query_as::<_, MigrationRow>(
            "SELECT id, session_id, project_id, statement_type, object_type,
                    schema_name, object_name, sql, executed_at
             FROM migration_history WHERE project_id = $1
             ORDER BY executed_at DESC, id DESC LIMIT $2",
        )
        .bind(project_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

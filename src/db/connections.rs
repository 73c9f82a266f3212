//! Connection secrets and managed database records.
//!
//! External connection strings are stored as written by the settings UI:
//! plaintext for legacy rows, `ivHex:cipherHex` otherwise. Nothing here
//! decrypts; see [`crate::connection::secret`].

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::{ConnectionSecretRow, Database, ManagedDatabaseRow};
use crate::connection::{ConnectionSecrets, SecretStore};
use crate::error::AgentResult;

impl Database {
    pub async fn get_connection_secret(&self, id: Uuid) -> Result<Option<ConnectionSecretRow>> {
        let row = sqlx::query_as::<_, ConnectionSecretRow>(
            "SELECT id, project_id, connection_string, ca_certificate
             FROM database_connections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Register an external connection. `connection_string` is stored verbatim.
    pub async fn insert_connection(
        &self,
        project_id: Uuid,
        name: &str,
        connection_string: &str,
        ca_certificate: Option<&str>,
    ) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO database_connections (project_id, name, connection_string, ca_certificate)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(project_id)
        .bind(name)
        .bind(connection_string)
        .bind(ca_certificate)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_managed_database(&self, id: Uuid) -> Result<Option<ManagedDatabaseRow>> {
        let row = sqlx::query_as::<_, ManagedDatabaseRow>(
            "SELECT id, project_id, name, external_id
             FROM managed_databases WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl SecretStore for Database {
    async fn secrets_for(&self, connection_id: Uuid) -> AgentResult<Option<ConnectionSecrets>> {
        let row = self.get_connection_secret(connection_id).await?;
        Ok(row.map(|r| ConnectionSecrets {
            project_id: r.project_id,
            connection_string: r.connection_string,
            ca_certificate: r.ca_certificate.filter(|c| !c.trim().is_empty()),
        }))
    }
}

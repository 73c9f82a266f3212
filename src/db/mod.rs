//! # Database: Application Store
//!
//! Async storage for agent sessions, conversation history, the planning
//! journal, connection secrets and migration history, via `sqlx::PgPool`
//! connecting to the application's Supabase PostgreSQL.
//!
//! ## Schema
//!
//! - `agent_sessions`: task, status, abort flag, iteration counter
//! - `agent_messages`: append-only conversation (user/assistant/system)
//! - `agent_blackboard`: append-only planning journal
//! - `database_connections`: user-registered external connection strings (encrypted)
//! - `managed_databases`: provider-managed databases (external id only)
//! - `projects` / `project_members`: ownership and membership roles
//! - `migration_history`: DDL applied through the agent or the SQL API
//!
//! ## Module Structure
//!
//! - [`sessions`]: session lifecycle, abort flag, iteration bump
//! - [`messages`]: conversation history
//! - [`blackboard`]: planning journal
//! - [`connections`]: connection secrets and managed database records
//! - [`projects`]: membership role lookup
//! - [`migrations`]: migration history log
//!
//! The [`AgentStore`](crate::agent::AgentStore) and
//! [`SecretStore`](crate::connection::SecretStore) seams are implemented here.

mod blackboard;
mod connections;
mod messages;
mod migrations;
mod projects;
mod sessions;
mod store;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use uuid::Uuid;

// ── Agent types ─────────────────────────────────────────────────

#[derive(Serialize, sqlx::FromRow)]
pub struct AgentSessionRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub task_description: String,
    pub agent_type: String,
    pub status: String,
    pub abort_requested: bool,
    pub iteration_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct AgentMessageRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: String,
    pub content: String,
    pub metadata: Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct BlackboardEntryRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub entry_type: String,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// ── Connection types ────────────────────────────────────────────

#[derive(sqlx::FromRow)]
pub struct ConnectionSecretRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub connection_string: String,
    pub ca_certificate: Option<String>,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct ManagedDatabaseRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub external_id: String,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct MigrationRow {
    pub id: i64,
    pub session_id: Option<Uuid>,
    pub project_id: Uuid,
    pub statement_type: String,
    pub object_type: String,
    pub schema_name: Option<String>,
    pub object_name: Option<String>,
    pub sql: String,
    pub executed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Parse the URL manually to preserve the full username: sqlx's built-in
        // parser strips the ".project-ref" suffix that the Supabase pooler requires.
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username)
            // Transaction-mode poolers reject named prepared statements.
            .statement_cache_capacity(0);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Database { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Readiness check.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

//! Session, message and journal records, and the store seam the
//! orchestrator persists them through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::blackboard::EntryType;
use crate::error::AgentResult;
use crate::sql::SqlStatement;

pub const DEFAULT_AGENT_TYPE: &str = "database";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn parse(s: &str) -> SessionStatus {
        match s {
            "completed" => SessionStatus::Completed,
            "aborted" => SessionStatus::Aborted,
            _ => SessionStatus::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn parse(s: &str) -> MessageRole {
        match s {
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => MessageRole::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSession {
    pub id: Uuid,
    pub project_id: Uuid,
    pub task_description: String,
    pub agent_type: String,
    pub status: SessionStatus,
    pub abort_requested: bool,
    pub iteration_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentSession {
    /// Aborted sessions, and sessions with a pending abort request, never run again.
    pub fn is_aborted(&self) -> bool {
        self.abort_requested || self.status == SessionStatus::Aborted
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlackboardEntry {
    pub id: Uuid,
    pub session_id: Uuid,
    pub entry_type: EntryType,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One applied DDL statement, for the project's migration history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub session_id: Option<Uuid>,
    pub project_id: Uuid,
    pub statement_type: String,
    pub object_type: String,
    pub schema: Option<String>,
    pub name: Option<String>,
    pub sql: String,
}

impl MigrationRecord {
    pub fn from_statement(project_id: Uuid, session_id: Option<Uuid>, stmt: &SqlStatement) -> Self {
        MigrationRecord {
            session_id,
            project_id,
            statement_type: stmt.statement_type.as_str().to_string(),
            object_type: stmt.object_type.as_str().to_string(),
            schema: stmt.schema.clone(),
            name: stmt.name.clone(),
            sql: stmt.sql.clone(),
        }
    }
}

/// Durable session state.
///
/// Messages come back oldest-first (the replay window); journal entries
/// come back most-recent-first (display order).
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn create_session(&self, project_id: Uuid, task: &str, agent_type: &str) -> AgentResult<AgentSession>;

    async fn get_session(&self, session_id: Uuid) -> AgentResult<Option<AgentSession>>;

    async fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
        metadata: Value,
    ) -> AgentResult<()>;

    async fn recent_messages(&self, session_id: Uuid, limit: i64) -> AgentResult<Vec<AgentMessage>>;

    async fn append_blackboard(&self, session_id: Uuid, entry_type: EntryType, content: &str) -> AgentResult<()>;

    async fn recent_blackboard(&self, session_id: Uuid, limit: i64) -> AgentResult<Vec<BlackboardEntry>>;

    /// Bump the iteration counter and set the status in one write.
    async fn record_iteration(&self, session_id: Uuid, status: SessionStatus) -> AgentResult<AgentSession>;

    /// Flag the session aborted. `None` when the session does not exist.
    async fn request_abort(&self, session_id: Uuid) -> AgentResult<Option<AgentSession>>;

    async fn record_migration(&self, record: &MigrationRecord) -> AgentResult<()>;
}

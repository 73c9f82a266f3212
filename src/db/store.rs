//! `AgentStore` over the application database.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{AgentMessageRow, AgentSessionRow, BlackboardEntryRow, Database};
use crate::agent::{
    AgentMessage, AgentSession, AgentStore, BlackboardEntry, EntryType, MessageRole, MigrationRecord,
    SessionStatus,
};
use crate::error::AgentResult;

impl From<AgentSessionRow> for AgentSession {
    fn from(r: AgentSessionRow) -> Self {
        AgentSession {
            id: r.id,
            project_id: r.project_id,
            task_description: r.task_description,
            agent_type: r.agent_type,
            status: SessionStatus::parse(&r.status),
            abort_requested: r.abort_requested,
            iteration_count: r.iteration_count,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl From<AgentMessageRow> for AgentMessage {
    fn from(r: AgentMessageRow) -> Self {
        AgentMessage {
            id: r.id,
            session_id: r.session_id,
            role: MessageRole::parse(&r.role),
            content: r.content,
            metadata: r.metadata,
            created_at: r.created_at,
        }
    }
}

impl From<BlackboardEntryRow> for BlackboardEntry {
    fn from(r: BlackboardEntryRow) -> Self {
        BlackboardEntry {
            id: r.id,
            session_id: r.session_id,
            entry_type: EntryType::parse_or_progress(Some(&r.entry_type)),
            content: r.content,
            created_at: r.created_at,
        }
    }
}

#[async_trait]
impl AgentStore for Database {
    async fn create_session(&self, project_id: Uuid, task: &str, agent_type: &str) -> AgentResult<AgentSession> {
        Ok(self.create_agent_session(project_id, task, agent_type).await?.into())
    }

    async fn get_session(&self, session_id: Uuid) -> AgentResult<Option<AgentSession>> {
        Ok(self.get_agent_session(session_id).await?.map(Into::into))
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
        metadata: Value,
    ) -> AgentResult<()> {
        self.insert_agent_message(session_id, role.as_str(), content, &metadata)
            .await?;
        Ok(())
    }

    async fn recent_messages(&self, session_id: Uuid, limit: i64) -> AgentResult<Vec<AgentMessage>> {
        let rows = self.get_recent_agent_messages(session_id, limit).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn append_blackboard(&self, session_id: Uuid, entry_type: EntryType, content: &str) -> AgentResult<()> {
        self.insert_blackboard_entry(session_id, entry_type.as_str(), content)
            .await?;
        Ok(())
    }

    async fn recent_blackboard(&self, session_id: Uuid, limit: i64) -> AgentResult<Vec<BlackboardEntry>> {
        let rows = self.get_blackboard_entries(session_id, limit).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn record_iteration(&self, session_id: Uuid, status: SessionStatus) -> AgentResult<AgentSession> {
        Ok(self
            .record_session_iteration(session_id, status.as_str())
            .await?
            .into())
    }

    async fn request_abort(&self, session_id: Uuid) -> AgentResult<Option<AgentSession>> {
        Ok(self.request_session_abort(session_id).await?.map(Into::into))
    }

    async fn record_migration(&self, record: &MigrationRecord) -> AgentResult<()> {
        self.insert_migration(record).await?;
        Ok(())
    }
}

//! Executing the model's operations.
//!
//! The orchestrator owns tool gating (disabled, unknown and project-context
//! tools); a [`ToolRunner`] only ever sees parsed SQL actions. The live
//! runner connects to the target lazily, so an iteration whose operations
//! are all rejected never opens a connection.

use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use tracing::debug;

use crate::connection::{connect, ResolvedConnection};
use crate::error::{AgentError, AgentResult};
use crate::executor::pg::{run_action, ActionOutcome};
use crate::executor::SqlAction;

#[async_trait]
pub trait ToolRunner: Send {
    async fn run(&mut self, action: &SqlAction) -> AgentResult<ActionOutcome>;

    /// Release any open connection.
    async fn close(self: Box<Self>);
}

/// Creates one runner per request for a resolved target.
pub trait ToolRunnerFactory: Send + Sync {
    fn open(&self, resolved: &ResolvedConnection) -> Box<dyn ToolRunner>;
}

/// Runs actions over a single target connection, opened on first use.
pub struct SqlToolbox {
    resolved: ResolvedConnection,
    conn: Option<PgConnection>,
}

impl SqlToolbox {
    pub fn new(resolved: ResolvedConnection) -> Self {
        SqlToolbox { resolved, conn: None }
    }

    async fn connection(&mut self) -> AgentResult<&mut PgConnection> {
        if self.conn.is_none() {
            self.conn = Some(connect(&self.resolved).await?);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| AgentError::Internal(anyhow::anyhow!("target connection missing")))
    }
}

#[async_trait]
impl ToolRunner for SqlToolbox {
    async fn run(&mut self, action: &SqlAction) -> AgentResult<ActionOutcome> {
        let role = self.resolved.role;
        let conn = self.connection().await?;
        run_action(conn, role, action).await
    }

    async fn close(self: Box<Self>) {
        if let Some(conn) = self.conn {
            if let Err(e) = conn.close().await {
                debug!(error = %e, "target connection close failed");
            }
        }
    }
}

/// Factory for [`SqlToolbox`] runners.
pub struct PgToolRunners;

impl ToolRunnerFactory for PgToolRunners {
    fn open(&self, resolved: &ResolvedConnection) -> Box<dyn ToolRunner> {
        Box::new(SqlToolbox::new(resolved.clone()))
    }
}

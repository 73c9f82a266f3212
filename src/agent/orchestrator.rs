//! One agent iteration, end to end.
//!
//! ```text
//! validate → role → session (new | continuation, abort check)
//!   → resolve target → history (50) + journal (20) → prompt + schema
//!   → model → normalize → run operations → persist → status
//! ```
//!
//! Sessions move `active → completed | aborted`. A terminal session never
//! reaches the model or the target database again. Model failures are
//! returned as errors and leave the session as it was.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::blackboard::{render_journal, REPLAY_WINDOW};
use super::llm::{ChatMessage, CompletionRequest, ModelFamily, ModelRouter};
use super::manifest::ToolManifest;
use super::normalize::{normalize, AgentResponse, AgentStatus, BlackboardNote, Operation};
use super::prompt::{build_system_prompt, PromptInput, PromptSections};
use super::schema::ResponseSchema;
use super::session::{
    AgentMessage, AgentSession, AgentStore, BlackboardEntry, MessageRole, MigrationRecord, SessionStatus,
    DEFAULT_AGENT_TYPE,
};
use super::toolbox::{ToolRunner, ToolRunnerFactory};
use crate::access::Role;
use crate::connection::{parse_uuid, ConnectionResolver, ConnectionTarget, ResolvedConnection};
use crate::error::{AgentError, AgentResult};
use crate::executor::SqlAction;
use crate::prom_metrics::Metrics;

pub const HISTORY_WINDOW: i64 = 50;
pub const DEFAULT_MAX_ITERATIONS: i64 = 20;
pub const MAX_ITERATIONS_CAP: i64 = 100;
pub const PROJECT_CONTEXT_TOOL: &str = "get_project_context";

/// Stored assistant messages are cut to this many characters so one large
/// export does not crowd the history window out of the model's context.
const HISTORY_MESSAGE_LIMIT: usize = 20_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IterationRequest {
    pub project_id: Option<String>,
    pub database_id: Option<String>,
    pub connection_id: Option<String>,
    pub task_description: Option<String>,
    pub access_token: Option<String>,
    pub max_iterations: Option<i64>,
    pub prompt_sections: Option<PromptSections>,
    pub custom_tool_descriptions: Option<HashMap<String, String>>,
    pub disabled_tools: Option<Vec<String>>,
    pub project_context: Option<Value>,
    pub session_id: Option<String>,
    /// Caller's own iteration counter; informational only.
    pub iteration: Option<i64>,
    pub expose_project: bool,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationResult {
    pub session_id: Uuid,
    pub reasoning: String,
    pub operations: Vec<Operation>,
    #[serde(rename = "blackboard_entry")]
    pub blackboard_entry: BlackboardNote,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    pub iteration: i64,
    pub max_iterations: i64,
    pub should_continue: bool,
    pub session_status: SessionStatus,
}

pub fn clamp_max_iterations(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_MAX_ITERATIONS)
        .clamp(1, MAX_ITERATIONS_CAP)
}

/// Whether the caller should request another iteration.
pub fn should_continue(session: SessionStatus, status: AgentStatus, iteration: i64, max_iterations: i64) -> bool {
    !session.is_terminal()
        && matches!(status, AgentStatus::InProgress | AgentStatus::ParseError)
        && iteration < max_iterations
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn tool_error(e: &AgentError) -> Value {
    json!({"success": false, "error": e.to_string(), "kind": e.kind()})
}

fn truncate_chars(s: String, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s;
    }
    let mut out: String = s.chars().take(limit).collect();
    out.push_str("\n…[truncated]");
    out
}

const CONTINUE_PROMPT: &str = "Continue with the task. The results of your previous operations are in your last message.";

/// The session's messages as model turns, always ending on a user turn.
///
/// A follow-up instruction that is not stored yet goes last.
fn conversation(history: &[AgentMessage], task: &str, follow_up: Option<&str>) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = history
        .iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: m.content.clone(),
        })
        .collect();
    if let Some(text) = follow_up {
        messages.push(ChatMessage::user(text));
        return messages;
    }
    match messages.last().map(|m| m.role) {
        None => messages.push(ChatMessage::user(task)),
        Some(MessageRole::Assistant) => messages.push(ChatMessage::user(CONTINUE_PROMPT)),
        Some(_) => {}
    }
    messages
}

pub struct Orchestrator {
    store: Arc<dyn AgentStore>,
    resolver: Arc<ConnectionResolver>,
    models: Arc<dyn ModelRouter>,
    tools: Arc<dyn ToolRunnerFactory>,
    metrics: Option<Arc<Metrics>>,
    default_model: String,
    max_output_tokens: u32,
}

struct OperationContext<'a> {
    manifest: &'a ToolManifest,
    project_context: Option<&'a Value>,
    resolved: &'a ResolvedConnection,
    session_id: Uuid,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn AgentStore>,
        resolver: Arc<ConnectionResolver>,
        models: Arc<dyn ModelRouter>,
        tools: Arc<dyn ToolRunnerFactory>,
        default_model: String,
        max_output_tokens: u32,
    ) -> Self {
        Orchestrator {
            store,
            resolver,
            models,
            tools,
            metrics: None,
            default_model,
            max_output_tokens,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<dyn AgentStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<ConnectionResolver> {
        &self.resolver
    }

    /// Run one iteration.
    pub async fn iterate(&self, req: IterationRequest) -> AgentResult<IterationResult> {
        let project_id = parse_uuid(
            non_blank(&req.project_id).ok_or_else(|| AgentError::validation("projectId is required"))?,
            "projectId",
        )?;
        let target = ConnectionTarget::from_ids(req.database_id.as_deref(), req.connection_id.as_deref())?;
        let session_id = non_blank(&req.session_id)
            .map(|raw| parse_uuid(raw, "sessionId"))
            .transpose()?;
        let task = non_blank(&req.task_description);
        if session_id.is_none() && task.is_none() {
            return Err(AgentError::validation("taskDescription is required to start a session"));
        }
        let max_iterations = clamp_max_iterations(req.max_iterations);

        let role = self.resolver.role(project_id, req.access_token.as_deref()).await?;

        // Nothing is written until the target and the model both check out.
        let existing = match session_id {
            Some(id) => {
                let session = self.load_session(id, project_id).await?;
                if session.is_aborted() {
                    info!(session_id = %id, "iteration requested on aborted session");
                    return Ok(terminal_result(&session, AgentStatus::Aborted, max_iterations));
                }
                if session.status == SessionStatus::Completed {
                    return Ok(terminal_result(&session, AgentStatus::Completed, max_iterations));
                }
                Some(session)
            }
            None => None,
        };

        let resolved = self.resolver.resolve_target(target, project_id, role).await?;

        let mut manifest = ToolManifest::canonical(req.expose_project);
        if let Some(overrides) = &req.custom_tool_descriptions {
            manifest = manifest.with_descriptions(overrides);
        }
        for name in req.disabled_tools.iter().flatten() {
            manifest.disable(name);
        }

        let model = non_blank(&req.model).unwrap_or(&self.default_model).to_string();
        let backend = self.models.route(&model)?;
        let family = backend.family();
        let schema = ResponseSchema::for_family(family, &manifest);

        let (session, follow_up) = match existing {
            Some(session) => {
                let follow_up = task.filter(|t| *t != session.task_description.trim());
                (session, follow_up)
            }
            None => {
                let task = task.unwrap_or_default();
                let session = self.store.create_session(project_id, task, DEFAULT_AGENT_TYPE).await?;
                self.store
                    .append_message(session.id, MessageRole::User, task, json!({}))
                    .await?;
                info!(session_id = %session.id, project_id = %project_id, "agent session created");
                (session, None)
            }
        };

        let history = self.store.recent_messages(session.id, HISTORY_WINDOW).await?;
        let journal = self.store.recent_blackboard(session.id, REPLAY_WINDOW as i64).await?;

        let sections = req.prompt_sections.clone().unwrap_or_default();
        let system_prompt = build_system_prompt(&PromptInput {
            sections: &sections,
            manifest: &manifest,
            project_context: req.project_context.as_ref(),
            expose_project: req.expose_project,
            journal: &render_journal(&journal),
        });
        let messages = conversation(&history, &session.task_description, follow_up);

        let iteration_no = i64::from(session.iteration_count) + 1;
        info!(
            session_id = %session.id,
            iteration = iteration_no,
            model = %model,
            history = messages.len(),
            journal = journal.len(),
            "agent iteration"
        );

        let started = Instant::now();
        let raw = backend
            .complete(&CompletionRequest {
                model: &model,
                system_prompt: &system_prompt,
                messages: &messages,
                schema: &schema,
                max_tokens: self.max_output_tokens,
            })
            .await?;
        if let Some(m) = &self.metrics {
            let label = match family {
                ModelFamily::Anthropic => "anthropic",
                ModelFamily::OpenAi => "openai",
            };
            m.observe_model(label, started.elapsed().as_secs_f64());
        }
        // Stored only once the model has answered, so a retry after an
        // upstream failure does not repeat it.
        if let Some(text) = follow_up {
            self.store
                .append_message(session.id, MessageRole::User, text, json!({}))
                .await?;
        }

        let mut response = normalize(&raw);
        if response.status != AgentStatus::ParseError {
            let ctx = OperationContext {
                manifest: &manifest,
                project_context: req.project_context.as_ref(),
                resolved: &resolved,
                session_id: session.id,
            };
            self.run_operations(&ctx, &mut response.operations).await?;
        }

        let session = self.persist(&session, &response, &model).await?;
        if let Some(m) = &self.metrics {
            m.count_iteration(response.status.as_str());
        }

        let iteration = i64::from(session.iteration_count);
        info!(
            session_id = %session.id,
            iteration,
            status = response.status.as_str(),
            operations = response.operations.len(),
            "agent iteration finished"
        );
        Ok(IterationResult {
            session_id: session.id,
            error: (response.status == AgentStatus::ParseError)
                .then(|| "Model response could not be parsed".to_string()),
            should_continue: should_continue(session.status, response.status, iteration, max_iterations),
            reasoning: response.reasoning,
            operations: response.operations,
            blackboard_entry: response.blackboard_entry,
            status: response.status,
            raw_output: response.raw_output,
            iteration,
            max_iterations,
            session_status: session.status,
        })
    }

    async fn load_session(&self, session_id: Uuid, project_id: Uuid) -> AgentResult<AgentSession> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("Session {} not found", session_id)))?;
        if session.project_id != project_id {
            return Err(AgentError::access_denied(format!(
                "Session {} does not belong to project {}",
                session_id, project_id
            )));
        }
        Ok(session)
    }

    /// Run operations in order, attaching each result. The first failure
    /// skips the rest, since later operations usually build on earlier ones.
    async fn run_operations(&self, ctx: &OperationContext<'_>, operations: &mut [Operation]) -> AgentResult<()> {
        let mut runner: Option<Box<dyn ToolRunner>> = None;
        let mut failed = false;
        for op in operations.iter_mut() {
            if failed {
                op.result = Some(json!({
                    "success": false,
                    "skipped": true,
                    "error": "Skipped after an earlier operation failed"
                }));
                continue;
            }
            let result = self.run_operation(ctx, op, &mut runner).await?;
            failed = result.get("success") == Some(&Value::Bool(false));
            op.result = Some(result);
        }
        if let Some(runner) = runner {
            runner.close().await;
        }
        Ok(())
    }

    async fn run_operation(
        &self,
        ctx: &OperationContext<'_>,
        op: &Operation,
        runner: &mut Option<Box<dyn ToolRunner>>,
    ) -> AgentResult<Value> {
        if !ctx.manifest.is_enabled(&op.op_type) {
            warn!(tool = %op.op_type, "model requested an unavailable tool");
            return Ok(tool_error(&AgentError::validation(format!(
                "Tool '{}' is not available",
                op.op_type
            ))));
        }
        if op.op_type == PROJECT_CONTEXT_TOOL {
            return Ok(json!({"success": true, "data": ctx.project_context.cloned().unwrap_or(Value::Null)}));
        }
        let action = match SqlAction::parse(&op.op_type, &op.params) {
            Ok(action) => action,
            Err(e) => return Ok(tool_error(&e)),
        };
        let runner = runner.get_or_insert_with(|| self.tools.open(ctx.resolved));
        match runner.run(&action).await {
            Ok(outcome) => {
                for stmt in &outcome.applied_ddl {
                    let record = MigrationRecord::from_statement(ctx.resolved.project_id, Some(ctx.session_id), stmt);
                    self.store.record_migration(&record).await?;
                }
                if let (Some(m), Some(batch)) = (&self.metrics, &outcome.batch) {
                    m.count_batch(batch);
                }
                let success = outcome.data.get("success").and_then(Value::as_bool).unwrap_or(true);
                Ok(json!({"success": success, "data": outcome.data}))
            }
            Err(e) => {
                warn!(tool = %op.op_type, error = %e, "operation failed");
                Ok(tool_error(&e))
            }
        }
    }

    /// Assistant message, journal entry and session status for one iteration.
    async fn persist(&self, session: &AgentSession, response: &AgentResponse, model: &str) -> AgentResult<AgentSession> {
        let content = serde_json::to_string(&json!({
            "reasoning": response.reasoning,
            "operations": response.operations,
            "status": response.status,
        }))
        .map_err(anyhow::Error::from)?;
        let metadata = json!({
            "model": model,
            "status": response.status,
            "operationCount": response.operations.len(),
            "rawOutput": response.raw_output,
        });
        self.store
            .append_message(
                session.id,
                MessageRole::Assistant,
                &truncate_chars(content, HISTORY_MESSAGE_LIMIT),
                metadata,
            )
            .await?;
        self.store
            .append_blackboard(
                session.id,
                response.blackboard_entry.entry_type,
                &response.blackboard_entry.content,
            )
            .await?;
        let status = if response.status == AgentStatus::Completed {
            SessionStatus::Completed
        } else {
            SessionStatus::Active
        };
        self.store.record_iteration(session.id, status).await
    }

    /// Flag a session aborted. Later iterations return `aborted` without
    /// calling the model.
    pub async fn abort(&self, session_id: Uuid) -> AgentResult<AgentSession> {
        let session = self
            .store
            .request_abort(session_id)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("Session {} not found", session_id)))?;
        info!(session_id = %session_id, "agent session aborted");
        Ok(session)
    }

    /// Load a session and check the caller's role on its project.
    pub async fn authorize_session(&self, session_id: Uuid, access_token: Option<&str>) -> AgentResult<(AgentSession, Role)> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("Session {} not found", session_id)))?;
        let role = self.resolver.role(session.project_id, access_token).await?;
        Ok((session, role))
    }

    pub async fn messages(&self, session_id: Uuid, limit: i64) -> AgentResult<Vec<AgentMessage>> {
        self.store.recent_messages(session_id, limit).await
    }

    pub async fn blackboard(&self, session_id: Uuid, limit: i64) -> AgentResult<Vec<BlackboardEntry>> {
        self.store.recent_blackboard(session_id, limit).await
    }
}

fn terminal_result(session: &AgentSession, status: AgentStatus, max_iterations: i64) -> IterationResult {
    let (reasoning, error) = match status {
        AgentStatus::Aborted => (
            "The session was aborted; no further operations will run.".to_string(),
            Some("Session was aborted".to_string()),
        ),
        _ => ("The session has already completed.".to_string(), None),
    };
    IterationResult {
        session_id: session.id,
        reasoning,
        operations: Vec::new(),
        blackboard_entry: BlackboardNote {
            entry_type: super::blackboard::EntryType::Progress,
            content: format!("Session is {}.", session.status.as_str()),
        },
        status,
        error,
        raw_output: None,
        iteration: i64::from(session.iteration_count),
        max_iterations,
        should_continue: false,
        session_status: if status == AgentStatus::Aborted {
            SessionStatus::Aborted
        } else {
            session.status
        },
    }
}

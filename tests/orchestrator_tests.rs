//! Agent loop tests over in-memory fakes.
//!
//! No database or model key is needed: the store, the role lookup, the model
//! and the tool runner are all substituted (see `common`). The target
//! connection is still resolved for real from a plaintext secret, which
//! exercises the resolver without opening a socket.

mod common;

use common::{reply, Fixture, RecordingTools, ScriptedModel};
use pgpilot::agent::{AgentStatus, EntryType, IterationRequest, MessageRole, SessionStatus};
use pgpilot::error::AgentError;
use serde_json::{json, Value};

fn request(body: Value) -> IterationRequest {
    serde_json::from_value(body).unwrap()
}

#[tokio::test]
async fn new_session_runs_one_iteration() {
    let model = ScriptedModel::replying(vec![&reply(
        "in_progress",
        json!([{"type": "get_schema", "params": {}}]),
    )]);
    let fx = Fixture::new(model);

    let result = fx
        .orchestrator
        .iterate(request(fx.start_body("List the tables", "viewer-token")))
        .await
        .unwrap();

    assert_eq!(result.status, AgentStatus::InProgress);
    assert_eq!(result.iteration, 1);
    assert!(result.should_continue);
    assert_eq!(result.session_status, SessionStatus::Active);
    assert_eq!(result.operations.len(), 1);
    assert_eq!(result.operations[0].result.as_ref().unwrap()["success"], true);
    assert_eq!(fx.tools.actions(), vec!["get_schema"]);

    let messages = fx.store.messages_for(result.session_id);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].content, "List the tables");
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert!(messages[1].content.contains("get_schema"));

    let journal = fx.store.journal_for(result.session_id);
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].entry_type, EntryType::Progress);
}

#[tokio::test]
async fn continuation_replays_history_and_journal() {
    let model = ScriptedModel::replying(vec![
        &reply("in_progress", json!([{"type": "get_schema", "params": {}}])),
        &reply("completed", json!([])),
    ]);
    let fx = Fixture::new(model);
    let first = fx
        .orchestrator
        .iterate(request(fx.start_body("Describe users", "editor-token")))
        .await
        .unwrap();

    let second = fx
        .orchestrator
        .iterate(request(fx.continue_body(first.session_id, "editor-token")))
        .await
        .unwrap();

    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.iteration, 2);
    assert_eq!(second.status, AgentStatus::Completed);
    assert_eq!(second.session_status, SessionStatus::Completed);
    assert!(!second.should_continue);

    let prompts = fx.model.prompts.lock().unwrap().clone();
    assert!(!prompts[0].contains("Planning Journal"));
    assert!(prompts[1].contains("Planning Journal"));
    assert!(prompts[1].contains("status in_progress"));

    let transcripts = fx.model.transcripts.lock().unwrap().clone();
    assert_eq!(transcripts[1][0], "Describe users");
    assert_eq!(transcripts[1].len(), 3, "task, assistant reply, continue prompt");
}

#[tokio::test]
async fn aborted_session_never_reaches_model_or_sql() {
    let model = ScriptedModel::replying(vec![&reply("in_progress", json!([]))]);
    let fx = Fixture::new(model);
    let first = fx
        .orchestrator
        .iterate(request(fx.start_body("Add an index", "owner-token")))
        .await
        .unwrap();
    assert_eq!(fx.model.calls(), 1);

    fx.orchestrator.abort(first.session_id).await.unwrap();

    let after = fx
        .orchestrator
        .iterate(request(fx.continue_body(first.session_id, "owner-token")))
        .await
        .unwrap();
    assert_eq!(after.status, AgentStatus::Aborted);
    assert_eq!(after.session_status, SessionStatus::Aborted);
    assert!(!after.should_continue);
    assert!(after.operations.is_empty());
    assert_eq!(fx.model.calls(), 1, "model must not be called after abort");
    assert_eq!(fx.tools.opened(), 0, "no target connection after abort");
}

#[tokio::test]
async fn completed_session_short_circuits() {
    let model = ScriptedModel::replying(vec![&reply("completed", json!([]))]);
    let fx = Fixture::new(model);
    let first = fx
        .orchestrator
        .iterate(request(fx.start_body("Nothing to do", "editor-token")))
        .await
        .unwrap();
    let again = fx
        .orchestrator
        .iterate(request(fx.continue_body(first.session_id, "editor-token")))
        .await
        .unwrap();
    assert_eq!(again.status, AgentStatus::Completed);
    assert_eq!(again.iteration, 1);
    assert_eq!(fx.model.calls(), 1);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let fx = Fixture::new(ScriptedModel::default());
    let err = fx
        .orchestrator
        .iterate(request(fx.continue_body(uuid::Uuid::new_v4(), "editor-token")))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::NotFound(_)));
}

#[tokio::test]
async fn validation_and_access_errors() {
    let fx = Fixture::new(ScriptedModel::default());

    let mut body = fx.start_body("x", "editor-token");
    body["taskDescription"] = json!("   ");
    let err = fx.orchestrator.iterate(request(body)).await.unwrap_err();
    assert!(matches!(err, AgentError::Validation(_)));

    let mut body = fx.start_body("x", "editor-token");
    body["databaseId"] = json!(uuid::Uuid::new_v4().to_string());
    let err = fx.orchestrator.iterate(request(body)).await.unwrap_err();
    assert!(matches!(err, AgentError::Validation(_)), "both target ids given");

    let err = fx
        .orchestrator
        .iterate(request(fx.start_body("x", "stranger-token")))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::AccessDenied(_)));

    let mut body = fx.start_body("x", "");
    body.as_object_mut().unwrap().remove("accessToken");
    let err = fx.orchestrator.iterate(request(body)).await.unwrap_err();
    assert!(matches!(err, AgentError::AccessDenied(_)));
    assert_eq!(fx.model.calls(), 0);
}

#[tokio::test]
async fn model_failure_leaves_session_active() {
    let model = ScriptedModel::replying(vec![&reply("in_progress", json!([]))]);
    let fx = Fixture::new(model);
    let first = fx
        .orchestrator
        .iterate(request(fx.start_body("Tune queries", "editor-token")))
        .await
        .unwrap();
    fx.model
        .push_error(AgentError::UpstreamUnavailable("Model stream ended before completion".into()));

    let err = fx
        .orchestrator
        .iterate(request(fx.continue_body(first.session_id, "editor-token")))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::UpstreamUnavailable(_)));
    let session = fx.store.session(first.session_id).unwrap();
    assert_eq!(session.status, SessionStatus::Active);
    assert!(!session.abort_requested);
    assert_eq!(session.iteration_count, 1);
}

#[tokio::test]
async fn unsupported_model_is_a_validation_error() {
    let fx = Fixture::new(ScriptedModel::default());
    let mut body = fx.start_body("x", "editor-token");
    body["model"] = json!("llama-3-70b");
    let err = fx.orchestrator.iterate(request(body)).await.unwrap_err();
    assert!(matches!(err, AgentError::Validation(_)));
    assert_eq!(fx.store.session_count(), 0, "no session for a request that cannot run");
}

#[tokio::test]
async fn unresolvable_target_creates_no_session() {
    let fx = Fixture::new(ScriptedModel::default());
    let mut body = fx.start_body("x", "editor-token");
    body["connectionId"] = json!(uuid::Uuid::new_v4().to_string());
    assert!(fx.orchestrator.iterate(request(body)).await.is_err());
    assert_eq!(fx.store.session_count(), 0);
    assert_eq!(fx.model.calls(), 0);
}

#[tokio::test]
async fn unsupported_model_on_continuation_writes_nothing() {
    let model = ScriptedModel::replying(vec![&reply("in_progress", json!([]))]);
    let fx = Fixture::new(model);
    let first = fx
        .orchestrator
        .iterate(request(fx.start_body("Tune queries", "editor-token")))
        .await
        .unwrap();

    let mut body = fx.continue_body(first.session_id, "editor-token");
    body["taskDescription"] = json!("Also add an index");
    body["model"] = json!("llama-3-70b");
    let err = fx.orchestrator.iterate(request(body)).await.unwrap_err();
    assert!(matches!(err, AgentError::Validation(_)));
    assert_eq!(fx.store.messages_for(first.session_id).len(), 2);
}

#[tokio::test]
async fn follow_up_is_not_duplicated_by_a_retry() {
    let model = ScriptedModel::replying(vec![&reply("in_progress", json!([]))]);
    let fx = Fixture::new(model);
    let first = fx
        .orchestrator
        .iterate(request(fx.start_body("Tune queries", "editor-token")))
        .await
        .unwrap();
    fx.model
        .push_error(AgentError::UpstreamUnavailable("Model stream ended before completion".into()));
    let mut body = fx.continue_body(first.session_id, "editor-token");
    body["taskDescription"] = json!("Also add an index on email");

    let err = fx.orchestrator.iterate(request(body.clone())).await.unwrap_err();
    assert!(matches!(err, AgentError::UpstreamUnavailable(_)));
    assert_eq!(fx.store.messages_for(first.session_id).len(), 2, "nothing stored for the failed call");

    fx.model.replies_with(&reply("in_progress", json!([])));
    fx.orchestrator.iterate(request(body)).await.unwrap();

    let messages = fx.store.messages_for(first.session_id);
    let follow_ups = messages
        .iter()
        .filter(|m| m.content == "Also add an index on email")
        .count();
    assert_eq!(follow_ups, 1);
    assert_eq!(messages.len(), 4, "task, reply, follow-up, reply");
    assert_eq!(messages[2].role, MessageRole::User);

    let transcripts = fx.model.transcripts.lock().unwrap().clone();
    assert_eq!(transcripts[1].last().unwrap(), "Also add an index on email");
    assert_eq!(transcripts[2].last().unwrap(), "Also add an index on email");
}

#[tokio::test]
async fn abort_during_model_call_wins_over_the_reply() {
    let model = ScriptedModel::replying(vec![&reply("in_progress", json!([]))]);
    let fx = Fixture::new(model);
    *fx.model.abort_while_thinking.lock().unwrap() = Some(fx.store.clone());

    let result = fx
        .orchestrator
        .iterate(request(fx.start_body("Vacuum everything", "owner-token")))
        .await
        .unwrap();

    assert_eq!(result.session_status, SessionStatus::Aborted);
    assert!(!result.should_continue);
    let session = fx.store.session(result.session_id).unwrap();
    assert_eq!(session.status, SessionStatus::Aborted);
    assert!(session.abort_requested);
    assert_eq!(session.iteration_count, 1);
}

#[tokio::test]
async fn unparseable_reply_degrades_to_parse_error() {
    let model = ScriptedModel::replying(vec!["I think we should look at the users table first."]);
    let fx = Fixture::new(model);
    let result = fx
        .orchestrator
        .iterate(request(fx.start_body("Inspect users", "editor-token")))
        .await
        .unwrap();
    assert_eq!(result.status, AgentStatus::ParseError);
    assert!(result.operations.is_empty());
    assert!(result.raw_output.as_deref().unwrap().contains("users table"));
    assert!(result.error.is_some());
    assert!(result.should_continue);
    assert_eq!(fx.tools.opened(), 0);
    let journal = fx.store.journal_for(result.session_id);
    assert_eq!(journal[0].entry_type, EntryType::Progress);
    assert!(journal[0].content.contains("not valid JSON"));
}

#[tokio::test]
async fn fenced_reply_is_recovered() {
    let fenced = format!(
        "Here is my plan:\n```json\n{}\n```",
        reply("in_progress", json!([{"tool": "get_table_columns", "arguments": "{\"table\": \"users\"}"}]))
    );
    let fx = Fixture::new(ScriptedModel::replying(vec![&fenced]));
    let result = fx
        .orchestrator
        .iterate(request(fx.start_body("Inspect users", "viewer-token")))
        .await
        .unwrap();
    assert_eq!(result.status, AgentStatus::InProgress);
    assert_eq!(fx.tools.actions(), vec!["get_table_columns"]);
}

#[tokio::test]
async fn editors_cannot_run_destructive_sql() {
    let model = ScriptedModel::replying(vec![&reply(
        "in_progress",
        json!([
            {"type": "execute_sql", "params": {"sql": "DROP TABLE users"}},
            {"type": "get_schema", "params": {}}
        ]),
    )]);
    let fx = Fixture::new(model);
    let result = fx
        .orchestrator
        .iterate(request(fx.start_body("Clean up", "editor-token")))
        .await
        .unwrap();

    let first = result.operations[0].result.as_ref().unwrap();
    assert_eq!(first["success"], false);
    assert_eq!(first["kind"], "access_denied");
    let second = result.operations[1].result.as_ref().unwrap();
    assert_eq!(second["skipped"], true);
    assert_eq!(fx.tools.actions(), vec!["execute_sql"]);
    assert!(fx.store.migrations().is_empty());
}

#[tokio::test]
async fn applied_ddl_is_logged_with_the_session() {
    let model = ScriptedModel::replying(vec![&reply(
        "in_progress",
        json!([{"type": "execute_sql", "params": {"sql": "ALTER TABLE users ADD COLUMN age int; SELECT 1"}}]),
    )]);
    let fx = Fixture::new(model);
    let result = fx
        .orchestrator
        .iterate(request(fx.start_body("Add age", "editor-token")))
        .await
        .unwrap();
    let migrations = fx.store.migrations();
    assert_eq!(migrations.len(), 1);
    assert_eq!(migrations[0].statement_type, "ALTER");
    assert_eq!(migrations[0].object_type, "TABLE");
    assert_eq!(migrations[0].name.as_deref(), Some("users"));
    assert_eq!(migrations[0].session_id, Some(result.session_id));
    assert_eq!(migrations[0].project_id, fx.project_id);
}

#[tokio::test]
async fn disabled_and_unknown_tools_are_rejected_without_a_connection() {
    let model = ScriptedModel::replying(vec![&reply(
        "in_progress",
        json!([{"type": "export_table", "params": {"table": "users"}}]),
    )]);
    let fx = Fixture::new(model);
    let mut body = fx.start_body("Export users", "editor-token");
    body["disabledTools"] = json!(["export_table"]);
    let result = fx.orchestrator.iterate(request(body)).await.unwrap();
    let res = result.operations[0].result.as_ref().unwrap();
    assert_eq!(res["success"], false);
    assert!(res["error"].as_str().unwrap().contains("not available"));
    assert_eq!(fx.tools.opened(), 0);
    assert!(!fx.model.prompts.lock().unwrap()[0].contains("**export_table**"));
}

#[tokio::test]
async fn project_context_tool_needs_exposure() {
    let ops = json!([{"type": "get_project_context", "params": {}}]);
    let fx = Fixture::new(ScriptedModel::replying(vec![
        &reply("in_progress", ops.clone()),
        &reply("in_progress", ops),
    ]));

    let mut hidden = fx.start_body("Use context", "viewer-token");
    hidden["projectContext"] = json!({"name": "Inventory"});
    let r = fx.orchestrator.iterate(request(hidden.clone())).await.unwrap();
    assert_eq!(r.operations[0].result.as_ref().unwrap()["success"], false);

    let mut exposed = hidden;
    exposed["exposeProject"] = json!(true);
    let r = fx.orchestrator.iterate(request(exposed)).await.unwrap();
    let res = r.operations[0].result.as_ref().unwrap();
    assert_eq!(res["success"], true);
    assert_eq!(res["data"]["name"], "Inventory");
    assert_eq!(fx.tools.opened(), 0);
}

#[tokio::test]
async fn failed_statement_skips_remaining_operations() {
    let tools = RecordingTools {
        fail_on: Some("missing_table".into()),
        ..Default::default()
    };
    let model = ScriptedModel::replying(vec![&reply(
        "in_progress",
        json!([
            {"type": "execute_sql", "params": {"sql": "UPDATE missing_table SET a = 1 WHERE id = 2"}},
            {"type": "execute_sql", "params": {"sql": "CREATE INDEX idx ON t (a)"}}
        ]),
    )]);
    let fx = Fixture::with_tools(model, tools);
    let result = fx
        .orchestrator
        .iterate(request(fx.start_body("Fix data", "editor-token")))
        .await
        .unwrap();
    assert_eq!(result.operations[0].result.as_ref().unwrap()["success"], false);
    assert_eq!(result.operations[1].result.as_ref().unwrap()["skipped"], true);
    assert_eq!(fx.tools.actions().len(), 1);
    assert!(fx.store.migrations().is_empty());
}

#[tokio::test]
async fn max_iterations_caps_continuation() {
    let model = ScriptedModel::replying(vec![&reply("in_progress", json!([]))]);
    let fx = Fixture::new(model);
    let mut body = fx.start_body("Loop", "editor-token");
    body["maxIterations"] = json!(1);
    let result = fx.orchestrator.iterate(request(body)).await.unwrap();
    assert_eq!(result.max_iterations, 1);
    assert!(!result.should_continue);
}

#[tokio::test]
async fn custom_descriptions_and_sections_reach_the_prompt() {
    let fx = Fixture::new(ScriptedModel::replying(vec![&reply("completed", json!([]))]));
    let mut body = fx.start_body("Report", "viewer-token");
    body["customToolDescriptions"] = json!({"get_schema": "Dump every table in the warehouse."});
    body["promptSections"] = json!({"additional": "Reply tersely."});
    fx.orchestrator.iterate(request(body)).await.unwrap();
    let prompt = fx.model.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("Dump every table in the warehouse."));
    assert!(prompt.contains("Reply tersely."));
}

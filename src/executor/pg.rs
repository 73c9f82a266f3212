//! `PgConnection` as a statement runner, and action dispatch over a live
//! target connection.

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Either, Executor, PgConnection, Row};
use tracing::info;

use super::actions::{rows_to_csv, ExportFormat, InspectionQuery, SqlAction};
use super::{execute_sql, execute_sql_batch, BatchResult, StatementOutcome, StatementRunner};
use crate::access::Role;
use crate::error::{AgentError, AgentResult};
use crate::sql::values::{cell_to_json, row_to_json};
use crate::sql::SqlStatement;

/// Database error text, without sqlx's wrapper prefix.
pub fn describe(e: &sqlx::Error) -> String {
    match e.as_database_error() {
        Some(db) => match db.code() {
            Some(code) => format!("{} (SQLSTATE {})", db.message(), code),
            None => db.message().to_string(),
        },
        None => e.to_string(),
    }
}

// Simple-query protocol: multi-statement strings and utility commands
// (BEGIN, VACUUM, CREATE INDEX CONCURRENTLY) all run unchanged.
#[async_trait]
impl StatementRunner for PgConnection {
    async fn run(&mut self, sql: &str) -> Result<StatementOutcome, String> {
        let mut outcome = StatementOutcome::default();
        let mut stream = sqlx::raw_sql(sql).fetch_many(&mut *self);
        while let Some(step) = stream.try_next().await.map_err(|e| describe(&e))? {
            match step {
                Either::Left(done) => outcome.row_count += done.rows_affected(),
                Either::Right(row) => outcome.rows.push(Value::Object(row_to_json(&row))),
            }
        }
        outcome.row_count = outcome.row_count.max(outcome.rows.len() as u64);
        Ok(outcome)
    }
}

/// Result of one dispatched action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub data: Value,
    /// DDL that was applied to the target and should be logged.
    #[serde(skip)]
    pub applied_ddl: Vec<SqlStatement>,
    /// Set for execute actions.
    #[serde(skip)]
    pub batch: Option<BatchResult>,
}

impl ActionOutcome {
    fn executed(result: BatchResult) -> AgentResult<Self> {
        Ok(ActionOutcome {
            data: serde_json::to_value(&result).map_err(anyhow::Error::from)?,
            applied_ddl: result.applied_ddl().cloned().collect(),
            batch: Some(result),
        })
    }

    fn read(data: Value) -> Self {
        ActionOutcome {
            data,
            applied_ddl: Vec::new(),
            batch: None,
        }
    }
}

/// Catalog queries with binds go through the extended protocol and only
/// return types `cell_to_json` decodes. Row reads of user tables carry no
/// binds and use the simple protocol, so every column (NUMERIC, INET,
/// INTERVAL, arrays, enums) arrives as Postgres' own text rendering.
async fn fetch_rows(conn: &mut PgConnection, query: &InspectionQuery) -> AgentResult<Vec<PgRow>> {
    let fetched = if query.binds.is_empty() {
        conn.fetch_all(sqlx::raw_sql(&query.sql)).await
    } else {
        let mut q = sqlx::query(&query.sql);
        for bind in &query.binds {
            q = q.bind(bind.as_str());
        }
        conn.fetch_all(q).await
    };
    fetched.map_err(|e| match e {
        sqlx::Error::Database(_) => AgentError::validation(describe(&e)),
        other => AgentError::UpstreamUnavailable(format!("Target database error: {}", other)),
    })
}

/// Run a catalog query; `single` queries yield one object or `NotFound`.
pub async fn run_inspection(conn: &mut PgConnection, query: &InspectionQuery, what: &str) -> AgentResult<Value> {
    let rows = fetch_rows(conn, query).await?;
    let mut objects = rows.iter().map(|r| Value::Object(row_to_json(r)));
    if query.single {
        objects
            .next()
            .ok_or_else(|| AgentError::NotFound(format!("{} not found", what)))
    } else {
        Ok(Value::Array(objects.collect()))
    }
}

fn csv_export(rows: &[PgRow]) -> AgentResult<String> {
    let headers: Vec<String> = rows
        .first()
        .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let cells: Vec<Vec<Value>> = rows
        .iter()
        .map(|r| (0..r.columns().len()).map(|i| cell_to_json(r, i)).collect())
        .collect();
    rows_to_csv(&headers, &cells)
}

/// Dispatch one action against an open target connection.
///
/// Write actions are role-gated inside the executor before any statement
/// runs; read actions are open to every role.
pub async fn run_action(conn: &mut PgConnection, role: Role, action: &SqlAction) -> AgentResult<ActionOutcome> {
    info!(action = action.name(), role = %role, "sql action");
    match action {
        SqlAction::ExecuteSql { sql } => {
            let result = execute_sql(conn, role, sql).await?;
            Ok(ActionOutcome::executed(result)?)
        }
        SqlAction::ExecuteSqlBatch {
            statements,
            wrap_in_transaction,
        } => {
            let result = execute_sql_batch(conn, role, statements, *wrap_in_transaction).await?;
            Ok(ActionOutcome::executed(result)?)
        }
        SqlAction::ExportTable { table, format } => {
            let query = action
                .inspection_query()
                .ok_or_else(|| AgentError::Internal(anyhow::anyhow!("export has no query")))?;
            let rows = fetch_rows(conn, &query).await?;
            let data = match format {
                ExportFormat::Json => json!({
                    "format": "json",
                    "table": format!("{}.{}", table.schema, table.name),
                    "rowCount": rows.len(),
                    "rows": rows.iter().map(|r| Value::Object(row_to_json(r))).collect::<Vec<_>>(),
                }),
                ExportFormat::Csv => json!({
                    "format": "csv",
                    "table": format!("{}.{}", table.schema, table.name),
                    "rowCount": rows.len(),
                    "content": csv_export(&rows)?,
                }),
            };
            Ok(ActionOutcome::read(data))
        }
        other => {
            let query = other
                .inspection_query()
                .ok_or_else(|| AgentError::Internal(anyhow::anyhow!("{} has no query", other.name())))?;
            let what = other.name().trim_start_matches("get_").replace('_', " ");
            run_inspection(conn, &query, &what).await.map(ActionOutcome::read)
        }
    }
}

//! # Executor: Batch and Single-Script SQL Execution
//!
//! Statements are run through a [`StatementRunner`], which `PgConnection`
//! implements (see [`pg`]) and tests replace with a scripted fake.
//!
//! ## Batch Semantics
//!
//! `execute_batch` runs items strictly in order. With the transaction
//! envelope (the default) it issues `BEGIN`, halts at the first failure and
//! issues `ROLLBACK`, or `COMMIT` once every item succeeded. Without the
//! envelope it halts at the first failure and leaves earlier statements
//! applied. A statement failure is reported in the result (`failedIndex`,
//! `error`), never raised as an error.
//!
//! ## Role Gating
//!
//! `execute_sql` and `execute_sql_batch` check the whole input against the
//! caller's role before the first statement reaches the runner.

pub mod actions;
pub mod pg;

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::access::Role;
use crate::error::AgentResult;
use crate::sql::{self, SqlStatement};

pub use actions::{InspectionQuery, SqlAction};

/// Output of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutcome {
    pub row_count: u64,
    pub rows: Vec<Value>,
}

/// Anything that can run one SQL statement.
///
/// Errors are the database's message text; the executor decides whether a
/// failure halts the batch.
#[async_trait]
pub trait StatementRunner: Send {
    async fn run(&mut self, sql: &str) -> Result<StatementOutcome, String>;
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BatchItem {
    pub sql: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl BatchItem {
    pub fn new(sql: impl Into<String>) -> Self {
        BatchItem {
            sql: sql.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResult {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sql: String,
    pub row_count: u64,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ddl: Option<SqlStatement>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub success: bool,
    pub results: Vec<StatementResult>,
    pub completed_count: usize,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_statement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back: Option<bool>,
}

impl BatchResult {
    /// DDL statements that were actually applied.
    pub fn applied_ddl(&self) -> impl Iterator<Item = &SqlStatement> {
        let committed = self.success || self.rolled_back != Some(true);
        self.results
            .iter()
            .filter(move |r| committed && r.success)
            .filter_map(|r| r.ddl.as_ref())
    }
}

async fn run_one(runner: &mut dyn StatementRunner, index: usize, item: &BatchItem) -> StatementResult {
    let started = Instant::now();
    let outcome = runner.run(&item.sql).await;
    let execution_time_ms = started.elapsed().as_millis() as u64;
    let classified = sql::classify(&item.sql);
    let ddl = classified.is_ddl.then_some(classified);
    match outcome {
        Ok(out) => {
            debug!(index, rows = out.row_count, ms = execution_time_ms, "statement ok");
            StatementResult {
                index,
                success: true,
                description: item.description.clone(),
                sql: item.sql.clone(),
                row_count: out.row_count,
                execution_time_ms,
                error: None,
                rows: out.rows,
                ddl,
            }
        }
        Err(e) => {
            warn!(index, error = %e, "statement failed");
            StatementResult {
                index,
                success: false,
                description: item.description.clone(),
                sql: item.sql.clone(),
                row_count: 0,
                execution_time_ms,
                error: Some(e),
                rows: Vec::new(),
                ddl,
            }
        }
    }
}

/// Run `items` in order with all-or-nothing semantics when `wrap_in_transaction`.
pub async fn execute_batch(
    runner: &mut dyn StatementRunner,
    items: &[BatchItem],
    wrap_in_transaction: bool,
) -> BatchResult {
    let total_count = items.len();
    let mut results = Vec::with_capacity(total_count);

    if wrap_in_transaction {
        if let Err(e) = runner.run("BEGIN").await {
            return BatchResult {
                success: false,
                results,
                completed_count: 0,
                total_count,
                error: Some(format!("Failed to start transaction: {}", e)),
                failed_index: None,
                failed_statement: None,
                rolled_back: None,
            };
        }
    }

    for (index, item) in items.iter().enumerate() {
        let result = run_one(runner, index, item).await;
        let failed = !result.success;
        let error = result.error.clone();
        results.push(result);
        if failed {
            let rolled_back = if wrap_in_transaction {
                if let Err(e) = runner.run("ROLLBACK").await {
                    warn!(error = %e, "rollback failed");
                }
                Some(true)
            } else {
                None
            };
            return BatchResult {
                success: false,
                results,
                completed_count: index,
                total_count,
                error,
                failed_index: Some(index),
                failed_statement: Some(item.sql.clone()),
                rolled_back,
            };
        }
    }

    if wrap_in_transaction {
        if let Err(e) = runner.run("COMMIT").await {
            return BatchResult {
                success: false,
                results,
                completed_count: total_count,
                total_count,
                error: Some(format!("Failed to commit transaction: {}", e)),
                failed_index: None,
                failed_statement: None,
                rolled_back: Some(true),
            };
        }
    }

    BatchResult {
        success: true,
        results,
        completed_count: total_count,
        total_count,
        error: None,
        failed_index: None,
        failed_statement: None,
        rolled_back: None,
    }
}

/// Run a free-form script after role gating. No transaction envelope.
///
/// The script is split so each statement gets its own result entry; the
/// first failure stops execution.
pub async fn execute_sql(runner: &mut dyn StatementRunner, role: Role, script: &str) -> AgentResult<BatchResult> {
    sql::authorize_script(role, script)?;
    let items: Vec<BatchItem> = sql::split_statements(script)
        .into_iter()
        .map(BatchItem::new)
        .collect();
    Ok(execute_batch(runner, &items, false).await)
}

/// Gate every item, then run them as one batch.
pub async fn execute_sql_batch(
    runner: &mut dyn StatementRunner,
    role: Role,
    items: &[BatchItem],
    wrap_in_transaction: bool,
) -> AgentResult<BatchResult> {
    for item in items {
        sql::authorize_script(role, &item.sql)?;
    }
    Ok(execute_batch(runner, items, wrap_in_transaction).await)
}

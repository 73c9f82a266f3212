//! SQL sub-interface actions.
//!
//! `SqlAction::parse` turns an action name plus a loose JSON parameter object
//! into a typed action, validating required parameters up front. Inspection
//! actions become an [`InspectionQuery`]: catalog SQL with user-supplied
//! identifiers passed as bind parameters, or quoted with
//! [`quote_ident`](crate::sql::quote_ident) where a relation name must appear
//! in the statement text.

use csv::{Terminator, WriterBuilder};
use serde::Serialize;
use serde_json::Value;

use super::BatchItem;
use crate::error::{AgentError, AgentResult};
use crate::sql::{qualified_name, split_statements};

pub const DEFAULT_ROW_LIMIT: i64 = 100;
pub const MAX_ROW_LIMIT: i64 = 1000;
pub const MAX_EXPORT_ROWS: i64 = 10_000;

/// Every action name accepted by `/api/sql` and the agent toolbox.
pub const ACTION_NAMES: &[&str] = &[
    "execute_sql",
    "execute_sql_batch",
    "get_schema",
    "get_table_data",
    "get_table_columns",
    "export_table",
    "get_table_definition",
    "get_view_definition",
    "get_function_definition",
    "get_trigger_definition",
    "get_index_definition",
    "get_sequence_info",
    "get_type_definition",
    "get_table_structure",
    "test_connection",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

/// A schema-qualified object reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub schema: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlAction {
    ExecuteSql { sql: String },
    ExecuteSqlBatch { statements: Vec<BatchItem>, wrap_in_transaction: bool },
    GetSchema,
    GetTableData { table: ObjectRef, limit: i64, offset: i64 },
    GetTableColumns { table: ObjectRef },
    ExportTable { table: ObjectRef, format: ExportFormat },
    GetTableDefinition { table: ObjectRef },
    GetViewDefinition { view: ObjectRef },
    GetFunctionDefinition { function: ObjectRef },
    GetTriggerDefinition { trigger: ObjectRef },
    GetIndexDefinition { index: ObjectRef },
    GetSequenceInfo { sequence: ObjectRef },
    GetTypeDefinition { type_name: ObjectRef },
    GetTableStructure { table: ObjectRef },
    TestConnection,
}

fn str_param<'a>(params: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| params.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn required<'a>(params: &'a Value, keys: &[&str], action: &str) -> AgentResult<&'a str> {
    str_param(params, keys)
        .ok_or_else(|| AgentError::validation(format!("{} requires '{}'", action, keys[0])))
}

fn int_param(params: &Value, key: &str) -> AgentResult<Option<i64>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| AgentError::validation(format!("'{}' must be an integer", key))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AgentError::validation(format!("'{}' must be an integer", key))),
        Some(_) => Err(AgentError::validation(format!("'{}' must be an integer", key))),
    }
}

/// `schema.name` may be given as one dotted string or as separate fields.
fn object_ref(params: &Value, name_keys: &[&str], action: &str) -> AgentResult<ObjectRef> {
    let raw = required(params, name_keys, action)?;
    let explicit_schema = str_param(params, &["schema", "schemaName", "schema_name"]);
    let (schema, name) = match (explicit_schema, raw.split_once('.')) {
        (Some(schema), _) => (schema, raw),
        (None, Some((schema, name))) if !schema.is_empty() && !name.is_empty() => (schema, name),
        _ => ("public", raw),
    };
    Ok(ObjectRef {
        schema: schema.trim_matches('"').to_string(),
        name: name.trim_matches('"').to_string(),
    })
}

fn batch_items(params: &Value) -> AgentResult<Vec<BatchItem>> {
    let raw = params
        .get("statements")
        .or_else(|| params.get("queries"))
        .ok_or_else(|| AgentError::validation("execute_sql_batch requires 'statements'"))?;
    let items: Vec<BatchItem> = match raw {
        Value::Array(entries) => entries
            .iter()
            .map(|entry| match entry {
                Value::String(sql) => Ok(BatchItem::new(sql.clone())),
                Value::Object(_) => serde_json::from_value::<BatchItem>(entry.clone()).map_err(|e| {
                    AgentError::validation(format!("Invalid batch statement: {}", e))
                }),
                _ => Err(AgentError::validation(
                    "Batch statements must be strings or {sql, description} objects",
                )),
            })
            .collect::<AgentResult<_>>()?,
        Value::String(script) => split_statements(script).into_iter().map(BatchItem::new).collect(),
        _ => return Err(AgentError::validation("'statements' must be an array")),
    };
    if items.iter().any(|i| i.sql.trim().is_empty()) {
        return Err(AgentError::validation("Batch statements must not be empty"));
    }
    Ok(items)
}

impl SqlAction {
    pub fn parse(action: &str, params: &Value) -> AgentResult<SqlAction> {
        let action = action.trim();
        let parsed = match action {
            "execute_sql" => SqlAction::ExecuteSql {
                sql: required(params, &["sql", "query"], action)?.to_string(),
            },
            "execute_sql_batch" => SqlAction::ExecuteSqlBatch {
                statements: batch_items(params)?,
                wrap_in_transaction: params
                    .get("wrapInTransaction")
                    .or_else(|| params.get("wrap_in_transaction"))
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            },
            "get_schema" => SqlAction::GetSchema,
            "get_table_data" => {
                let limit = int_param(params, "limit")?.unwrap_or(DEFAULT_ROW_LIMIT);
                let offset = int_param(params, "offset")?.unwrap_or(0);
                SqlAction::GetTableData {
                    table: object_ref(params, &["table", "tableName", "table_name"], action)?,
                    limit: limit.clamp(1, MAX_ROW_LIMIT),
                    offset: offset.max(0),
                }
            }
            "get_table_columns" => SqlAction::GetTableColumns {
                table: object_ref(params, &["table", "tableName", "table_name"], action)?,
            },
            "export_table" => {
                let format = match str_param(params, &["format"]).map(str::to_ascii_lowercase).as_deref() {
                    None | Some("json") => ExportFormat::Json,
                    Some("csv") => ExportFormat::Csv,
                    Some(other) => {
                        return Err(AgentError::validation(format!(
                            "Unsupported export format '{}'; use json or csv",
                            other
                        )))
                    }
                };
                SqlAction::ExportTable {
                    table: object_ref(params, &["table", "tableName", "table_name"], action)?,
                    format,
                }
            }
            "get_table_definition" => SqlAction::GetTableDefinition {
                table: object_ref(params, &["table", "tableName", "table_name"], action)?,
            },
            "get_view_definition" => SqlAction::GetViewDefinition {
                view: object_ref(params, &["view", "viewName", "name"], action)?,
            },
            "get_function_definition" => SqlAction::GetFunctionDefinition {
                function: object_ref(params, &["function", "functionName", "name"], action)?,
            },
            "get_trigger_definition" => SqlAction::GetTriggerDefinition {
                trigger: object_ref(params, &["trigger", "triggerName", "name"], action)?,
            },
            "get_index_definition" => SqlAction::GetIndexDefinition {
                index: object_ref(params, &["index", "indexName", "name"], action)?,
            },
            "get_sequence_info" => SqlAction::GetSequenceInfo {
                sequence: object_ref(params, &["sequence", "sequenceName", "name"], action)?,
            },
            "get_type_definition" => SqlAction::GetTypeDefinition {
                type_name: object_ref(params, &["type", "typeName", "name"], action)?,
            },
            "get_table_structure" => SqlAction::GetTableStructure {
                table: object_ref(params, &["table", "tableName", "table_name"], action)?,
            },
            "test_connection" => SqlAction::TestConnection,
            "" => return Err(AgentError::validation("action is required")),
            other => return Err(AgentError::validation(format!("Unknown action '{}'", other))),
        };
        Ok(parsed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SqlAction::ExecuteSql { .. } => "execute_sql",
            SqlAction::ExecuteSqlBatch { .. } => "execute_sql_batch",
            SqlAction::GetSchema => "get_schema",
            SqlAction::GetTableData { .. } => "get_table_data",
            SqlAction::GetTableColumns { .. } => "get_table_columns",
            SqlAction::ExportTable { .. } => "export_table",
            SqlAction::GetTableDefinition { .. } => "get_table_definition",
            SqlAction::GetViewDefinition { .. } => "get_view_definition",
            SqlAction::GetFunctionDefinition { .. } => "get_function_definition",
            SqlAction::GetTriggerDefinition { .. } => "get_trigger_definition",
            SqlAction::GetIndexDefinition { .. } => "get_index_definition",
            SqlAction::GetSequenceInfo { .. } => "get_sequence_info",
            SqlAction::GetTypeDefinition { .. } => "get_type_definition",
            SqlAction::GetTableStructure { .. } => "get_table_structure",
            SqlAction::TestConnection => "test_connection",
        }
    }

    /// Whether the action can change the target database.
    pub fn is_write(&self) -> bool {
        matches!(self, SqlAction::ExecuteSql { .. } | SqlAction::ExecuteSqlBatch { .. })
    }

    /// Catalog query for read-only actions; `None` for the execute actions.
    pub fn inspection_query(&self) -> Option<InspectionQuery> {
        let q = match self {
            SqlAction::ExecuteSql { .. } | SqlAction::ExecuteSqlBatch { .. } => return None,
            SqlAction::GetSchema => InspectionQuery::many(SCHEMA_SQL, vec![]),
            SqlAction::GetTableData { table, limit, offset } => InspectionQuery::many(
                format!(
                    "SELECT * FROM {} LIMIT {} OFFSET {}",
                    qualified_name(Some(&table.schema), &table.name),
                    limit,
                    offset
                ),
                vec![],
            ),
            SqlAction::GetTableColumns { table } => InspectionQuery::many(COLUMNS_SQL, table.binds()),
            SqlAction::ExportTable { table, .. } => InspectionQuery::many(
                format!(
                    "SELECT * FROM {} LIMIT {}",
                    qualified_name(Some(&table.schema), &table.name),
                    MAX_EXPORT_ROWS
                ),
                vec![],
            ),
            SqlAction::GetTableDefinition { table } => InspectionQuery::single(TABLE_DEFINITION_SQL, table.binds()),
            SqlAction::GetViewDefinition { view } => InspectionQuery::single(VIEW_DEFINITION_SQL, view.binds()),
            SqlAction::GetFunctionDefinition { function } => {
                InspectionQuery::many(FUNCTION_DEFINITION_SQL, function.binds())
            }
            SqlAction::GetTriggerDefinition { trigger } => {
                InspectionQuery::many(TRIGGER_DEFINITION_SQL, trigger.binds())
            }
            SqlAction::GetIndexDefinition { index } => InspectionQuery::single(INDEX_DEFINITION_SQL, index.binds()),
            SqlAction::GetSequenceInfo { sequence } => InspectionQuery::single(SEQUENCE_INFO_SQL, sequence.binds()),
            SqlAction::GetTypeDefinition { type_name } => {
                InspectionQuery::single(TYPE_DEFINITION_SQL, type_name.binds())
            }
            SqlAction::GetTableStructure { table } => InspectionQuery::single(TABLE_STRUCTURE_SQL, table.binds()),
            SqlAction::TestConnection => InspectionQuery::single(TEST_CONNECTION_SQL, vec![]),
        };
        Some(q)
    }
}

impl ObjectRef {
    fn binds(&self) -> Vec<String> {
        vec![self.schema.clone(), self.name.clone()]
    }
}

/// A read-only catalog query. `single` actions return one object (or
/// `not_found`), the rest return an array of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectionQuery {
    pub sql: String,
    pub binds: Vec<String>,
    pub single: bool,
}

impl InspectionQuery {
    fn many(sql: impl Into<String>, binds: Vec<String>) -> Self {
        InspectionQuery {
            sql: sql.into(),
            binds,
            single: false,
        }
    }

    fn single(sql: impl Into<String>, binds: Vec<String>) -> Self {
        InspectionQuery {
            sql: sql.into(),
            binds,
            single: true,
        }
    }
}

/// Render rows as RFC 4180 CSV with a header line. Nulls are empty fields;
/// no columns means no output at all.
pub fn rows_to_csv(headers: &[String], rows: &[Vec<Value>]) -> AgentResult<String> {
    if headers.is_empty() {
        return Ok(String::new());
    }
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(headers).map_err(anyhow::Error::from)?;
    for row in rows {
        let fields = row.iter().map(|v| match v {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        writer.write_record(fields).map_err(anyhow::Error::from)?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("csv flush failed: {}", e))?;
    Ok(String::from_utf8(bytes).map_err(anyhow::Error::from)?)
}

const SCHEMA_SQL: &str = "SELECT c.table_schema::text AS schema,
        c.table_name::text AS table,
        t.table_type::text AS table_type,
        json_agg(json_build_object(
            'name', c.column_name,
            'type', c.data_type,
            'nullable', c.is_nullable = 'YES',
            'default', c.column_default
        ) ORDER BY c.ordinal_position) AS columns
 FROM information_schema.columns c
 JOIN information_schema.tables t
   ON t.table_schema = c.table_schema AND t.table_name = c.table_name
 WHERE c.table_schema NOT IN ('pg_catalog', 'information_schema')
   AND c.table_schema NOT LIKE 'pg_toast%'
 GROUP BY c.table_schema, c.table_name, t.table_type
 ORDER BY 1, 2";

const COLUMNS_SQL: &str = "SELECT column_name::text AS name,
        data_type::text AS type,
        udt_name::text AS udt_name,
        is_nullable = 'YES' AS nullable,
        column_default::text AS default,
        ordinal_position::int4 AS position
 FROM information_schema.columns
 WHERE table_schema = $1 AND table_name = $2
 ORDER BY ordinal_position";

const TABLE_DEFINITION_SQL: &str = "SELECT 'CREATE TABLE ' || quote_ident(n.nspname) || '.' || quote_ident(c.relname)
        || E' (\\n' || string_agg(
            '  ' || quote_ident(a.attname) || ' ' || format_type(a.atttypid, a.atttypmod)
            || CASE WHEN a.attnotnull THEN ' NOT NULL' ELSE '' END
            || CASE WHEN d.adbin IS NOT NULL THEN ' DEFAULT ' || pg_get_expr(d.adbin, d.adrelid) ELSE '' END,
            E',\\n' ORDER BY a.attnum)
        || COALESCE((SELECT E',\\n' || string_agg('  CONSTRAINT ' || quote_ident(con.conname) || ' '
                        || pg_get_constraintdef(con.oid), E',\\n' ORDER BY con.conname)
                     FROM pg_constraint con WHERE con.conrelid = c.oid), '')
        || E'\\n);' AS definition
 FROM pg_class c
 JOIN pg_namespace n ON n.oid = c.relnamespace
 JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum > 0 AND NOT a.attisdropped
 LEFT JOIN pg_attrdef d ON d.adrelid = c.oid AND d.adnum = a.attnum
 WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p')
 GROUP BY n.nspname, c.relname, c.oid";

const VIEW_DEFINITION_SQL: &str = "SELECT n.nspname::text AS schema,
        c.relname::text AS name,
        c.relkind = 'm' AS materialized,
        pg_get_viewdef(c.oid, true) AS definition
 FROM pg_class c
 JOIN pg_namespace n ON n.oid = c.relnamespace
 WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('v', 'm')";

const FUNCTION_DEFINITION_SQL: &str = "SELECT p.proname::text AS name,
        pg_get_function_identity_arguments(p.oid) AS arguments,
        pg_get_function_result(p.oid) AS returns,
        pg_get_functiondef(p.oid) AS definition
 FROM pg_proc p
 JOIN pg_namespace n ON n.oid = p.pronamespace
 WHERE n.nspname = $1 AND p.proname = $2 AND p.prokind IN ('f', 'p')
 ORDER BY 2";

const TRIGGER_DEFINITION_SQL: &str = "SELECT t.tgname::text AS name,
        c.relname::text AS table,
        pg_get_triggerdef(t.oid, true) AS definition,
        t.tgenabled <> 'D' AS enabled
 FROM pg_trigger t
 JOIN pg_class c ON c.oid = t.tgrelid
 JOIN pg_namespace n ON n.oid = c.relnamespace
 WHERE NOT t.tgisinternal AND n.nspname = $1 AND t.tgname = $2
 ORDER BY 2";

const INDEX_DEFINITION_SQL: &str = "SELECT indexname::text AS name,
        tablename::text AS table,
        indexdef AS definition
 FROM pg_indexes
 WHERE schemaname = $1 AND indexname = $2";

const SEQUENCE_INFO_SQL: &str = "SELECT schemaname::text AS schema,
        sequencename::text AS name,
        data_type::text AS data_type,
        start_value, min_value, max_value, increment_by, cycle, cache_size, last_value
 FROM pg_sequences
 WHERE schemaname = $1 AND sequencename = $2";

const TYPE_DEFINITION_SQL: &str = "SELECT t.typname::text AS name,
        CASE t.typtype WHEN 'e' THEN 'enum' WHEN 'c' THEN 'composite' WHEN 'd' THEN 'domain'
                       WHEN 'r' THEN 'range' ELSE 'base' END AS kind,
        (SELECT json_agg(e.enumlabel ORDER BY e.enumsortorder)
           FROM pg_enum e WHERE e.enumtypid = t.oid) AS labels,
        (SELECT json_agg(json_build_object('name', a.attname, 'type', format_type(a.atttypid, a.atttypmod))
                         ORDER BY a.attnum)
           FROM pg_attribute a
          WHERE a.attrelid = t.typrelid AND a.attnum > 0 AND NOT a.attisdropped) AS attributes,
        CASE WHEN t.typtype = 'd' THEN format_type(t.typbasetype, t.typtypmod) END AS base_type
 FROM pg_type t
 JOIN pg_namespace n ON n.oid = t.typnamespace
 WHERE n.nspname = $1 AND t.typname = $2";

const TABLE_STRUCTURE_SQL: &str = "SELECT $1::text AS schema, $2::text AS name,
        (SELECT json_agg(json_build_object(
                   'name', column_name, 'type', data_type,
                   'nullable', is_nullable = 'YES', 'default', column_default)
                 ORDER BY ordinal_position)
           FROM information_schema.columns
          WHERE table_schema = $1 AND table_name = $2) AS columns,
        (SELECT json_agg(json_build_object(
                   'name', con.conname, 'type', con.contype::text,
                   'definition', pg_get_constraintdef(con.oid)))
           FROM pg_constraint con
           JOIN pg_class c ON c.oid = con.conrelid
           JOIN pg_namespace n ON n.oid = c.relnamespace
          WHERE n.nspname = $1 AND c.relname = $2) AS constraints,
        (SELECT json_agg(json_build_object('name', indexname, 'definition', indexdef))
           FROM pg_indexes
          WHERE schemaname = $1 AND tablename = $2) AS indexes
 WHERE EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2)";

const TEST_CONNECTION_SQL: &str =
    "SELECT version() AS version, current_database()::text AS database, current_user::text AS user";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_action_is_validation_error() {
        let err = SqlAction::parse("drop_everything", &json!({})).unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
        assert!(SqlAction::parse("  ", &json!({})).is_err());
    }

    #[test]
    fn required_parameters_are_checked() {
        assert!(SqlAction::parse("execute_sql", &json!({})).is_err());
        assert!(SqlAction::parse("get_table_data", &json!({"limit": 5})).is_err());
        assert!(SqlAction::parse("get_view_definition", &json!({"view": ""})).is_err());
        assert!(SqlAction::parse("execute_sql_batch", &json!({"statements": 3})).is_err());
    }

    #[test]
    fn every_listed_action_parses_with_a_name() {
        let params = json!({
            "sql": "SELECT 1",
            "statements": ["SELECT 1"],
            "table": "t",
            "name": "x",
        });
        for name in ACTION_NAMES {
            let action = SqlAction::parse(name, &params).unwrap();
            assert_eq!(action.name(), *name);
        }
    }

    #[test]
    fn dotted_names_split_into_schema() {
        let action = SqlAction::parse("get_table_columns", &json!({"tableName": "app.users"})).unwrap();
        assert_eq!(
            action,
            SqlAction::GetTableColumns {
                table: ObjectRef {
                    schema: "app".into(),
                    name: "users".into()
                }
            }
        );
        let explicit = SqlAction::parse("get_table_columns", &json!({"table": "users", "schema": "crm"})).unwrap();
        let q = explicit.inspection_query().unwrap();
        assert_eq!(q.binds, vec!["crm".to_string(), "users".to_string()]);
    }

    #[test]
    fn table_data_limits_are_clamped() {
        let action = SqlAction::parse("get_table_data", &json!({"table": "t", "limit": 50_000, "offset": -3})).unwrap();
        assert_eq!(
            action,
            SqlAction::GetTableData {
                table: ObjectRef {
                    schema: "public".into(),
                    name: "t".into()
                },
                limit: MAX_ROW_LIMIT,
                offset: 0
            }
        );
        assert!(SqlAction::parse("get_table_data", &json!({"table": "t", "limit": "ten"})).is_err());
    }

    #[test]
    fn table_names_are_quoted_not_interpolated() {
        let action = SqlAction::parse("get_table_data", &json!({"table": "x\"; DROP TABLE y; --"})).unwrap();
        let q = action.inspection_query().unwrap();
        assert!(q.sql.starts_with("SELECT * FROM \"public\".\"x\"\"; DROP TABLE y; --\" LIMIT 100"));
        assert!(q.binds.is_empty());
    }

    #[test]
    fn batch_accepts_strings_objects_and_scripts() {
        let action = SqlAction::parse(
            "execute_sql_batch",
            &json!({"statements": ["SELECT 1", {"sql": "SELECT 2", "description": "two"}], "wrapInTransaction": false}),
        )
        .unwrap();
        match action {
            SqlAction::ExecuteSqlBatch { statements, wrap_in_transaction } => {
                assert_eq!(statements.len(), 2);
                assert_eq!(statements[1].description.as_deref(), Some("two"));
                assert!(!wrap_in_transaction);
            }
            other => panic!("unexpected {:?}", other),
        }
        let script = SqlAction::parse("execute_sql_batch", &json!({"statements": "SELECT 1; SELECT 2;"})).unwrap();
        assert!(matches!(script, SqlAction::ExecuteSqlBatch { ref statements, wrap_in_transaction: true } if statements.len() == 2));
    }

    #[test]
    fn export_format_is_validated() {
        assert!(SqlAction::parse("export_table", &json!({"table": "t", "format": "xml"})).is_err());
        let csv = SqlAction::parse("export_table", &json!({"table": "t", "format": "CSV"})).unwrap();
        assert!(matches!(csv, SqlAction::ExportTable { format: ExportFormat::Csv, .. }));
    }

    #[test]
    fn only_execute_actions_write() {
        assert!(SqlAction::parse("execute_sql", &json!({"sql": "SELECT 1"})).unwrap().is_write());
        assert!(!SqlAction::GetSchema.is_write());
        assert!(SqlAction::ExecuteSql { sql: "x".into() }.inspection_query().is_none());
        assert!(SqlAction::TestConnection.inspection_query().unwrap().single);
    }

    #[test]
    fn csv_rendering_escapes_fields() {
        let csv = rows_to_csv(
            &["id".into(), "note".into()],
            &[
                vec![json!(1), json!("plain")],
                vec![json!(2), json!("has, comma and \"quote\"")],
                vec![json!(3), Value::Null],
            ],
        )
        .unwrap();
        assert_eq!(csv, "id,note\n1,plain\n2,\"has, comma and \"\"quote\"\"\"\n3,\n");
    }

    #[test]
    fn csv_quotes_embedded_newlines_and_json_cells() {
        let csv = rows_to_csv(
            &["doc".into()],
            &[vec![json!({"a": [1, 2]})], vec![json!("line one\nline two")]],
        )
        .unwrap();
        assert_eq!(csv, "doc\n\"{\"\"a\"\":[1,2]}\"\n\"line one\nline two\"\n");
        assert_eq!(rows_to_csv(&[], &[]).unwrap(), "");
    }
}

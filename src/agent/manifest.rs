//! Tool manifest: the operations the model may request.
//!
//! The canonical manifest is fixed; per-session customization can only
//! override descriptions or disable tools. Disabled tools are dropped from
//! the prompt documentation and both structured-output schemas.

use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    DatabaseOperations,
    ProjectContextTools,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::DatabaseOperations => "database_operations",
            ToolCategory::ProjectContextTools => "project_context_tools",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolParam {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub required: bool,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

fn param(name: &str, param_type: &str, required: bool, description: &str) -> ToolParam {
    ToolParam {
        name: name.to_string(),
        param_type: param_type.to_string(),
        required,
        description: description.to_string(),
        allowed: None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub category: ToolCategory,
    pub description: String,
    pub enabled: bool,
    /// Declaration order is preserved in docs and schemas.
    pub parameters: Vec<ToolParam>,
}

fn tool(name: &str, category: ToolCategory, description: &str, parameters: Vec<ToolParam>) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        category,
        description: description.to_string(),
        enabled: true,
        parameters,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolManifest {
    tools: Vec<ToolDefinition>,
}

fn database_tools() -> Vec<ToolDefinition> {
    use ToolCategory::DatabaseOperations as Db;
    let schema = || param("schema", "string", false, "Schema name (default: public)");
    let table = || param("table", "string", true, "Table name, optionally schema-qualified");

    let mut export_format = param("format", "string", false, "Export format (default: json)");
    export_format.allowed = Some(vec!["json".into(), "csv".into()]);

    vec![
        tool(
            "execute_sql",
            Db,
            "Execute one or more SQL statements. Destructive statements (DROP, TRUNCATE, \
             DELETE without WHERE, ALTER TABLE ... DROP) require the owner role.",
            vec![param("sql", "string", true, "SQL to execute; may contain several statements")],
        ),
        tool(
            "execute_sql_batch",
            Db,
            "Execute an ordered list of statements. With wrapInTransaction (default true) \
             the whole batch is rolled back if any statement fails.",
            vec![
                param("statements", "array", true, "Statements as strings or {sql, description} objects"),
                param("wrapInTransaction", "boolean", false, "Run the batch in one transaction (default: true)"),
            ],
        ),
        tool("get_schema", Db, "List every user table with its columns.", vec![]),
        tool(
            "get_table_data",
            Db,
            "Read rows from a table.",
            vec![
                table(),
                schema(),
                param("limit", "integer", false, "Maximum rows (default 100, max 1000)"),
                param("offset", "integer", false, "Rows to skip"),
            ],
        ),
        tool("get_table_columns", Db, "List a table's columns and types.", vec![table(), schema()]),
        tool(
            "export_table",
            Db,
            "Export a table's contents as JSON or CSV.",
            vec![table(), schema(), export_format],
        ),
        tool(
            "get_table_definition",
            Db,
            "Reconstruct the CREATE TABLE statement for a table.",
            vec![table(), schema()],
        ),
        tool(
            "get_view_definition",
            Db,
            "Show the query behind a view or materialized view.",
            vec![param("view", "string", true, "View name"), schema()],
        ),
        tool(
            "get_function_definition",
            Db,
            "Show the full definition of a function or procedure (all overloads).",
            vec![param("function", "string", true, "Function name"), schema()],
        ),
        tool(
            "get_trigger_definition",
            Db,
            "Show the CREATE TRIGGER statement for a trigger.",
            vec![param("trigger", "string", true, "Trigger name"), schema()],
        ),
        tool(
            "get_index_definition",
            Db,
            "Show the CREATE INDEX statement for an index.",
            vec![param("index", "string", true, "Index name"), schema()],
        ),
        tool(
            "get_sequence_info",
            Db,
            "Show a sequence's bounds, increment and current value.",
            vec![param("sequence", "string", true, "Sequence name"), schema()],
        ),
        tool(
            "get_type_definition",
            Db,
            "Describe a user-defined type (enum labels, composite attributes, domain base).",
            vec![param("type", "string", true, "Type name"), schema()],
        ),
        tool(
            "get_table_structure",
            Db,
            "Columns, constraints and indexes of a table in one call.",
            vec![table(), schema()],
        ),
        tool("test_connection", Db, "Check connectivity and report the server version.", vec![]),
    ]
}

fn project_tools() -> Vec<ToolDefinition> {
    vec![tool(
        "get_project_context",
        ToolCategory::ProjectContextTools,
        "Return the project context supplied with this session.",
        vec![],
    )]
}

impl ToolManifest {
    /// The canonical manifest. Project tools are included only when exposed.
    pub fn canonical(expose_project: bool) -> Self {
        let mut tools = database_tools();
        if expose_project {
            tools.extend(project_tools());
        }
        ToolManifest { tools }
    }

    /// Replace descriptions by tool name. Unknown names are ignored; blank
    /// overrides keep the canonical text.
    pub fn with_descriptions(mut self, overrides: &HashMap<String, String>) -> Self {
        for tool in &mut self.tools {
            if let Some(desc) = overrides.get(&tool.name).map(|d| d.trim()).filter(|d| !d.is_empty()) {
                tool.description = desc.to_string();
            }
        }
        self
    }

    pub fn disable(&mut self, name: &str) {
        if let Some(tool) = self.tools.iter_mut().find(|t| t.name == name) {
            tool.enabled = false;
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().filter(|t| t.enabled)
    }

    pub fn enabled_names(&self) -> Vec<&str> {
        self.enabled().map(|t| t.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.enabled)
    }

    /// Tool documentation for the system prompt, grouped by category.
    pub fn render_docs(&self) -> String {
        let mut out = String::new();
        for category in [ToolCategory::DatabaseOperations, ToolCategory::ProjectContextTools] {
            let tools: Vec<&ToolDefinition> = self.enabled().filter(|t| t.category == category).collect();
            if tools.is_empty() {
                continue;
            }
            out.push_str(&format!("### {}\n\n", category.as_str()));
            for tool in tools {
                out.push_str(&format!("- **{}**: {}\n", tool.name, tool.description));
                for p in &tool.parameters {
                    let mut line = format!(
                        "  - `{}` ({}{}): {}",
                        p.name,
                        p.param_type,
                        if p.required { ", required" } else { "" },
                        p.description
                    );
                    if let Some(allowed) = &p.allowed {
                        line.push_str(&format!(" [{}]", allowed.join(", ")));
                    }
                    out.push_str(&line);
                    out.push('\n');
                }
            }
            out.push('\n');
        }
        out
    }
}

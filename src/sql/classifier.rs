//! # Classifier: DDL Detection and Object-Name Extraction
//!
//! Pure, side-effect-free inspection of a single statement. The metadata
//! produced here drives the migration log: every successful schema change
//! is recorded with its statement type, object type and qualified name.
//!
//! Detection is regex based and deliberately shallow. It never tries to
//! parse SQL; a statement that confuses it is reported as `OTHER`/`UNKNOWN`
//! rather than rejected.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::sql::code_only;

/// Coarse statement type, taken from the first keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementType {
    Create,
    Alter,
    Drop,
    Truncate,
    Grant,
    Revoke,
    Comment,
    Other,
}

impl StatementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementType::Create => "CREATE",
            StatementType::Alter => "ALTER",
            StatementType::Drop => "DROP",
            StatementType::Truncate => "TRUNCATE",
            StatementType::Grant => "GRANT",
            StatementType::Revoke => "REVOKE",
            StatementType::Comment => "COMMENT",
            StatementType::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for StatementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target object kind of a DDL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    #[serde(rename = "TABLE")]
    Table,
    #[serde(rename = "MATERIALIZED VIEW")]
    MaterializedView,
    #[serde(rename = "VIEW")]
    View,
    #[serde(rename = "FUNCTION")]
    Function,
    #[serde(rename = "PROCEDURE")]
    Procedure,
    #[serde(rename = "TRIGGER")]
    Trigger,
    #[serde(rename = "INDEX")]
    Index,
    #[serde(rename = "SEQUENCE")]
    Sequence,
    #[serde(rename = "TYPE")]
    Type,
    #[serde(rename = "SCHEMA")]
    Schema,
    #[serde(rename = "EXTENSION")]
    Extension,
    #[serde(rename = "POLICY")]
    Policy,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Table => "TABLE",
            ObjectType::MaterializedView => "MATERIALIZED VIEW",
            ObjectType::View => "VIEW",
            ObjectType::Function => "FUNCTION",
            ObjectType::Procedure => "PROCEDURE",
            ObjectType::Trigger => "TRIGGER",
            ObjectType::Index => "INDEX",
            ObjectType::Sequence => "SEQUENCE",
            ObjectType::Type => "TYPE",
            ObjectType::Schema => "SCHEMA",
            ObjectType::Extension => "EXTENSION",
            ObjectType::Policy => "POLICY",
            ObjectType::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlStatement {
    pub sql: String,
    pub is_ddl: bool,
    pub statement_type: StatementType,
    pub object_type: ObjectType,
    pub schema: Option<String>,
    pub name: Option<String>,
}

/// Object-type keywords. The first one to appear in the statement header
/// decides the type, so `CREATE TRIGGER ... ON TABLE` is a trigger and
/// `ALTER TABLE ... ADD COLUMN index int` is a table. Two-word keywords are
/// matched before the single word they start with.
const OBJECT_KEYWORDS: &[(&str, ObjectType)] = &[
    ("MATERIALIZED VIEW", ObjectType::MaterializedView),
    ("TRIGGER", ObjectType::Trigger),
    ("INDEX", ObjectType::Index),
    ("POLICY", ObjectType::Policy),
    ("FUNCTION", ObjectType::Function),
    ("PROCEDURE", ObjectType::Procedure),
    ("SEQUENCE", ObjectType::Sequence),
    ("EXTENSION", ObjectType::Extension),
    ("VIEW", ObjectType::View),
    ("TABLE", ObjectType::Table),
    ("TYPE", ObjectType::Type),
    ("SCHEMA", ObjectType::Schema),
];

fn ddl_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?is)^\s*CREATE\s+(OR\s+REPLACE\s+)?(UNIQUE\s+)?(TEMP(ORARY)?\s+|UNLOGGED\s+)?(TABLE|VIEW|MATERIALIZED\s+VIEW|FUNCTION|PROCEDURE|TRIGGER|CONSTRAINT\s+TRIGGER|INDEX|SEQUENCE|TYPE|SCHEMA|EXTENSION|POLICY)\b",
            r"(?is)^\s*ALTER\s+(TABLE|VIEW|MATERIALIZED\s+VIEW|FUNCTION|SEQUENCE|TYPE|SCHEMA|INDEX|POLICY)\b",
            r"(?is)^\s*DROP\s+\w+",
            r"(?is)^\s*TRUNCATE\b",
            r"(?is)^\s*GRANT\b",
            r"(?is)^\s*REVOKE\b",
            r"(?is)^\s*COMMENT\s+ON\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static DDL pattern"))
        .collect()
    })
}

fn object_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?is)^\s*(?:CREATE|ALTER|DROP|TRUNCATE|COMMENT\s+ON)\s+(?:OR\s+REPLACE\s+)?(?:UNIQUE\s+)?(?:TEMP(?:ORARY)?\s+|UNLOGGED\s+)?(?:CONSTRAINT\s+)?(?:MATERIALIZED\s+VIEW|TABLE|VIEW|FUNCTION|PROCEDURE|TRIGGER|INDEX|SEQUENCE|TYPE|SCHEMA|EXTENSION|POLICY)?\s*(?:CONCURRENTLY\s+)?(?:IF\s+(?:NOT\s+)?EXISTS\s+)?(?:ONLY\s+)?(?:("[^"]+"|[A-Za-z_][\w$]*)\s*\.\s*)?("[^"]+"|[A-Za-z_][\w$]*)"#,
        )
        .expect("static object-name pattern")
    })
}

/// Drop leading whitespace and comments so the first keyword is visible.
fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(nl) => after[nl + 1..].trim_start(),
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(end) => after[end + 2..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}

/// Whether the statement changes schema shape (or privileges).
pub fn is_ddl(sql: &str) -> bool {
    let body = strip_leading_comments(sql);
    ddl_patterns().iter().any(|re| re.is_match(body))
}

/// Statement type from the first keyword.
pub fn statement_type(sql: &str) -> StatementType {
    let body = strip_leading_comments(sql);
    let first = body
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    match first.as_str() {
        "CREATE" => StatementType::Create,
        "ALTER" => StatementType::Alter,
        "DROP" => StatementType::Drop,
        "TRUNCATE" => StatementType::Truncate,
        "GRANT" => StatementType::Grant,
        "REVOKE" => StatementType::Revoke,
        "COMMENT" => StatementType::Comment,
        _ => StatementType::Other,
    }
}

/// Object type from the first [`OBJECT_KEYWORDS`] entry in the header.
///
/// Only the statement header (up to the first parenthesis or `AS`) is
/// searched, with comments and literals masked out, so column names such as
/// `type` or `index_id` inside a `CREATE TABLE` body cannot win.
pub fn object_type(sql: &str) -> ObjectType {
    let body = code_only(strip_leading_comments(sql)).to_ascii_uppercase();
    let header_end = [body.find('('), body.find(" AS ")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(body.len());
    let words: Vec<&str> = body[..header_end].split_whitespace().collect();

    for (i, word) in words.iter().enumerate() {
        let pair = words.get(i + 1).map(|next| format!("{} {}", word, next));
        let hit = OBJECT_KEYWORDS
            .iter()
            .find(|(kw, _)| pair.as_deref() == Some(*kw) || kw == word);
        if let Some((_, ty)) = hit {
            return *ty;
        }
    }
    ObjectType::Unknown
}

fn unquote(ident: &str) -> String {
    if ident.len() >= 2 && ident.starts_with('"') && ident.ends_with('"') {
        ident[1..ident.len() - 1].replace("\"\"", "\"")
    } else {
        ident.to_string()
    }
}

/// Best-effort `(schema, name)` of the statement's target object.
///
/// Returns `None` when no identifier can be located (e.g. `GRANT`).
pub fn object_name(sql: &str) -> Option<(Option<String>, String)> {
    let body = strip_leading_comments(sql);
    let caps = object_name_pattern().captures(body)?;
    let name = caps.get(2).map(|m| unquote(m.as_str()))?;
    let upper = name.to_ascii_uppercase();
    // The optional keyword groups can let a bare keyword slip into the name slot.
    if matches!(upper.as_str(), "ON" | "IF" | "AS" | "OR" | "COLUMN") {
        return None;
    }
    let schema = caps.get(1).map(|m| unquote(m.as_str()));
    Some((schema, name))
}

/// Full classification of one statement.
pub fn classify(sql: &str) -> SqlStatement {
    let ddl = is_ddl(sql);
    let stype = statement_type(sql);
    let (object_type, schema, name) = if ddl {
        let (schema, name) = match object_name(sql) {
            Some((schema, name)) => (schema, Some(name)),
            None => (None, None),
        };
        (object_type(sql), schema, name)
    } else {
        (ObjectType::Unknown, None, None)
    };
    SqlStatement {
        sql: sql.to_string(),
        is_ddl: ddl,
        statement_type: stype,
        object_type,
        schema,
        name,
    }
}

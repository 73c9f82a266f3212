//! # SQL: Statement Splitting, Classification, Policy and Value Conversion
//!
//! The pure half of the execution engine. Nothing here opens a connection:
//!
//! - [`splitter`]: script → ordered statements (comment/quote/dollar-quote aware)
//! - [`classifier`]: statement → DDL flag, statement/object type, qualified name
//! - [`policy`]: role gating and the destructive-statement pattern set
//! - [`values`]: JSON-safe conversion of result values

pub mod classifier;
pub mod policy;
pub mod splitter;
pub mod values;

pub use classifier::{classify, is_ddl, ObjectType, SqlStatement, StatementType};
pub use policy::{authorize_script, is_destructive};
pub use splitter::{code_only, split_statements};
pub use values::json_safe;

/// Quote an identifier for safe interpolation (`"` doubled, wrapped in `"`).
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an optionally schema-qualified name. Defaults to `public`.
pub fn qualified_name(schema: Option<&str>, name: &str) -> String {
    format!("{}.{}", quote_ident(schema.unwrap_or("public")), quote_ident(name))
}

//! Role gating for SQL execution.
//!
//! Checked before a statement reaches the database, never after:
//!
//! - any execution through `execute_sql` / `execute_sql_batch` needs `editor` or `owner`
//! - destructive statements need `owner`
//!
//! A statement is destructive when it matches one of: `DROP ...`,
//! `TRUNCATE`, `DELETE FROM ...` without a `WHERE` clause, or
//! `ALTER TABLE ... DROP ...`.

use regex::Regex;
use std::sync::OnceLock;

use crate::access::Role;
use crate::error::{AgentError, AgentResult};
use crate::sql::{code_only, split_statements};

fn destructive_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?is)^\s*DROP\s+",
            r"(?is)^\s*TRUNCATE\b",
            r"(?is)^\s*ALTER\s+TABLE\s+.*\bDROP\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static policy pattern"))
        .collect()
    })
}

fn delete_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)^\s*DELETE\s+FROM\b").expect("static delete pattern"))
}

fn where_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)\bWHERE\b").expect("static where pattern"))
}

/// Whether one statement matches the destructive pattern set.
///
/// Patterns run against [`code_only`] text, so keywords inside comments,
/// string literals or quoted identifiers neither trigger nor satisfy them.
pub fn is_destructive(statement: &str) -> bool {
    let masked = code_only(statement);
    let sql = masked.trim_start();
    if destructive_patterns().iter().any(|re| re.is_match(sql)) {
        return true;
    }
    delete_pattern().is_match(sql) && !where_pattern().is_match(sql)
}

/// Check that `role` may execute every statement in `sql`.
///
/// The text is split first so a destructive statement cannot hide behind a
/// harmless one in the same string.
pub fn authorize_script(role: Role, sql: &str) -> AgentResult<()> {
    if !role.can_execute() {
        return Err(AgentError::access_denied(format!(
            "Role '{}' cannot execute SQL; editor or owner required",
            role
        )));
    }
    if role.can_run_destructive() {
        return Ok(());
    }
    for statement in split_statements(sql) {
        if is_destructive(&statement) {
            return Err(AgentError::access_denied(format!(
                "Destructive statement requires owner role: {}",
                preview(&statement)
            )));
        }
    }
    Ok(())
}

fn preview(statement: &str) -> String {
    let flat: String = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 80 {
        format!("{}...", flat.chars().take(80).collect::<String>())
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destructive_patterns_match() {
        for sql in [
            "DROP TABLE users",
            "drop index idx",
            "TRUNCATE logs",
            "DELETE FROM users",
            "DELETE FROM users;",
            "ALTER TABLE users DROP COLUMN email",
            "ALTER TABLE users DROP CONSTRAINT fk",
            "-- cleanup\nDROP VIEW v",
            "/* nightly */ TRUNCATE logs",
        ] {
            assert!(is_destructive(sql), "{sql} should be destructive");
        }
    }

    #[test]
    fn safe_statements_do_not_match() {
        for sql in [
            "SELECT * FROM users",
            "DELETE FROM users WHERE id = 1",
            "delete from users where created_at < now()",
            "ALTER TABLE users ADD COLUMN age int",
            "UPDATE users SET name = 'DROP TABLE x'",
            "CREATE TABLE dropped_items (id int)",
        ] {
            assert!(!is_destructive(sql), "{sql} should not be destructive");
        }
    }

    #[test]
    fn editor_blocked_from_unfiltered_delete() {
        let err = authorize_script(Role::Editor, "DELETE FROM users;").unwrap_err();
        assert!(matches!(err, AgentError::AccessDenied(_)));
    }

    #[test]
    fn editor_may_run_filtered_writes() {
        authorize_script(Role::Editor, "UPDATE t SET a = 1 WHERE id = 2; INSERT INTO t VALUES (1)")
            .unwrap();
    }

    #[test]
    fn destructive_statement_hidden_after_harmless_one() {
        let err = authorize_script(Role::Editor, "SELECT 1; DROP TABLE accounts").unwrap_err();
        assert!(err.to_string().contains("DROP TABLE accounts"));
    }

    #[test]
    fn owner_may_run_everything() {
        authorize_script(Role::Owner, "DROP TABLE users; TRUNCATE logs").unwrap();
    }

    #[test]
    fn viewer_cannot_execute() {
        let err = authorize_script(Role::Viewer, "SELECT 1").unwrap_err();
        assert!(matches!(err, AgentError::AccessDenied(_)));
    }

    #[test]
    fn where_inside_comment_or_literal_does_not_filter_delete() {
        for sql in [
            "DELETE FROM users -- WHERE",
            "DELETE FROM users /* where */",
            "DELETE FROM users; -- where",
            "DELETE FROM users RETURNING 'where'",
            "DELETE FROM \"where\"",
            "DELETE FROM users RETURNING $$ WHERE $$",
        ] {
            assert!(is_destructive(sql), "{sql} should be destructive");
        }
    }

    #[test]
    fn keywords_inside_literals_do_not_trip_patterns() {
        for sql in [
            "ALTER TABLE t ADD COLUMN c text DEFAULT 'drop'",
            "ALTER TABLE t ADD COLUMN c text -- drop later",
            "ALTER TABLE \"drop\" ADD COLUMN c int",
            "INSERT INTO notes VALUES ('TRUNCATE me')",
        ] {
            assert!(!is_destructive(sql), "{sql} should not be destructive");
        }
    }

    #[test]
    fn editor_blocked_when_where_is_commented_out() {
        for sql in ["DELETE FROM users -- WHERE id = 1", "DELETE FROM users /* WHERE id = 1 */;"] {
            let err = authorize_script(Role::Editor, sql).unwrap_err();
            assert!(matches!(err, AgentError::AccessDenied(_)), "{sql}");
        }
    }

    #[test]
    fn editor_may_add_column_with_keyword_default() {
        authorize_script(Role::Editor, "ALTER TABLE t ADD COLUMN c text DEFAULT 'drop'").unwrap();
    }
}

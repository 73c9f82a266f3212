//! # Splitter: Multi-Statement SQL Script Tokenizer
//!
//! Splits a raw script into top-level statements with a single left-to-right
//! scan. No SQL grammar is involved: the scanner only has to know where a `;`
//! is *not* a statement boundary.
//!
//! ## Lexical States
//!
//! | State | Entered by | Left by |
//! |-------|------------|---------|
//! | `Default` | start, or closing any region | - |
//! | `LineComment` | `--` | newline |
//! | `BlockComment(depth)` | `/*` | matching `*/` (nested depth) |
//! | `Quoted` | `'` (or `E'` with backslash escapes) | lone `'` (`''` stays inside) |
//! | `QuotedIdent` | `"` | lone `"` (`""` stays inside) |
//! | `DollarQuoted(tag)` | `$tag$` / `$$` | the same `$tag$` |
//!
//! Everything is copied verbatim into the current statement, including
//! comments, so the statements can be logged and replayed exactly as written.
//! The same scan backs [`code_only`], which blanks every non-code region so
//! keyword checks only ever see real SQL tokens.
//! Unterminated regions are not errors: the scan runs to end of input and
//! whatever was collected becomes the last statement.

/// Lexer mode threaded through the scan loop.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanState {
    Default,
    LineComment,
    BlockComment { depth: usize },
    Quoted { backslash_escapes: bool },
    QuotedIdent,
    DollarQuoted { tag: String },
}

/// What a run of scanned characters is, lexically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Code,
    Comment,
    Literal,
    Ident,
    /// A top-level `;`.
    Boundary,
}

impl ScanState {
    fn region(&self) -> Region {
        match self {
            ScanState::Default => Region::Code,
            ScanState::LineComment | ScanState::BlockComment { .. } => Region::Comment,
            ScanState::Quoted { .. } | ScanState::DollarQuoted { .. } => Region::Literal,
            ScanState::QuotedIdent => Region::Ident,
        }
    }
}

/// Walk the script once, handing every run of characters to `emit` with the
/// region it belongs to. Openers and closers belong to the region they delimit.
fn scan(chars: &[char], mut emit: impl FnMut(Region, &[char])) {
    let mut state = ScanState::Default;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        let (len, transition) = match &state {
            ScanState::Default => {
                if c == '-' && next == Some('-') {
                    (2, Some(ScanState::LineComment))
                } else if c == '/' && next == Some('*') {
                    (2, Some(ScanState::BlockComment { depth: 1 }))
                } else if c == '\'' {
                    let backslash_escapes = is_escape_string_prefix(chars, i);
                    (1, Some(ScanState::Quoted { backslash_escapes }))
                } else if c == '"' {
                    (1, Some(ScanState::QuotedIdent))
                } else if c == '$' {
                    match dollar_tag_at(chars, i) {
                        Some(tag) => (tag.chars().count() + 2, Some(ScanState::DollarQuoted { tag })),
                        None => (1, None),
                    }
                } else {
                    (1, None)
                }
            }
            ScanState::LineComment => (1, (c == '\n').then_some(ScanState::Default)),
            ScanState::BlockComment { depth } => {
                if c == '/' && next == Some('*') {
                    (2, Some(ScanState::BlockComment { depth: depth + 1 }))
                } else if c == '*' && next == Some('/') {
                    let after = if *depth <= 1 {
                        ScanState::Default
                    } else {
                        ScanState::BlockComment { depth: depth - 1 }
                    };
                    (2, Some(after))
                } else {
                    (1, None)
                }
            }
            ScanState::Quoted { backslash_escapes } => {
                if (*backslash_escapes && c == '\\') || (c == '\'' && next == Some('\'')) {
                    (2, None)
                } else {
                    (1, (c == '\'').then_some(ScanState::Default))
                }
            }
            ScanState::QuotedIdent => {
                if c == '"' && next == Some('"') {
                    (2, None)
                } else {
                    (1, (c == '"').then_some(ScanState::Default))
                }
            }
            ScanState::DollarQuoted { tag } => {
                if c == '$' && closes_dollar_quote(chars, i, tag) {
                    (tag.chars().count() + 2, Some(ScanState::Default))
                } else {
                    (1, None)
                }
            }
        };

        let region = match (&state, &transition) {
            (ScanState::Default, Some(opened)) => opened.region(),
            (ScanState::Default, None) if c == ';' => Region::Boundary,
            (current, _) => current.region(),
        };
        let end = (i + len).min(chars.len());
        emit(region, &chars[i..end]);
        i = end;

        if let Some(s) = transition {
            state = s;
        }
    }
}

/// Split a SQL script into statements at top-level semicolons.
///
/// Returned statements are trimmed and exclude the terminating `;`.
/// Whitespace-only fragments (e.g. `;;`) are dropped, and a trailing
/// statement without a semicolon is still returned.
pub fn split_statements(script: &str) -> Vec<String> {
    let chars: Vec<char> = script.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    scan(&chars, |region, run| match region {
        Region::Boundary => flush(&mut current, &mut statements),
        _ => current.extend(run),
    });
    flush(&mut current, &mut statements);
    statements
}

/// The script with comments, string literals and dollar-quoted bodies
/// blanked to spaces. Quoted identifiers keep their quotes with the name
/// replaced by underscores, so the name still reads as one token. Keyword checks run on
/// this text so that `-- WHERE` or `'drop'` cannot satisfy or trip them.
pub fn code_only(script: &str) -> String {
    let chars: Vec<char> = script.chars().collect();
    let mut out = String::with_capacity(script.len());
    scan(&chars, |region, run| match region {
        Region::Code | Region::Boundary => out.extend(run),
        Region::Ident => out.extend(run.iter().map(|&c| if c == '"' { '"' } else { '_' })),
        Region::Comment | Region::Literal => out.extend(run.iter().map(|&c| if c == '\n' { '\n' } else { ' ' })),
    });
    out
}

/// Push the trimmed accumulator as a statement (if non-empty) and reset it.
fn flush(current: &mut String, statements: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `E'...'` / `e'...'` strings honour backslash escapes, but only when the
/// `E` is a standalone prefix and not the tail of an identifier like `name'`.
fn is_escape_string_prefix(chars: &[char], quote_pos: usize) -> bool {
    if quote_pos == 0 {
        return false;
    }
    let prefix = chars[quote_pos - 1];
    if prefix != 'E' && prefix != 'e' {
        return false;
    }
    quote_pos < 2 || !is_ident_char(chars[quote_pos - 2])
}

/// Try to read a dollar-quote opener (`$$` or `$tag$`) starting at `pos`.
///
/// Returns the tag (possibly empty). Positional parameters such as `$1` and
/// identifiers containing `$` (e.g. `a$b`) are not openers.
fn dollar_tag_at(chars: &[char], pos: usize) -> Option<String> {
    if pos > 0 && (is_ident_char(chars[pos - 1]) || chars[pos - 1] == '$') {
        return None;
    }
    let mut j = pos + 1;
    let first = *chars.get(j)?;
    if first == '$' {
        return Some(String::new());
    }
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    let mut tag = String::new();
    while let Some(&ch) = chars.get(j) {
        if ch == '$' {
            return Some(tag);
        }
        if !is_ident_char(ch) {
            return None;
        }
        tag.push(ch);
        j += 1;
    }
    None
}

/// Does `$tag$` appear at `pos`?
fn closes_dollar_quote(chars: &[char], pos: usize, tag: &str) -> bool {
    let mut j = pos + 1;
    for t in tag.chars() {
        if chars.get(j) != Some(&t) {
            return false;
        }
        j += 1;
    }
    chars.get(j) == Some(&'$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_statements() {
        let stmts = split_statements("SELECT 1; SELECT 2;");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn trailing_statement_without_semicolon_is_kept() {
        let stmts = split_statements("CREATE TABLE a (id int);\nSELECT * FROM a");
        assert_eq!(stmts, vec!["CREATE TABLE a (id int)", "SELECT * FROM a"]);
    }

    #[test]
    fn empty_fragments_are_dropped() {
        assert_eq!(split_statements(";;  ;\n"), Vec::<String>::new());
        assert_eq!(split_statements(""), Vec::<String>::new());
        assert_eq!(split_statements("SELECT 1;;;"), vec!["SELECT 1"]);
    }

    #[test]
    fn line_comment_semicolon_does_not_split() {
        let stmts = split_statements("SELECT 1; -- c;\nSELECT 2;");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "SELECT 1");
        assert!(stmts[1].contains("-- c;"), "comment kept verbatim: {:?}", stmts[1]);
        assert!(stmts[1].ends_with("SELECT 2"));
    }

    #[test]
    fn nested_block_comments() {
        let sql = "SELECT /* outer /* inner; */ still; */ 1; SELECT 2";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "SELECT /* outer /* inner; */ still; */ 1");
    }

    #[test]
    fn dollar_quoted_function_body_is_one_statement() {
        let sql = "CREATE FUNCTION f() RETURNS void AS $$ BEGIN RAISE NOTICE ';'; END; $$ LANGUAGE plpgsql;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].ends_with("LANGUAGE plpgsql"));
    }

    #[test]
    fn tagged_dollar_quote_ignores_other_tags() {
        let sql = "DO $body$ BEGIN PERFORM $x$;$x$; END $body$; SELECT 1";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "DO $body$ BEGIN PERFORM $x$;$x$; END $body$");
    }

    #[test]
    fn positional_parameters_are_not_dollar_quotes() {
        let stmts = split_statements("PREPARE p AS SELECT $1; SELECT 2");
        assert_eq!(stmts, vec!["PREPARE p AS SELECT $1", "SELECT 2"]);
    }

    #[test]
    fn identifier_with_dollar_is_not_an_opener() {
        let stmts = split_statements("SELECT a$b$ FROM t; SELECT 2");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn escaped_single_quote_stays_in_literal() {
        let stmts = split_statements("INSERT INTO t VALUES ('a;b''c');");
        assert_eq!(stmts, vec!["INSERT INTO t VALUES ('a;b''c')"]);
    }

    #[test]
    fn escape_string_backslash_quote() {
        let stmts = split_statements(r"SELECT E'it\'s; fine'; SELECT 2");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], r"SELECT E'it\'s; fine'");
    }

    #[test]
    fn quoted_identifier_semicolon() {
        let stmts = split_statements(r#"CREATE TABLE "odd;name" (id int); SELECT 1"#);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], r#"CREATE TABLE "odd;name" (id int)"#);
    }

    #[test]
    fn unterminated_block_comment_keeps_remainder() {
        let stmts = split_statements("SELECT 1; SELECT /* never closed; SELECT 3");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1], "SELECT /* never closed; SELECT 3");
    }

    #[test]
    fn unterminated_dollar_quote_keeps_remainder() {
        let stmts = split_statements("DO $$ BEGIN; END;");
        assert_eq!(stmts, vec!["DO $$ BEGIN; END;"]);
    }

    #[test]
    fn unmatched_single_quote_is_best_effort() {
        let stmts = split_statements("SELECT 'oops; SELECT 2;");
        assert_eq!(stmts, vec!["SELECT 'oops; SELECT 2;"]);
    }

    #[test]
    fn multibyte_text_is_preserved() {
        let stmts = split_statements("INSERT INTO t VALUES ('héllo; wörld'); SELECT '✓'");
        assert_eq!(stmts[0], "INSERT INTO t VALUES ('héllo; wörld')");
        assert_eq!(stmts[1], "SELECT '✓'");
    }

    #[test]
    fn code_only_blanks_comments_and_literals() {
        let masked = code_only("DELETE FROM t -- WHERE x\n/* where */ WHERE a = 'WHERE' AND b = $$where$$");
        assert_eq!(masked.matches("WHERE").count(), 1);
        assert!(!masked.to_ascii_lowercase().contains("where x"));
        assert!(masked.starts_with("DELETE FROM t"));
    }

    #[test]
    fn code_only_keeps_quoted_identifiers_as_one_token() {
        assert_eq!(code_only(r#"DELETE FROM "where""#), r#"DELETE FROM "_____""#);
    }

    #[test]
    fn code_only_keeps_statement_boundaries() {
        assert_eq!(code_only("SELECT 'a;b'; SELECT 2"), "SELECT      ; SELECT 2");
    }
}

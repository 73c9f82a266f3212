//! # CLI Execution Functions
//!
//! Offline subcommands. Output goes to stdout so it can be piped; logs stay
//! on stderr.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use pgpilot::connection::encrypt_secret;
use pgpilot::sql::{classify, split_statements};

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }
}

/// Annotated SQL or JSON for a script.
pub fn render_split(script: &str, with_classification: bool, as_json: bool) -> Result<String> {
    let statements = split_statements(script);
    if as_json {
        let value = if with_classification {
            serde_json::to_value(statements.iter().map(|s| classify(s)).collect::<Vec<_>>())?
        } else {
            serde_json::to_value(&statements)?
        };
        return Ok(serde_json::to_string_pretty(&value)? + "\n");
    }

    let mut out = String::new();
    for (i, stmt) in statements.iter().enumerate() {
        let mut header = format!("-- [{}]", i + 1);
        if with_classification {
            let c = classify(stmt);
            if c.is_ddl {
                header.push_str(&format!(" {} {}", c.statement_type, c.object_type));
                if let Some(name) = &c.name {
                    match &c.schema {
                        Some(schema) => header.push_str(&format!(" {}.{}", schema, name)),
                        None => header.push_str(&format!(" {}", name)),
                    }
                }
            } else {
                header.push_str(" not DDL");
            }
        }
        out.push_str(&header);
        out.push('\n');
        out.push_str(stmt);
        out.push_str(";\n\n");
    }
    Ok(out)
}

pub fn run_split(path: &Path, with_classification: bool, as_json: bool) -> Result<()> {
    let script = read_input(path)?;
    let rendered = render_split(&script, with_classification, as_json)?;
    std::io::stdout().write_all(rendered.as_bytes())?;
    Ok(())
}

pub fn run_encrypt(connection_string: Option<&str>, key: Option<&str>) -> Result<()> {
    let plaintext = match connection_string.filter(|s| *s != "-") {
        Some(s) => s.to_string(),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };
    let plaintext = plaintext.trim();
    if plaintext.is_empty() {
        anyhow::bail!("connection string is empty");
    }
    let encrypted = encrypt_secret(plaintext, key).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    println!("{}", encrypted);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_output_numbers_statements() {
        let out = render_split("SELECT 1; SELECT 2;", false, false).unwrap();
        assert!(out.contains("-- [1]\nSELECT 1;"));
        assert!(out.contains("-- [2]\nSELECT 2;"));
    }

    #[test]
    fn classified_output_names_ddl_objects() {
        let out = render_split("CREATE TABLE app.users (id int); SELECT 1", true, false).unwrap();
        assert!(out.contains("-- [1] CREATE TABLE app.users"), "{out}");
        assert!(out.contains("-- [2] not DDL"));
    }

    #[test]
    fn json_output_is_an_array() {
        let out = render_split("SELECT 1; SELECT ';'", false, true).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, vec!["SELECT 1".to_string(), "SELECT ';'".to_string()]);
    }
}

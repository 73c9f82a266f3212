//! System prompt assembly.

use serde::Deserialize;
use serde_json::Value;

use super::manifest::ToolManifest;
use super::schema::envelope_description;

const DEFAULT_INTRO: &str = "You are an autonomous PostgreSQL database agent. You work on the \
user's task across several turns: each turn you inspect the database, run the SQL the task \
requires, and record what you learned in your planning journal.";

const DEFAULT_GUIDELINES: &str = "- Inspect before you change: read the schema or definition of \
an object before altering it.\n\
- Prefer execute_sql_batch with wrapInTransaction for multi-step changes so a failure leaves \
nothing half-applied.\n\
- Keep each turn small; check results in the next turn before building on them.\n\
- When the task is done, report status \"completed\" and summarize what changed.";

const DEFAULT_SAFETY: &str = "- Never drop, truncate or bulk-delete data unless the task \
explicitly asks for it.\n\
- DELETE and UPDATE statements must carry a WHERE clause.\n\
- Do not expose credentials or connection details in your replies.";

/// Overridable prompt text. Blank sections fall back to the defaults,
/// except `additional`, which is simply omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptSections {
    pub intro: Option<String>,
    pub guidelines: Option<String>,
    pub safety: Option<String>,
    pub additional: Option<String>,
}

fn pick<'a>(custom: &'a Option<String>, default: &'a str) -> &'a str {
    custom.as_deref().map(str::trim).filter(|s| !s.is_empty()).unwrap_or(default)
}

pub struct PromptInput<'a> {
    pub sections: &'a PromptSections,
    pub manifest: &'a ToolManifest,
    pub project_context: Option<&'a Value>,
    pub expose_project: bool,
    /// Output of `render_journal`, heading included.
    pub journal: &'a str,
}

pub fn build_system_prompt(input: &PromptInput<'_>) -> String {
    let s = input.sections;
    let mut out = String::new();
    out.push_str(pick(&s.intro, DEFAULT_INTRO));
    out.push_str("\n\n## Guidelines\n\n");
    out.push_str(pick(&s.guidelines, DEFAULT_GUIDELINES));
    out.push_str("\n\n## Safety\n\n");
    out.push_str(pick(&s.safety, DEFAULT_SAFETY));

    if input.expose_project {
        if let Some(ctx) = input.project_context.filter(|v| !v.is_null()) {
            out.push_str("\n\n## Project context\n\n");
            match ctx {
                Value::String(text) => out.push_str(text),
                other => out.push_str(&serde_json::to_string_pretty(other).unwrap_or_default()),
            }
        }
    }

    out.push_str("\n\n## Tools\n\n");
    out.push_str(input.manifest.render_docs().trim_end());

    if !input.journal.trim().is_empty() {
        out.push_str("\n\n");
        out.push_str(input.journal.trim_end());
    }

    out.push_str("\n\n## Response format\n\n");
    out.push_str(&envelope_description());

    if let Some(extra) = s.additional.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        out.push_str("\n\n## Additional instructions\n\n");
        out.push_str(extra);
    }
    out
}

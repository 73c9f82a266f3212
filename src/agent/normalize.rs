//! Model reply normalization.
//!
//! Models are asked for one JSON object but return prose around it, fenced
//! code blocks, leaked tool-call markup, or loosely shaped fields. Recovery
//! tries each [`RecoveryStrategy`] in order on the raw text; the first
//! candidate that parses as a JSON object is shaped into an
//! [`AgentResponse`]. If none parses the iteration degrades to
//! `parse_error` instead of failing the request.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::blackboard::EntryType;

/// Raw output kept on a parse failure, in characters.
pub const RAW_OUTPUT_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    InProgress,
    Completed,
    NeedsInput,
    ParseError,
    Aborted,
}

impl AgentStatus {
    /// Model-reported status. Anything unrecognized means keep going.
    pub fn from_model(s: &str) -> AgentStatus {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "completed" | "complete" | "done" => AgentStatus::Completed,
            "needs_input" => AgentStatus::NeedsInput,
            _ => AgentStatus::InProgress,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::InProgress => "in_progress",
            AgentStatus::Completed => "completed",
            AgentStatus::NeedsInput => "needs_input",
            AgentStatus::ParseError => "parse_error",
            AgentStatus::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub op_type: String,
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlackboardNote {
    pub entry_type: EntryType,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResponse {
    pub reasoning: String,
    pub operations: Vec<Operation>,
    pub blackboard_entry: BlackboardNote,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// The whole reply is the object.
    Direct,
    /// Leaked tool-call markup (`<parameter name="...">`, `<invoke>`, special tokens) removed.
    StripArtifacts,
    /// Body of the last fenced code block.
    FencedBlock,
    /// First `{` through last `}` of the reply.
    BraceSpan,
}

impl RecoveryStrategy {
    pub const ORDER: [RecoveryStrategy; 4] = [
        RecoveryStrategy::Direct,
        RecoveryStrategy::StripArtifacts,
        RecoveryStrategy::FencedBlock,
        RecoveryStrategy::BraceSpan,
    ];

    /// Candidate text for this strategy, if it applies at all.
    pub fn candidate(&self, raw: &str) -> Option<String> {
        match self {
            RecoveryStrategy::Direct => Some(raw.trim().to_string()),
            RecoveryStrategy::StripArtifacts => {
                let stripped = artifact_pattern().replace_all(raw, "");
                (stripped.len() != raw.len()).then(|| stripped.trim().to_string())
            }
            RecoveryStrategy::FencedBlock => fence_pattern()
                .captures_iter(raw)
                .last()
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string()),
            RecoveryStrategy::BraceSpan => {
                let start = raw.find('{')?;
                let end = raw.rfind('}')?;
                (end > start).then(|| raw[start..=end].to_string())
            }
        }
    }

    /// Parse this strategy's candidate into a JSON object.
    pub fn attempt(&self, raw: &str) -> Option<Map<String, Value>> {
        let text = self.candidate(raw)?;
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

fn artifact_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)</?(?:parameter|invoke|function_calls|tool_call)(?:\s+name\s*=\s*["'][^"']*["'])?\s*>|<\|[a-z_]+\|>"#,
        )
        .expect("static artifact regex")
    })
}

fn fence_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_-]*[ \t]*\r?\n?([\s\S]*?)```").expect("static fence regex"))
}

fn content_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)["']?content["']?\s*[:=]\s*(.*)$"#).expect("static label regex"))
}

/// Normalize a raw model reply.
pub fn normalize(raw: &str) -> AgentResponse {
    for strategy in RecoveryStrategy::ORDER {
        if let Some(map) = strategy.attempt(raw) {
            if strategy != RecoveryStrategy::Direct {
                tracing::debug!(?strategy, "recovered model reply");
            }
            return shape(map);
        }
    }
    warn!(chars = raw.chars().count(), "model reply is not parseable JSON");
    parse_failure(raw)
}

/// The `parse_error` response for an unparseable reply.
pub fn parse_failure(raw: &str) -> AgentResponse {
    let total = raw.chars().count();
    AgentResponse {
        reasoning: "The model response could not be parsed as JSON.".to_string(),
        operations: Vec::new(),
        blackboard_entry: BlackboardNote {
            entry_type: EntryType::Progress,
            content: format!(
                "Previous response ({} chars) was not valid JSON; no operations were executed.",
                total
            ),
        },
        status: AgentStatus::ParseError,
        raw_output: Some(raw.chars().take(RAW_OUTPUT_LIMIT).collect()),
    }
}

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Shape a parsed object into the strict envelope.
pub fn shape(mut map: Map<String, Value>) -> AgentResponse {
    let reasoning = map.get("reasoning").map(text_of).unwrap_or_default();
    let status = map
        .get("status")
        .and_then(Value::as_str)
        .map(AgentStatus::from_model)
        .unwrap_or(AgentStatus::InProgress);
    let operations = match map.remove("operations") {
        Some(Value::Array(items)) => items.into_iter().filter_map(shape_operation).collect(),
        Some(single @ Value::Object(_)) => shape_operation(single).into_iter().collect(),
        _ => Vec::new(),
    };
    let blackboard_entry = shape_note(map.remove("blackboard_entry"), &reasoning);
    AgentResponse {
        reasoning,
        operations,
        blackboard_entry,
        status,
        raw_output: None,
    }
}

fn shape_operation(v: Value) -> Option<Operation> {
    let Value::Object(mut obj) = v else {
        return None;
    };
    let op_type = ["type", "tool", "name"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty()))?
        .to_string();
    let raw_params = ["params", "parameters", "arguments"]
        .iter()
        .find_map(|k| obj.remove(*k));
    let params = match raw_params {
        Some(Value::Object(p)) => Value::Object(p),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(p)) => Value::Object(p),
            _ => Value::Object(Map::new()),
        },
        _ => Value::Object(Map::new()),
    };
    Some(Operation {
        op_type,
        params,
        result: None,
    })
}

fn shape_note(v: Option<Value>, reasoning: &str) -> BlackboardNote {
    match v {
        // A doubled wrapper: {"blackboard_entry": {"blackboard_entry": {...}}}.
        Some(Value::Object(mut obj)) if obj.len() == 1 && obj.contains_key("blackboard_entry") => {
            shape_note(obj.remove("blackboard_entry"), reasoning)
        }
        Some(Value::Object(obj)) => {
            let entry_type = EntryType::parse_or_progress(
                obj.get("entry_type").or_else(|| obj.get("type")).and_then(Value::as_str),
            );
            let content = match obj.get("content") {
                Some(Value::Object(inner)) => inner.get("content").map(text_of).unwrap_or_else(|| {
                    Value::Object(inner.clone()).to_string()
                }),
                Some(other) => text_of(other),
                None => String::new(),
            };
            BlackboardNote { entry_type, content }
        }
        Some(Value::String(s)) => BlackboardNote {
            entry_type: EntryType::Progress,
            content: content_label()
                .captures(&s)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().trim_matches('"').to_string())
                .unwrap_or_else(|| s.trim().to_string()),
        },
        _ => BlackboardNote {
            entry_type: EntryType::Progress,
            content: reasoning.chars().take(500).collect(),
        },
    }
}

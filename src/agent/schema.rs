//! Structured-output schemas for the agent's reply envelope.
//!
//! Two renderings of the same JSON schema: OpenAI's `response_format`
//! (`json_schema`) and Anthropic's forced tool with an `input_schema`. Both
//! list the enabled operation names in one enum and merge every enabled
//! tool's parameters into a single `params` property map, where the first
//! definition of a name wins.

use serde_json::{json, Map, Value};

use super::blackboard::ENTRY_TYPES;
use super::llm::ModelFamily;
use super::manifest::{ToolManifest, ToolParam};

pub const RESPONSE_TOOL_NAME: &str = "agent_response";

/// Statuses the model may report. `parse_error` and `aborted` are assigned
/// by the service, never by the model.
pub const MODEL_STATUSES: &[&str] = &["in_progress", "completed", "needs_input"];

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseSchema {
    /// Value of the `response_format` request field.
    OpenAi(Value),
    /// `tools: [tool]` plus a `tool_choice` forcing it.
    Anthropic { tool: Value, tool_choice: Value },
}

impl ResponseSchema {
    pub fn for_family(family: ModelFamily, manifest: &ToolManifest) -> Self {
        match family {
            ModelFamily::OpenAi => Self::openai(manifest),
            ModelFamily::Anthropic => Self::anthropic(manifest),
        }
    }

    pub fn openai(manifest: &ToolManifest) -> Self {
        ResponseSchema::OpenAi(json!({
            "type": "json_schema",
            "json_schema": {
                "name": RESPONSE_TOOL_NAME,
                "strict": false,
                "schema": response_json_schema(manifest),
            }
        }))
    }

    pub fn anthropic(manifest: &ToolManifest) -> Self {
        ResponseSchema::Anthropic {
            tool: json!({
                "name": RESPONSE_TOOL_NAME,
                "description": "Report your reasoning, the operations to run next, a planning journal entry and your status.",
                "input_schema": response_json_schema(manifest),
            }),
            tool_choice: json!({"type": "tool", "name": RESPONSE_TOOL_NAME}),
        }
    }

    /// The underlying JSON schema, whichever rendering this is.
    pub fn json_schema(&self) -> Option<&Value> {
        match self {
            ResponseSchema::OpenAi(v) => v.pointer("/json_schema/schema"),
            ResponseSchema::Anthropic { tool, .. } => tool.get("input_schema"),
        }
    }
}

fn param_schema(p: &ToolParam) -> Value {
    let mut schema = match p.param_type.as_str() {
        "array" => json!({
            "type": "array",
            "items": {"anyOf": [{"type": "string"}, {"type": "object"}]}
        }),
        other => json!({"type": other}),
    };
    schema["description"] = Value::String(p.description.clone());
    if let Some(allowed) = &p.allowed {
        schema["enum"] = json!(allowed);
    }
    schema
}

/// Union of enabled tools' parameters. First definition of a name wins.
pub fn merged_params(manifest: &ToolManifest) -> Map<String, Value> {
    let mut props = Map::new();
    for tool in manifest.enabled() {
        for p in &tool.parameters {
            if !props.contains_key(&p.name) {
                props.insert(p.name.clone(), param_schema(p));
            }
        }
    }
    props
}

pub fn response_json_schema(manifest: &ToolManifest) -> Value {
    let entry_types: Vec<&str> = ENTRY_TYPES.iter().map(|e| e.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "reasoning": {
                "type": "string",
                "description": "What you observed and why you chose these operations"
            },
            "operations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": {"type": "string", "enum": manifest.enabled_names()},
                        "params": {"type": "object", "properties": merged_params(manifest)}
                    },
                    "required": ["type", "params"]
                }
            },
            "blackboard_entry": {
                "type": "object",
                "properties": {
                    "entry_type": {"type": "string", "enum": entry_types},
                    "content": {"type": "string"}
                },
                "required": ["entry_type", "content"]
            },
            "status": {"type": "string", "enum": MODEL_STATUSES}
        },
        "required": ["reasoning", "operations", "blackboard_entry", "status"]
    })
}

/// Natural-language description of the envelope, for the system prompt.
pub fn envelope_description() -> String {
    let entry_types: Vec<&str> = ENTRY_TYPES.iter().map(|e| e.as_str()).collect();
    format!(
        "Respond with a single JSON object and nothing else:\n\
         {{\n  \"reasoning\": string,\n  \"operations\": [{{\"type\": <tool name>, \"params\": {{...}}}}],\n  \
         \"blackboard_entry\": {{\"entry_type\": one of [{}], \"content\": string}},\n  \
         \"status\": one of [{}]\n}}\n\
         Use \"completed\" only when the task is fully done, and \"needs_input\" when you cannot proceed without the user.",
        entry_types.join(", "),
        MODEL_STATUSES.join(", ")
    )
}

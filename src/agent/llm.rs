//! Model backends.
//!
//! A backend turns (system prompt, conversation, response schema) into the
//! raw reply text; normalization happens afterwards. Anthropic replies come
//! back as the forced tool's input, OpenAI replies are streamed over SSE and
//! accumulated in full before they are returned. A stream that ends without
//! a terminal event is an error, never a partial reply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::schema::ResponseSchema;
use super::session::MessageRole;
use crate::config::AppConfig;
use crate::error::{AgentError, AgentResult};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Anthropic,
    OpenAi,
}

impl ModelFamily {
    /// Map a model id to its vendor family.
    pub fn for_model(model: &str) -> AgentResult<ModelFamily> {
        let m = model.trim().to_ascii_lowercase();
        if m.starts_with("claude") {
            Ok(ModelFamily::Anthropic)
        } else if m.starts_with("gpt-")
            || m.starts_with("chatgpt-")
            || ["o1", "o3", "o4"].iter().any(|p| m == *p || m.starts_with(&format!("{}-", p)))
        {
            Ok(ModelFamily::OpenAi)
        } else {
            Err(AgentError::validation(format!("Unsupported model '{}'", model)))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub messages: &'a [ChatMessage],
    pub schema: &'a ResponseSchema,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn family(&self) -> ModelFamily;

    async fn complete(&self, request: &CompletionRequest<'_>) -> AgentResult<String>;
}

/// Model id → backend.
pub trait ModelRouter: Send + Sync {
    fn route(&self, model: &str) -> AgentResult<Arc<dyn LlmBackend>>;
}

/// Backends built from process configuration. A family whose key is not
/// configured fails with `configuration_error` when first used.
pub struct ConfiguredRouter {
    anthropic: Option<Arc<dyn LlmBackend>>,
    openai: Option<Arc<dyn LlmBackend>>,
}

impl ConfiguredRouter {
    pub fn from_config(config: &AppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        ConfiguredRouter {
            anthropic: config.anthropic_api_key.as_ref().map(|key| {
                Arc::new(AnthropicBackend::new(
                    client.clone(),
                    config.anthropic_base_url.clone(),
                    key.clone(),
                )) as Arc<dyn LlmBackend>
            }),
            openai: config.openai_api_key.as_ref().map(|key| {
                Arc::new(OpenAiBackend::new(
                    client.clone(),
                    config.openai_base_url.clone(),
                    key.clone(),
                )) as Arc<dyn LlmBackend>
            }),
        }
    }
}

impl ModelRouter for ConfiguredRouter {
    fn route(&self, model: &str) -> AgentResult<Arc<dyn LlmBackend>> {
        match ModelFamily::for_model(model)? {
            ModelFamily::Anthropic => self
                .anthropic
                .clone()
                .ok_or_else(|| AgentError::Configuration("ANTHROPIC_API_KEY is not configured".into())),
            ModelFamily::OpenAi => self
                .openai
                .clone()
                .ok_or_else(|| AgentError::Configuration("OPENAI_API_KEY is not configured".into())),
        }
    }
}

fn upstream(vendor: &str, e: impl std::fmt::Display) -> AgentError {
    AgentError::UpstreamUnavailable(format!("{} request failed: {}", vendor, e))
}

async fn error_body(vendor: &str, res: reqwest::Response) -> AgentError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    warn!(vendor, status = %status, "model API error");
    AgentError::UpstreamUnavailable(format!(
        "{} API error {}: {}",
        vendor,
        status,
        body.chars().take(300).collect::<String>()
    ))
}

// ── Anthropic ───────────────────────────────────────────────────

pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicBackend {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

/// Messages must alternate user/assistant and start with a user turn:
/// consecutive same-role messages are merged, system notes are sent as user
/// text, and a leading assistant turn is dropped.
pub fn alternating_turns(messages: &[ChatMessage]) -> Vec<Value> {
    let mut turns: Vec<(&'static str, String)> = Vec::new();
    for m in messages {
        let role = match m.role {
            MessageRole::Assistant => "assistant",
            MessageRole::User | MessageRole::System => "user",
        };
        if turns.is_empty() && role == "assistant" {
            continue;
        }
        match turns.last_mut() {
            Some((last_role, content)) if *last_role == role => {
                content.push_str("\n\n");
                content.push_str(&m.content);
            }
            _ => turns.push((role, m.content.clone())),
        }
    }
    turns
        .into_iter()
        .map(|(role, content)| json!({"role": role, "content": content}))
        .collect()
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

fn anthropic_reply_text(resp: AnthropicResponse) -> String {
    if let Some(input) = resp
        .content
        .iter()
        .find(|b| b.kind == "tool_use")
        .and_then(|b| b.input.as_ref())
    {
        return input.to_string();
    }
    resp.content
        .into_iter()
        .filter_map(|b| b.text)
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn family(&self) -> ModelFamily {
        ModelFamily::Anthropic
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> AgentResult<String> {
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "system": request.system_prompt,
            "messages": alternating_turns(request.messages),
        });
        if let ResponseSchema::Anthropic { tool, tool_choice } = request.schema {
            body["tools"] = json!([tool]);
            body["tool_choice"] = tool_choice.clone();
        }

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| upstream("Anthropic", e))?;
        if !res.status().is_success() {
            return Err(error_body("Anthropic", res).await);
        }
        let parsed: AnthropicResponse = res.json().await.map_err(|e| upstream("Anthropic", e))?;
        info!(model = request.model, stop_reason = ?parsed.stop_reason, "anthropic reply");
        Ok(anthropic_reply_text(parsed))
    }
}

// ── OpenAI ──────────────────────────────────────────────────────

pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

/// Accumulates `choices[0].delta.content` across SSE events.
///
/// Raw bytes are buffered until an event is complete, since a network chunk
/// may end in the middle of a multibyte character.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    buffer: Vec<u8>,
    content: String,
    finish_reason: Option<String>,
    done: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl SseAccumulator {
    /// Feed raw bytes; complete events are decoded and processed immediately.
    pub fn feed(&mut self, bytes: &[u8]) -> AgentResult<()> {
        self.buffer.extend(bytes.iter().copied().filter(|&b| b != b'\r'));
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
            self.process_event(&decode_event(event)?)?;
        }
        Ok(())
    }

    fn process_event(&mut self, event: &str) -> AgentResult<()> {
        for line in event.lines() {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                self.done = true;
                continue;
            }
            let chunk: StreamChunk = serde_json::from_str(data)
                .map_err(|e| AgentError::UpstreamUnavailable(format!("Malformed stream chunk: {}", e)))?;
            for choice in chunk.choices {
                if let Some(piece) = choice.delta.content {
                    self.content.push_str(&piece);
                }
                if choice.finish_reason.is_some() {
                    self.finish_reason = choice.finish_reason;
                }
            }
        }
        Ok(())
    }

    /// The accumulated reply, or an error if the stream never finished.
    pub fn finish(mut self) -> AgentResult<String> {
        if !self.buffer.trim_ascii().is_empty() {
            let rest = decode_event(std::mem::take(&mut self.buffer))?;
            self.process_event(&rest)?;
        }
        if !self.done && self.finish_reason.is_none() {
            return Err(AgentError::UpstreamUnavailable(
                "Model stream ended before completion".into(),
            ));
        }
        debug!(finish_reason = ?self.finish_reason, chars = self.content.len(), "stream complete");
        Ok(self.content)
    }
}

fn decode_event(event: Vec<u8>) -> AgentResult<String> {
    String::from_utf8(event)
        .map_err(|e| AgentError::UpstreamUnavailable(format!("Stream event is not UTF-8: {}", e)))
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn family(&self) -> ModelFamily {
        ModelFamily::OpenAi
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> AgentResult<String> {
        let mut messages = vec![json!({"role": "system", "content": request.system_prompt})];
        messages.extend(request.messages.iter().map(|m| {
            json!({"role": m.role.as_str(), "content": m.content})
        }));
        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
            "max_completion_tokens": request.max_tokens,
        });
        if let ResponseSchema::OpenAi(format) = request.schema {
            body["response_format"] = format.clone();
        }

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| upstream("OpenAI", e))?;
        if !res.status().is_success() {
            return Err(error_body("OpenAI", res).await);
        }

        let mut acc = SseAccumulator::default();
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| {
                AgentError::UpstreamUnavailable(format!("Model stream interrupted: {}", e))
            })?;
            acc.feed(&bytes)?;
        }
        let text = acc.finish()?;
        info!(model = request.model, chars = text.len(), "openai reply");
        Ok(text)
    }
}

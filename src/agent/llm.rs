//! LLM HTTP client for chat completions with tool calling.
//!
//! Supports two API formats:
//!   - **OpenAI-compatible**: `/chat/completions` (`openai:` models, plus any
//!     endpoint reached through the base-URL override)
//!   - **Claude Native**: `/v1/messages` (`anthropic:` models)
//!
//! The wire format is picked from the model identifier's provider prefix,
//! falling back to name/endpoint heuristics for bare identifiers.

use crate::error::AgentError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::types::{parse_claude_tool_calls, ChatMessage, ToolCall, ToolDefinition};

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";
const CLAUDE_DEFAULT_BASE: &str = "https://api.anthropic.com";

/// Max output tokens per completion.
const MAX_TOKENS: usize = 4096;

/// Supported LLM tool formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFormat {
    OpenAI,
    Claude,
}

/// Detect the API format from the model identifier and endpoint override.
pub fn detect_tool_format(model: &str, base_url: Option<&str>) -> ToolFormat {
    let model_lower = model.to_lowercase();
    if model_lower.starts_with("openai:") {
        return ToolFormat::OpenAI;
    }
    if model_lower.starts_with("anthropic:") || model_lower.starts_with("claude") {
        return ToolFormat::Claude;
    }
    let base_lower = base_url.unwrap_or("").to_lowercase();
    if base_lower.contains("anthropic") || model_lower.contains("claude") {
        ToolFormat::Claude
    } else {
        ToolFormat::OpenAI
    }
}

/// Strip a `provider:` prefix from the model identifier.
pub fn model_name(model: &str) -> &str {
    model
        .split_once(':')
        .map(|(_, name)| name)
        .unwrap_or(model)
}

/// LLM client supporting both OpenAI and Claude API formats.
pub struct LlmClient {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: String,
}

impl LlmClient {
    pub fn new(base_url: Option<&str>, api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            base_url: base_url.map(|b| b.trim_end_matches('/').to_string()),
            api_key: api_key.to_string(),
        }
    }

    /// One chat completion call (auto-routes based on the model identifier).
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatCompletionResponse, AgentError> {
        match detect_tool_format(model, self.base_url.as_deref()) {
            ToolFormat::Claude => self.claude_chat_completion(model, messages, tools).await,
            ToolFormat::OpenAI => self.openai_chat_completion(model, messages, tools).await,
        }
    }

    // ─── OpenAI-compatible API ──────────────────────────────────────────────

    async fn openai_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatCompletionResponse, AgentError> {
        let base = self.base_url.as_deref().unwrap_or(OPENAI_DEFAULT_BASE);
        let url = format!("{}/chat/completions", base);

        let mut body = json!({
            "model": model_name(model),
            "max_tokens": MAX_TOKENS,
            "messages": messages,
        });
        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = serde_json::to_value(tools)
                    .map_err(|e| AgentError::ModelInvocation(e.to_string()))?;
            }
        }

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::ModelInvocation(format!("LLM API request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(AgentError::ModelInvocation(format!(
                "LLM API error ({}): {}",
                status, body_text
            )));
        }

        resp.json().await.map_err(|e| {
            AgentError::ModelInvocation(format!("failed to parse LLM API response: {}", e))
        })
    }

    // ─── Claude Native API (Anthropic Messages API) ─────────────────────────

    async fn claude_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatCompletionResponse, AgentError> {
        let base = self.base_url.as_deref().unwrap_or(CLAUDE_DEFAULT_BASE);
        let url = format!("{}/v1/messages", base.trim_end_matches("/v1"));

        let (system_prompt, claude_messages) = convert_messages_for_claude(messages);

        let mut body = json!({
            "model": model_name(model),
            "max_tokens": MAX_TOKENS,
            "messages": claude_messages,
        });
        if let Some(system) = &system_prompt {
            body["system"] = json!(system);
        }
        if let Some(tools) = tools {
            if !tools.is_empty() {
                let claude_tools: Vec<Value> =
                    tools.iter().map(|t| t.to_claude_format()).collect();
                body["tools"] = json!(claude_tools);
            }
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AgentError::ModelInvocation(format!("Claude API request failed: {}", e))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(AgentError::ModelInvocation(format!(
                "Claude API error ({}): {}",
                status, body_text
            )));
        }

        let response: Value = resp.json().await.map_err(|e| {
            AgentError::ModelInvocation(format!("failed to parse Claude response: {}", e))
        })?;
        convert_claude_response(response, model)
    }
}

/// Convert OpenAI-format messages to Claude Messages API format.
/// Claude differences:
///   - System prompt is a separate `system` field (not a message)
///   - Tool results are user messages with `tool_result` content blocks
///   - No role="tool" messages
fn convert_messages_for_claude(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let mut system_prompt = None;
    let mut claude_messages: Vec<Value> = Vec::new();

    // Collect pending tool results to batch into a single user message
    let mut pending_tool_results: Vec<Value> = Vec::new();

    for msg in messages {
        if msg.role != "tool" && !pending_tool_results.is_empty() {
            claude_messages.push(json!({
                "role": "user",
                "content": pending_tool_results.clone()
            }));
            pending_tool_results.clear();
        }

        match msg.role.as_str() {
            "system" => {
                if let Some(ref content) = msg.content {
                    system_prompt = Some(match system_prompt {
                        Some(existing) => format!("{}\n\n{}", existing, content),
                        None => content.clone(),
                    });
                }
            }
            "user" => {
                claude_messages.push(json!({
                    "role": "user",
                    "content": msg.content.as_deref().unwrap_or("")
                }));
            }
            "assistant" => {
                let mut content_blocks: Vec<Value> = Vec::new();
                if let Some(ref text) = msg.content {
                    if !text.is_empty() {
                        content_blocks.push(json!({ "type": "text", "text": text }));
                    }
                }
                if let Some(ref tool_calls) = msg.tool_calls {
                    for tc in tool_calls {
                        let input: Value =
                            serde_json::from_str(&tc.function.arguments).unwrap_or(json!({}));
                        content_blocks.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.function.name,
                            "input": input
                        }));
                    }
                }
                if !content_blocks.is_empty() {
                    claude_messages.push(json!({
                        "role": "assistant",
                        "content": content_blocks
                    }));
                }
            }
            "tool" => {
                let tool_call_id = msg.tool_call_id.as_deref().unwrap_or("");
                pending_tool_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": msg.content.as_deref().unwrap_or("")
                }));
            }
            _ => {}
        }
    }

    if !pending_tool_results.is_empty() {
        claude_messages.push(json!({
            "role": "user",
            "content": pending_tool_results
        }));
    }

    (system_prompt, claude_messages)
}

/// Convert a Claude response into the unified format.
fn convert_claude_response(
    response: Value,
    model: &str,
) -> Result<ChatCompletionResponse, AgentError> {
    let content_blocks = response
        .get("content")
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default();

    let text: String = content_blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    let tool_calls = parse_claude_tool_calls(&content_blocks);

    let stop_reason = response
        .get("stop_reason")
        .and_then(|s| s.as_str())
        .map(str::to_string);

    Ok(ChatCompletionResponse {
        id: response
            .get("id")
            .and_then(|i| i.as_str())
            .unwrap_or("")
            .to_string(),
        model: model_name(model).to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_string(),
                content: if text.is_empty() { None } else { Some(text) },
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
            },
            finish_reason: stop_reason,
        }],
        usage: None,
    })
}

// ─── Unified response types ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize, Serialize)]
#[allow(dead_code)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_prefix_picks_the_format() {
        assert_eq!(
            detect_tool_format("openai:gpt-4o-mini", None),
            ToolFormat::OpenAI
        );
        assert_eq!(
            detect_tool_format("anthropic:claude-sonnet-4-5", None),
            ToolFormat::Claude
        );
        assert_eq!(detect_tool_format("claude-3-5-haiku", None), ToolFormat::Claude);
        assert_eq!(detect_tool_format("gpt-4o", None), ToolFormat::OpenAI);
        assert_eq!(
            detect_tool_format("some-model", Some("https://gateway.anthropic.com")),
            ToolFormat::Claude
        );
    }

    #[test]
    fn model_name_strips_the_provider_prefix() {
        assert_eq!(model_name("openai:gpt-4o-mini"), "gpt-4o-mini");
        assert_eq!(model_name("gpt-4o"), "gpt-4o");
    }

    #[test]
    fn claude_conversion_extracts_system_and_batches_tool_results() {
        let messages = vec![
            ChatMessage::system("You are a trading assistant."),
            ChatMessage::user("show my positions"),
            ChatMessage::assistant_with_tool_calls(
                None,
                vec![ToolCall {
                    id: "tu_1".to_string(),
                    call_type: "function".to_string(),
                    function: crate::agent::types::FunctionCall {
                        name: "get_positions".to_string(),
                        arguments: "{}".to_string(),
                    },
                }],
            ),
            ChatMessage::tool_result("tu_1", "AAPL 100 shares"),
            ChatMessage::tool_result("tu_1b", "SPY -1 put"),
        ];

        let (system, converted) = convert_messages_for_claude(&messages);
        assert_eq!(system.as_deref(), Some("You are a trading assistant."));
        // user, assistant(tool_use), batched tool results
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[2]["role"], "user");
        assert_eq!(converted[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(converted[2]["content"][0]["type"], "tool_result");
    }

    #[test]
    fn claude_response_converts_to_unified_shape() {
        let raw = json!({
            "id": "msg_01",
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "tu_1", "name": "get_positions", "input": {}}
            ]
        });
        let resp = convert_claude_response(raw, "anthropic:claude-sonnet-4-5").unwrap();
        let choice = &resp.choices[0];
        assert_eq!(choice.message.content.as_deref(), Some("Let me check."));
        let calls = choice.message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "get_positions");
        assert_eq!(choice.finish_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn openai_response_deserializes() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "You hold two positions.",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let resp: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            resp.choices[0].message.content.as_deref(),
            Some("You hold two positions.")
        );
        assert_eq!(resp.usage.as_ref().unwrap().total_tokens, 15);
    }
}

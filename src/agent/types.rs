//! Shared types for the agent module.

use crate::provider::ToolDescriptor;
use serde::{Deserialize, Serialize};

/// Truncate a string at a safe UTF-8 char boundary (from the start).
/// Returns a &str of at most `max_bytes` bytes, never splitting a multi-byte
/// character.
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ─── Chat messages ──────────────────────────────────────────────────────────

/// A chat message in OpenAI format. Conversation State is an ordered
/// sequence of these, owned by the loop and threaded through each turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_with_tool_calls(content: Option<&str>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.map(|s| s.to_string()),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        }
    }
}

/// A tool call from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

// ─── Tool definitions ───────────────────────────────────────────────────────

/// OpenAI-compatible tool definition handed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Build from a provider tool descriptor.
    pub fn from_descriptor(descriptor: &ToolDescriptor) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDef {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                parameters: descriptor.input_schema.clone(),
            },
        }
    }

    /// Convert to Claude API format: { name, description, input_schema }.
    pub fn to_claude_format(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.function.name,
            "description": self.function.description,
            "input_schema": self.function.parameters
        })
    }
}

/// Parse tool calls from a Claude native API response.
/// Claude returns content blocks with type "tool_use".
pub fn parse_claude_tool_calls(content_blocks: &[serde_json::Value]) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    for block in content_blocks {
        if block.get("type").and_then(|v| v.as_str()) == Some("tool_use") {
            let id = block
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let name = block
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let input = block.get("input").cloned().unwrap_or(serde_json::json!({}));
            let arguments = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());

            calls.push(ToolCall {
                id,
                call_type: "function".to_string(),
                function: FunctionCall { name, arguments },
            });
        }
    }
    calls
}

// ─── Turn results ───────────────────────────────────────────────────────────

/// One tool invocation performed during a turn, in occurrence order.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: String,
    pub is_error: bool,
}

/// The complete result of one logical turn.
///
/// `state` is the prior Conversation State plus this turn's records; the
/// caller replaces its carried state with it only on success.
#[derive(Debug)]
pub struct TurnResult {
    pub output: String,
    pub state: Vec<ChatMessage>,
    pub invocations: Vec<ToolInvocation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn safe_truncate_respects_char_boundaries() {
        let s = "ΔΘΛ";
        let t = safe_truncate(s, 3);
        assert!(s.starts_with(t));
        assert!(t.len() <= 3);
    }

    #[test]
    fn tool_definition_round_trips_a_descriptor() {
        let descriptor = ToolDescriptor {
            name: "get_quote".to_string(),
            description: "Quote a symbol".to_string(),
            input_schema: json!({"type": "object", "properties": {"symbol": {"type": "string"}}}),
        };
        let def = ToolDefinition::from_descriptor(&descriptor);
        assert_eq!(def.tool_type, "function");
        assert_eq!(def.function.name, "get_quote");

        let claude = def.to_claude_format();
        assert_eq!(claude["name"], "get_quote");
        assert_eq!(claude["input_schema"]["type"], "object");
    }

    #[test]
    fn claude_tool_use_blocks_become_tool_calls() {
        let blocks = vec![
            json!({"type": "text", "text": "checking"}),
            json!({
                "type": "tool_use",
                "id": "tu_1",
                "name": "get_positions",
                "input": {}
            }),
        ];
        let calls = parse_claude_tool_calls(&blocks);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "tu_1");
        assert_eq!(calls[0].function.name, "get_positions");
        assert_eq!(calls[0].function.arguments, "{}");
    }

    #[test]
    fn tool_result_message_links_back_to_its_call() {
        let msg = ChatMessage::tool_result("call_9", "AAPL 100 shares");
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_9"));
    }
}

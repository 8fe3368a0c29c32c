//! Tool-Provider Connector.
//!
//! Owns the channel to the external tool server and presents its declared
//! operations as callable tools. Local mode spawns the server as a
//! subprocess and drives the standard JSON-RPC lifecycle over its stdio
//! pipe:
//!
//!   1. `initialize` → server capabilities
//!   2. `notifications/initialized`
//!   3. `tools/list` → tool catalog (enumerated once, reused every turn)
//!   4. `tools/call` → per-invocation request/response
//!
//! Connector failures surface as a single `ProviderUnavailable`; retry
//! policy, if any, belongs to the caller.

pub mod process;
pub mod rpc;

use crate::config::ProviderConfig;
use crate::error::AgentError;
use process::ProviderProcess;
use rpc::{RpcClient, RpcFailure};
use serde_json::{json, Value};

/// One declared tool: name, human description, and its input schema.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Result of one tool invocation.
///
/// `is_error` marks a tool-level failure: the channel is fine, the call
/// itself went wrong. That distinction lets the session feed the failure
/// back to the model instead of tearing the conversation down.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

pub struct ToolProvider {
    process: ProviderProcess,
    rpc: RpcClient,
    tools: Vec<ToolDescriptor>,
}

impl ToolProvider {
    /// Spawn the tool server and complete the handshake + catalog
    /// enumeration under the configured startup timeout.
    pub async fn connect(config: &ProviderConfig) -> Result<Self, AgentError> {
        let mut process = ProviderProcess::spawn(config)?;
        let (stdin, stdout) = process.take_io()?;
        let rpc = RpcClient::new(stdout, stdin);

        let tools = match tokio::time::timeout(config.startup_timeout, handshake(&rpc)).await
        {
            Ok(Ok(tools)) => tools,
            Ok(Err(e)) => {
                process.terminate().await;
                return Err(e);
            }
            Err(_) => {
                process.terminate().await;
                return Err(AgentError::ProviderUnavailable(format!(
                    "provider startup timed out after {:?}",
                    config.startup_timeout
                )));
            }
        };

        tracing::info!(tool_count = tools.len(), "tool provider ready");
        Ok(Self {
            process,
            rpc,
            tools,
        })
    }

    /// The tool catalog enumerated during `connect`.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Invoke one tool.
    ///
    /// A JSON-RPC error response is mapped to an error-flagged outcome (the
    /// call failed, the channel did not); only transport loss is fatal.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutcome, AgentError> {
        let params = json!({ "name": name, "arguments": arguments });
        match self.rpc.request("tools/call", params).await {
            Ok(result) => Ok(parse_tool_result(&result)),
            Err(RpcFailure::Remote { message, .. }) => Ok(ToolOutcome {
                content: format!("Error: {}", message),
                is_error: true,
            }),
            Err(RpcFailure::Transport(msg)) => Err(AgentError::ProviderUnavailable(msg)),
        }
    }

    /// Orderly release of the subprocess. Abnormal exit paths are covered by
    /// `kill_on_drop` on the child.
    pub async fn close(mut self) {
        self.process.terminate().await;
    }
}

/// Initialize, acknowledge, and enumerate the tool catalog.
async fn handshake(rpc: &RpcClient) -> Result<Vec<ToolDescriptor>, AgentError> {
    rpc.request(
        "initialize",
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "tastychat",
                "version": env!("CARGO_PKG_VERSION"),
            },
        }),
    )
    .await
    .map_err(|e| AgentError::ProviderUnavailable(format!("initialize failed: {}", e)))?;

    rpc.notify("notifications/initialized", json!({}))
        .await
        .map_err(|e| AgentError::ProviderUnavailable(format!("initialized ack failed: {}", e)))?;

    let listed = rpc
        .request("tools/list", json!({}))
        .await
        .map_err(|e| AgentError::ProviderUnavailable(format!("tools/list failed: {}", e)))?;

    let tools = listed
        .get("tools")
        .and_then(|t| t.as_array())
        .ok_or_else(|| {
            AgentError::ProviderUnavailable("tools/list returned no tool array".to_string())
        })?
        .iter()
        .filter_map(parse_tool_descriptor)
        .collect();

    Ok(tools)
}

fn parse_tool_descriptor(tool: &Value) -> Option<ToolDescriptor> {
    let name = tool.get("name").and_then(|n| n.as_str())?;
    Some(ToolDescriptor {
        name: name.to_string(),
        description: tool
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("")
            .to_string(),
        input_schema: tool
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
    })
}

/// Flatten a `tools/call` result into text: concatenate the `content` text
/// blocks, carrying the `isError` flag through.
fn parse_tool_result(result: &Value) -> ToolOutcome {
    let is_error = result
        .get("isError")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let content = result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| result.to_string());

    ToolOutcome { content, is_error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// Scripted tool server speaking the stdio protocol over an in-memory
    /// pipe: answers initialize, swallows the initialized notification, and
    /// serves tools/list and tools/call.
    async fn scripted_server(stream: tokio::io::DuplexStream) {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let frame: Value = serde_json::from_str(&line).unwrap();
            let method = frame["method"].as_str().unwrap_or("");
            let id = frame.get("id").cloned();
            let reply = match method {
                "initialize" => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "protocolVersion": "2024-11-05",
                        "serverInfo": {"name": "scripted", "version": "0.0.0"},
                        "capabilities": {"tools": {}}
                    }
                }),
                "notifications/initialized" => continue,
                "tools/list" => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {"tools": [
                        {
                            "name": "get_positions",
                            "description": "List open positions",
                            "inputSchema": {"type": "object", "properties": {}}
                        },
                        {
                            "name": "get_quote",
                            "description": "Quote a symbol",
                            "inputSchema": {
                                "type": "object",
                                "properties": {"symbol": {"type": "string"}},
                                "required": ["symbol"]
                            }
                        }
                    ]}
                }),
                "tools/call" => {
                    let name = frame["params"]["name"].as_str().unwrap_or("");
                    if name == "get_positions" {
                        json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {
                                "content": [
                                    {"type": "text", "text": "AAPL 100 shares"},
                                    {"type": "text", "text": "SPY -1 put"}
                                ],
                                "isError": false
                            }
                        })
                    } else {
                        json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {
                                "content": [{"type": "text", "text": "no such symbol"}],
                                "isError": true
                            }
                        })
                    }
                }
                _ => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32601, "message": format!("Method not found: {}", method)}
                }),
            };
            write_half
                .write_all(format!("{}\n", reply).as_bytes())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn handshake_enumerates_the_tool_catalog() {
        let (client_io, server_io) = duplex(16 * 1024);
        let server = tokio::spawn(scripted_server(server_io));
        let (read_half, write_half) = tokio::io::split(client_io);
        let rpc = RpcClient::new(read_half, write_half);

        let tools = handshake(&rpc).await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "get_positions");
        assert_eq!(tools[1].name, "get_quote");
        assert_eq!(tools[1].input_schema["required"][0], "symbol");

        drop(rpc);
        server.abort();
    }

    #[tokio::test]
    async fn tool_result_text_blocks_are_joined() {
        let outcome = parse_tool_result(&json!({
            "content": [
                {"type": "text", "text": "AAPL 100 shares"},
                {"type": "text", "text": "SPY -1 put"}
            ],
            "isError": false
        }));
        assert_eq!(outcome.content, "AAPL 100 shares\nSPY -1 put");
        assert!(!outcome.is_error);
    }

    #[tokio::test]
    async fn error_flag_carries_through() {
        let outcome = parse_tool_result(&json!({
            "content": [{"type": "text", "text": "no such symbol"}],
            "isError": true
        }));
        assert!(outcome.is_error);
        assert_eq!(outcome.content, "no such symbol");
    }

    #[tokio::test]
    async fn textless_result_falls_back_to_raw_json() {
        let outcome = parse_tool_result(&json!({"ok": true}));
        assert!(outcome.content.contains("ok"));
        assert!(!outcome.is_error);
    }
}

//! Agent session: one model + instruction + tool-set binding, one logical
//! turn per `run` call.
//!
//! A turn is atomic from the caller's point of view. `run` works on a copy
//! of the prior Conversation State and only hands the extended state back on
//! success; on failure the copy dies with the error and the caller retries
//! later from its last known-good state.

use crate::config::SessionConfig;
use crate::error::AgentError;
use crate::provider::{ToolOutcome, ToolProvider};
use serde_json::Value;

use super::llm::LlmClient;
use super::types::{safe_truncate, ChatMessage, ToolDefinition, ToolInvocation, TurnResult};

pub struct AgentSession {
    llm: LlmClient,
    model: String,
    instructions: String,
    provider: ToolProvider,
    tools: Vec<ToolDefinition>,
    max_iterations: usize,
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("model", &self.model)
            .field("tools", &self.tools)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

impl AgentSession {
    /// Connect the tool provider and bind it with the model and composed
    /// instructions. Constructed once per process; the provider lives as
    /// long as the session.
    pub async fn open(config: &SessionConfig, instructions: String) -> Result<Self, AgentError> {
        if config.llm.api_key.is_empty() {
            return Err(AgentError::Configuration(
                "missing API key for the configured model (set OPENAI_API_KEY or ANTHROPIC_API_KEY)"
                    .to_string(),
            ));
        }

        let provider = ToolProvider::connect(&config.provider).await?;
        let tools = provider
            .tools()
            .iter()
            .map(ToolDefinition::from_descriptor)
            .collect();

        tracing::info!(model = %config.llm.model, "agent session created");
        Ok(Self {
            llm: LlmClient::new(config.llm.base_url.as_deref(), &config.llm.api_key),
            model: config.llm.model.clone(),
            instructions,
            provider,
            tools,
            max_iterations: config.max_iterations,
        })
    }

    /// Execute one logical turn: model call, any number of tool invocations,
    /// final output text.
    pub async fn run(
        &self,
        user_text: &str,
        prior_state: &[ChatMessage],
    ) -> Result<TurnResult, AgentError> {
        // Working copy: the caller's state is never touched.
        let mut state: Vec<ChatMessage> = prior_state.to_vec();
        state.push(ChatMessage::user(user_text));

        let mut invocations: Vec<ToolInvocation> = Vec::new();
        let mut last_text: Option<String> = None;

        let tools_ref = if self.tools.is_empty() {
            None
        } else {
            Some(self.tools.as_slice())
        };

        for _ in 0..self.max_iterations {
            let mut request = Vec::with_capacity(state.len() + 1);
            request.push(ChatMessage::system(&self.instructions));
            request.extend_from_slice(&state);

            let response = self
                .llm
                .chat_completion(&self.model, &request, tools_ref)
                .await?;

            let choice = response.choices.into_iter().next().ok_or_else(|| {
                AgentError::ModelInvocation("no choices in LLM response".to_string())
            })?;

            let assistant_content = choice.message.content;
            let tool_calls = choice.message.tool_calls.unwrap_or_default();

            if tool_calls.is_empty() {
                let output = assistant_content.unwrap_or_default();
                state.push(ChatMessage::assistant(&output));
                return Ok(TurnResult {
                    output,
                    state,
                    invocations,
                });
            }

            state.push(ChatMessage::assistant_with_tool_calls(
                assistant_content.as_deref(),
                tool_calls.clone(),
            ));
            if assistant_content.is_some() {
                last_text = assistant_content;
            }

            for tc in &tool_calls {
                tracing::debug!(
                    tool = %tc.function.name,
                    args = %safe_truncate(&tc.function.arguments, 200),
                    "invoking tool"
                );

                let outcome = match serde_json::from_str::<Value>(&tc.function.arguments) {
                    Ok(arguments) => {
                        self.provider.call_tool(&tc.function.name, arguments).await?
                    }
                    Err(e) => {
                        let err = AgentError::ToolInvocation(format!(
                            "invalid arguments for {}: {}",
                            tc.function.name, e
                        ));
                        tracing::warn!("{}", err);
                        ToolOutcome {
                            content: format!("Error: {}", err),
                            is_error: true,
                        }
                    }
                };
                if outcome.is_error {
                    // Surfaced into the model's context, not raised: the
                    // model can adapt or explain the failure to the user.
                    tracing::warn!(tool = %tc.function.name, "tool returned an error");
                }

                invocations.push(ToolInvocation {
                    name: tc.function.name.clone(),
                    arguments: tc.function.arguments.clone(),
                    is_error: outcome.is_error,
                });
                state.push(ChatMessage::tool_result(&tc.id, &outcome.content));
            }
        }

        // Iteration cap: the exchange happened, so it stays in history; the
        // last assistant text stands in for a final answer.
        tracing::warn!(max_iterations = self.max_iterations, "turn hit iteration cap");
        let output = last_text.unwrap_or_else(|| "[no response]".to_string());
        state.push(ChatMessage::assistant(&output));
        Ok(TurnResult {
            output,
            state,
            invocations,
        })
    }

    /// Release the session: tears down the tool provider. Dropping the
    /// session without calling this still kills the subprocess.
    pub async fn close(self) {
        self.provider.close().await;
        tracing::info!("agent session closed");
    }
}

//! Error taxonomy for the agent session and its collaborators.
//!
//! Startup-time configuration problems and connector failures are fatal;
//! model and tool failures are per-turn and the chat loop keeps going.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Required configuration is missing or invalid. Fatal at startup,
    /// before any session exists.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The tool-provider channel could not be established or has died.
    /// Fatal to the session; the caller decides whether to restart.
    #[error("tool provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The model endpoint rejected or failed the request. The turn is lost
    /// but the session (and its carried state) survives.
    #[error("model invocation failed: {0}")]
    ModelInvocation(String),

    /// A specific tool call failed. By policy this is surfaced into the
    /// model's context rather than raised to the loop; it only appears as
    /// an `Err` when a tool result cannot even be represented.
    #[error("tool invocation failed: {0}")]
    ToolInvocation(String),
}

impl AgentError {
    /// Whether the session can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::ModelInvocation(_) | AgentError::ToolInvocation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_and_configuration_errors_are_fatal() {
        assert!(!AgentError::ProviderUnavailable("gone".into()).is_recoverable());
        assert!(!AgentError::Configuration("missing".into()).is_recoverable());
    }

    #[test]
    fn per_turn_errors_are_recoverable() {
        assert!(AgentError::ModelInvocation("503".into()).is_recoverable());
        assert!(AgentError::ToolInvocation("bad args".into()).is_recoverable());
    }
}

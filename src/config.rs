//! Configuration for tastychat.
//!
//! All configuration is read from environment variables or CLI arguments.
//! No global configuration file is used; a `.env` in the working directory
//! is loaded once (without overriding already-set variables).
//!
//! Environment variable keys are centralized here for consistency.

use crate::error::AgentError;
use std::time::Duration;

/// Environment variable key constants.
/// Use these when reading env vars to avoid typos and enable refactoring.
pub mod env_keys {
    // ─── Model endpoint ─────────────────────────────────────────────────────
    pub const MODEL_IDENTIFIER: &str = "MODEL_IDENTIFIER";
    pub const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

    // ─── Prompt ─────────────────────────────────────────────────────────────
    pub const AGENT_CUSTOM_RULES: &str = "AGENT_CUSTOM_RULES";

    // ─── Tool-provider credentials (consumed by the subprocess) ─────────────
    pub const TASTYTRADE_CLIENT_SECRET: &str = "TASTYTRADE_CLIENT_SECRET";
    pub const TASTYTRADE_REFRESH_TOKEN: &str = "TASTYTRADE_REFRESH_TOKEN";
    pub const TASTYTRADE_ACCOUNT_ID: &str = "TASTYTRADE_ACCOUNT_ID";

    // ─── Tastychat knobs ────────────────────────────────────────────────────
    pub const PROVIDER_COMMAND: &str = "TASTYCHAT_PROVIDER_COMMAND";
    pub const PROVIDER_TIMEOUT_SECS: &str = "TASTYCHAT_PROVIDER_TIMEOUT_SECS";
    pub const MAX_ITERATIONS: &str = "TASTYCHAT_MAX_ITERATIONS";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const LOG_JSON: &str = "TASTYCHAT_LOG_JSON";
}

/// Load `.env` from the current directory into the process environment.
/// Existing variables win. Safe to call more than once.
pub fn load_dotenv() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = dotenvy::dotenv();
    });
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_optional(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_optional(key) {
        Some(v) => !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"),
        None => default,
    }
}

// ─── Model endpoint configuration ───────────────────────────────────────────

/// LLM endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier in `provider:name` form (e.g. "openai:gpt-4o-mini").
    pub model: String,
    /// Optional endpoint override for OpenAI-compatible APIs.
    pub base_url: Option<String>,
    /// API key for the selected endpoint.
    pub api_key: String,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        let model = env_or(env_keys::MODEL_IDENTIFIER, "openai:gpt-4o-mini");
        let base_url = env_optional(env_keys::OPENAI_BASE_URL);
        // The Anthropic key only applies to anthropic:/claude models; the
        // OpenAI key is the default for everything else.
        let api_key = if model.starts_with("anthropic:") || model.contains("claude") {
            env_or(env_keys::ANTHROPIC_API_KEY, "")
        } else {
            env_or(env_keys::OPENAI_API_KEY, "")
        };
        Self {
            model,
            base_url,
            api_key,
        }
    }
}

// ─── Tool-provider configuration ────────────────────────────────────────────

/// How to reach the external tool server.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Program to spawn.
    pub command: String,
    /// Arguments for the program.
    pub args: Vec<String>,
    /// Bound on spawn + handshake + catalog enumeration.
    pub startup_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            command: "uv".to_string(),
            args: vec![
                "run".to_string(),
                "tasty-agent".to_string(),
                "stdio".to_string(),
            ],
            startup_timeout: Duration::from_secs(60),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        let mut cfg = match env_optional(env_keys::PROVIDER_COMMAND) {
            Some(cmdline) => match parse_command_line(&cmdline) {
                Some((command, args)) => Self {
                    command,
                    args,
                    ..Default::default()
                },
                None => Self::default(),
            },
            None => Self::default(),
        };
        cfg.startup_timeout =
            Duration::from_secs(env_u64(env_keys::PROVIDER_TIMEOUT_SECS, 60));
        cfg
    }
}

/// Split a whitespace-separated command line into program + args.
/// Returns `None` for a blank line. No quoting support; the provider
/// command is a fixed short invocation, not a shell script.
fn parse_command_line(line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = line.split_whitespace().map(str::to_string);
    let command = parts.next()?;
    Some((command, parts.collect()))
}

// ─── Session configuration ──────────────────────────────────────────────────

/// Everything a chat session needs, assembled once at startup.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub llm: LlmConfig,
    pub provider: ProviderConfig,
    /// Policy fragment spliced into the system prompt.
    pub custom_rules: Option<String>,
    /// Per-turn bound on the model ↔ tool cycle.
    pub max_iterations: usize,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            llm: LlmConfig::from_env(),
            provider: ProviderConfig::from_env(),
            custom_rules: env_optional(env_keys::AGENT_CUSTOM_RULES),
            max_iterations: env_u64(env_keys::MAX_ITERATIONS, 20) as usize,
        }
    }
}

// ─── Tool-server credentials ────────────────────────────────────────────────

/// OAuth credentials consumed by the tool-provider subprocess.
/// Host mode refuses to bind without them.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub account_id: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            client_secret: env_optional(env_keys::TASTYTRADE_CLIENT_SECRET),
            refresh_token: env_optional(env_keys::TASTYTRADE_REFRESH_TOKEN),
            account_id: env_optional(env_keys::TASTYTRADE_ACCOUNT_ID),
        }
    }

    /// Require both OAuth values to be present.
    pub fn validate(&self) -> Result<(), AgentError> {
        let mut missing = Vec::new();
        if self.client_secret.is_none() {
            missing.push(env_keys::TASTYTRADE_CLIENT_SECRET);
        }
        if self.refresh_token.is_none() {
            missing.push(env_keys::TASTYTRADE_REFRESH_TOKEN);
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Configuration(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )))
        }
    }
}

// ─── Observability configuration ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            log_level: env_or(env_keys::LOG_LEVEL, "info").to_lowercase(),
            log_json: env_bool(env_keys::LOG_JSON, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_splits_program_and_args() {
        let (cmd, args) = parse_command_line("uv run tasty-agent stdio").unwrap();
        assert_eq!(cmd, "uv");
        assert_eq!(args, vec!["run", "tasty-agent", "stdio"]);
    }

    #[test]
    fn blank_command_line_is_rejected() {
        assert!(parse_command_line("   ").is_none());
    }

    #[test]
    fn default_provider_command_is_the_tasty_agent_stdio_server() {
        let cfg = ProviderConfig::default();
        assert_eq!(cfg.command, "uv");
        assert_eq!(cfg.args, vec!["run", "tasty-agent", "stdio"]);
        assert_eq!(cfg.startup_timeout, Duration::from_secs(60));
    }

    #[test]
    fn credentials_validation_names_every_missing_key() {
        let creds = Credentials {
            client_secret: None,
            refresh_token: None,
            account_id: None,
        };
        let err = creds.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("TASTYTRADE_CLIENT_SECRET"));
        assert!(msg.contains("TASTYTRADE_REFRESH_TOKEN"));
    }

    #[test]
    fn credentials_validation_passes_without_account_id() {
        let creds = Credentials {
            client_secret: Some("secret".into()),
            refresh_token: Some("token".into()),
            account_id: None,
        };
        assert!(creds.validate().is_ok());
    }
}

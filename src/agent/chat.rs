//! CLI chat entry-points: single-shot and interactive REPL.
//!
//! The loop is strictly serial: one line in, one full turn out. Conversation
//! State lives here and is only replaced by the state a successful turn
//! returns; failed turns leave it untouched and the session continues.

use anyhow::{Context, Result};

use crate::config::SessionConfig;
use crate::prompt;

use super::session::AgentSession;
use super::types::ChatMessage;

/// Tokens that end the session without consuming a turn.
const EXIT_TOKENS: &[&str] = &["quit", "exit", "q"];

fn is_exit_token(input: &str) -> bool {
    EXIT_TOKENS
        .iter()
        .any(|t| input.eq_ignore_ascii_case(t))
}

/// Top-level entry-point called from `main()` for local mode.
pub fn run_chat(
    model: Option<String>,
    api_base: Option<String>,
    api_key: Option<String>,
    single_message: Option<String>,
) -> Result<()> {
    let mut config = SessionConfig::from_env();
    if let Some(m) = model {
        config.llm.model = m;
    }
    if let Some(base) = api_base {
        config.llm.base_url = Some(base);
    }
    if let Some(key) = api_key {
        config.llm.api_key = key;
    }

    let instructions = prompt::compose(config.custom_rules.as_deref());

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(async {
        let session = match AgentSession::open(&config, instructions).await {
            Ok(session) => session,
            Err(e) => {
                eprintln!("❌ Failed to start chat: {}", e);
                return Err(e.into());
            }
        };
        tracing::info!("chat session started");

        let outcome = if let Some(msg) = single_message {
            run_single_message(&session, &msg).await
        } else {
            run_interactive_chat(&session).await
        };

        // Scoped release: the provider is torn down however the loop ended.
        session.close().await;
        outcome
    })
}

/// One turn, print, exit.
async fn run_single_message(session: &AgentSession, message: &str) -> Result<()> {
    let result = session.run(message, &[]).await?;
    println!("🤖: {}", result.output);
    Ok(())
}

async fn run_interactive_chat(session: &AgentSession) -> Result<()> {
    println!("Tasty Agent Chat (type 'quit' to exit)");

    let mut rl = rustyline::DefaultEditor::new()
        .map_err(|e| anyhow::anyhow!("Failed to create line editor: {}", e))?;

    // Last known-good Conversation State.
    let mut state: Vec<ChatMessage> = Vec::new();

    loop {
        match rl.readline("\n👤: ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if is_exit_token(input) {
                    tracing::info!("chat session ended by user");
                    break;
                }

                let _ = rl.add_history_entry(input);

                // An interrupt mid-turn cancels the in-flight turn (the
                // working copy dies with it) and closes the session.
                let turn = tokio::select! {
                    result = session.run(input, &state) => result,
                    _ = tokio::signal::ctrl_c() => {
                        eprintln!();
                        tracing::info!("turn interrupted by user");
                        break;
                    }
                };

                match turn {
                    Ok(result) => {
                        println!("🤖: {}", result.output);
                        state = result.state;
                    }
                    Err(e) if e.is_recoverable() => {
                        // State stays at the last known-good value.
                        eprintln!("❌ {}", e);
                    }
                    Err(e) => {
                        eprintln!("❌ {}", e);
                        return Err(e.into());
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => {
                tracing::info!("chat session interrupted by user");
                break;
            }
            Err(e) => {
                eprintln!("❌ {}", e);
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_tokens_are_case_insensitive() {
        for token in ["quit", "QUIT", "Exit", "q", "Q"] {
            assert!(is_exit_token(token), "{token} should end the session");
        }
    }

    #[test]
    fn ordinary_input_is_not_an_exit_token() {
        for input in ["quit now", "sell everything", "exit the position", ""] {
            assert!(!is_exit_token(input), "{input:?} must not end the session");
        }
    }
}

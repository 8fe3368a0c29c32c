//! Owned tool-server subprocess.
//!
//! The child's lifetime is tied to this handle: `kill_on_drop` guarantees the
//! process cannot outlive the session even when the owner unwinds, and
//! `terminate` is the orderly path. Stderr goes to the void and the child's
//! own diagnostic noise is suppressed through its environment, so the chat
//! UI only ever shows our output.

use crate::config::ProviderConfig;
use crate::error::AgentError;
use std::process::Stdio;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

#[derive(Debug)]
pub struct ProviderProcess {
    child: Child,
    command: String,
}

impl ProviderProcess {
    /// Spawn the tool server with the inherited environment plus the
    /// diagnostic-suppression override.
    pub fn spawn(config: &ProviderConfig) -> Result<Self, AgentError> {
        let child = Command::new(&config.command)
            .args(&config.args)
            .env("PYTHONWARNINGS", "ignore")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentError::ProviderUnavailable(format!(
                    "failed to spawn '{}': {}",
                    config.command, e
                ))
            })?;

        tracing::info!(command = %config.command, pid = child.id(), "tool provider spawned");
        Ok(Self {
            child,
            command: config.command.clone(),
        })
    }

    /// Take the child's stdio pipes. Each can be taken once.
    pub fn take_io(&mut self) -> Result<(ChildStdin, ChildStdout), AgentError> {
        let stdin = self.child.stdin.take().ok_or_else(|| {
            AgentError::ProviderUnavailable("provider stdin not piped".to_string())
        })?;
        let stdout = self.child.stdout.take().ok_or_else(|| {
            AgentError::ProviderUnavailable("provider stdout not piped".to_string())
        })?;
        Ok((stdin, stdout))
    }

    /// Orderly teardown: kill the child and reap it.
    pub async fn terminate(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(command = %self.command, "provider kill: {}", e);
        }
        tracing::info!(command = %self.command, "tool provider terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config_for(command: &str, args: &[&str]) -> ProviderConfig {
        ProviderConfig {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            startup_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn spawn_failure_is_provider_unavailable() {
        let err = ProviderProcess::spawn(&config_for("tastychat-no-such-binary", &[]))
            .unwrap_err();
        match err {
            AgentError::ProviderUnavailable(msg) => {
                assert!(msg.contains("tastychat-no-such-binary"))
            }
            other => panic!("expected ProviderUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn spawned_child_pipes_are_available_once() {
        let mut process = ProviderProcess::spawn(&config_for("cat", &[])).unwrap();
        assert!(process.take_io().is_ok());
        assert!(process.take_io().is_err());
        process.terminate().await;
    }
}

//! Observability: tracing init.
//!
//! Logging initialization is a precondition of process startup: it runs once,
//! first thing in `main`, before any session or connector exists.

use tracing_subscriber::{prelude::*, EnvFilter};

/// Tracing initialization mode.
#[derive(Clone, Copy)]
pub enum TracingMode {
    /// Default: use LOG_LEVEL from env.
    Default,
    /// Host mode with --debug: force debug for our own events.
    Debug,
}

/// Initialize tracing. Call at process startup, before anything else.
///
/// Dependency crates that chatter at info level (HTTP client internals,
/// line editor) are capped at warn so the chat UI stays clean.
pub fn init_tracing(mode: TracingMode) {
    let cfg = crate::config::ObservabilityConfig::from_env();
    let level = match mode {
        TracingMode::Debug => "debug".to_string(),
        TracingMode::Default => cfg.log_level.clone(),
    };
    let directives = format!(
        "{level},hyper=warn,hyper_util=warn,reqwest=warn,rustyline=warn,tower_http={level}"
    );

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };
}

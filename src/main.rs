mod agent;
mod cli;
mod config;
mod error;
mod host;
mod observability;
mod prompt;
mod provider;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use observability::TracingMode;

fn main() -> Result<()> {
    // Logging first: a precondition of startup, not a module side effect.
    config::load_dotenv();
    let cli = Cli::parse();
    let mode = match &cli.command {
        Some(Commands::Serve { debug: true, .. }) => TracingMode::Debug,
        _ => TracingMode::Default,
    };
    observability::init_tracing(mode);

    match cli.command {
        Some(Commands::Serve { host, port, debug }) => {
            if debug {
                tracing::debug!("Debug logging enabled");
            }
            host::run_serve(host, port)
        }
        None => agent::chat::run_chat(cli.model, cli.api_base, cli.api_key, cli.message),
    }
}

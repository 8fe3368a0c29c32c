use clap::{Parser, Subcommand};

/// tastychat - conversational trading assistant for the tasty-agent tool server
///
/// With no subcommand, starts an interactive chat on stdin/stdout.
#[derive(Parser, Debug)]
#[command(name = "tastychat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Model identifier in provider:name form (e.g. openai:gpt-4o-mini)
    #[arg(long, env = "MODEL_IDENTIFIER")]
    pub model: Option<String>,

    /// Endpoint override for OpenAI-compatible APIs
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub api_base: Option<String>,

    /// API key for the configured model
    #[arg(long)]
    pub api_key: Option<String>,

    /// Send a single message and exit instead of starting the chat loop
    #[arg(long, short = 'm')]
    pub message: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish the tool server over HTTP/SSE for remote orchestration clients
    #[command(after_help = "\
Environment Variables Required:
  TASTYTRADE_CLIENT_SECRET    OAuth client secret
  TASTYTRADE_REFRESH_TOKEN    OAuth refresh token
  TASTYTRADE_ACCOUNT_ID       (Optional) Specific account ID to use

Connect to the server:
  http://localhost:8000/sse")]
    Serve {
        /// Host to bind to (default: 0.0.0.0)
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to bind to (default: 8000)
        #[arg(long, default_value = "8000")]
        port: u16,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },
}

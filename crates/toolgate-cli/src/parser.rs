//! Root parser and global options.
//!
//! Engine settings can be given as flags or through `TOOLGATE_*` variables
//! (a `.env` file is loaded first). Unset options fall back to the defaults
//! in `EngineSettings`.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(about = "Reach MCP tool servers and run tool-calling agents")]
#[command(version)]
pub struct Cli {
    /// JSON file with the server catalog (defaults to the built-in catalog)
    #[arg(long, env = "TOOLGATE_SERVERS", global = true)]
    pub servers: Option<PathBuf>,

    /// Model identifier passed to the provider
    #[arg(long, env = "TOOLGATE_MODEL", global = true)]
    pub model: Option<String>,

    /// Sampling temperature (0.0-2.0)
    #[arg(long, env = "TOOLGATE_TEMPERATURE", global = true)]
    pub temperature: Option<f64>,

    /// Step budget for one execution (1-1000)
    #[arg(long, env = "TOOLGATE_MAX_STEPS", global = true)]
    pub max_steps: Option<u32>,

    /// Per-request tool server timeout in seconds
    #[arg(long, env = "TOOLGATE_TOOL_TIMEOUT", global = true)]
    pub tool_timeout: Option<u64>,

    /// Whole-execution timeout in seconds
    #[arg(long, env = "TOOLGATE_EXECUTION_TIMEOUT", global = true)]
    pub execution_timeout: Option<u64>,

    /// API key for the OpenAI-compatible model provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible model provider
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,

    /// Enable debug logging for toolgate crates
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

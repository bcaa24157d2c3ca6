//! Ember CLI, the main entry point.
//!
//! Commands:
//! - `plugins`: Discover and load plugins, list what loaded
//! - `tools`: List the tool catalog with schemas
//! - `prompt`: Print the tool-augmented system prompt
//! - `call`: Execute one tool through the registry
//! - `parse`: Parse a model reply from stdin for tool calls
//! - `segment`: Run stdin through the stream segmenter
//! - `config`: Print configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ember",
    about = "Ember: local-first AI agent runtime with plugin tools",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to ~/.ember/config.toml)
    #[arg(short, long, global = true, env = "EMBER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and load plugins, then list them
    Plugins {
        #[arg(long)]
        json: bool,
    },

    /// List every tool the loaded plugins provide
    Tools {
        #[arg(long)]
        json: bool,
    },

    /// Print the system prompt with tool instructions injected
    Prompt {
        /// Base system prompt (defaults to agent.system_prompt)
        #[arg(short, long)]
        system: Option<String>,
    },

    /// Execute a single tool
    Call {
        tool: String,

        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,
    },

    /// Read a model reply on stdin and print the parsed tool calls as JSON
    Parse,

    /// Feed stdin through the stream segmenter and print events as JSON lines
    Segment {
        /// Fragment size in bytes
        #[arg(long, default_value_t = 16)]
        chunk: usize,
    },

    /// Print the default configuration
    Config {
        /// Show the loaded configuration instead of the defaults
        #[arg(long)]
        effective: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Plugins { json } => commands::plugins::run(config, json).await?,
        Commands::Tools { json } => commands::tools::run(config, json).await?,
        Commands::Prompt { system } => commands::prompt::run(config, system).await?,
        Commands::Call { tool, args } => commands::call::run(config, &tool, &args).await?,
        Commands::Parse => commands::parse::run(config).await?,
        Commands::Segment { chunk } => commands::segment::run(config, chunk).await?,
        Commands::Config { effective } => commands::config_cmd::run(&config, effective)?,
    }

    Ok(())
}

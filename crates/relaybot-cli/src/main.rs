//! Relaybot CLI: entry point.
//!
//! # Commands
//!
//! - `relaybot agent [-m MESSAGE] [-s SESSION] [-t TOOL]`: chat (single-shot or REPL)
//! - `relaybot onboard`: write a default config
//! - `relaybot status`: show configuration and provider status
//! - `relaybot mcp {reload,list,health,status}`: inspect remote tool-servers

mod helpers;
mod mcp_cmd;
mod onboard;
mod repl;
mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use relaybot_agent::{AgentLoop, ToolRegistry};
use relaybot_core::config::{load_config, Config};
use relaybot_mcp::McpManager;
use relaybot_providers::http_provider::create_provider;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Relaybot: a tool-calling chat agent with remote tool-server support
#[derive(Parser)]
#[command(name = "relaybot", version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.relaybot/config.json)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (single-shot or interactive REPL)
    Agent {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Conversation identifier (format: "channel:id")
        #[arg(short, long, default_value = "cli:direct")]
        session: String,

        /// Force this tool on the first round of every turn
        #[arg(short, long)]
        tool: Option<String>,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Write a default configuration file
    Onboard,

    /// Show configuration and provider status
    Status,

    /// Inspect remote tool-servers
    Mcp {
        #[command(subcommand)]
        action: mcp_cmd::McpCommands,

        /// Enable debug logging
        #[arg(long, default_value_t = false, global = true)]
        logs: bool,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path: Option<PathBuf> = cli.config.as_deref().map(helpers::expand_tilde);

    match cli.command {
        Commands::Agent {
            message,
            session,
            tool,
            logs,
        } => {
            init_logging(logs);
            let config = load_config(config_path.as_deref());
            run_agent(&config, message, &session, tool).await
        }
        Commands::Onboard => onboard::run(config_path.as_deref()),
        Commands::Status => status::run(config_path.as_deref()),
        Commands::Mcp { action, logs } => {
            init_logging(logs);
            let config = load_config(config_path.as_deref());
            mcp_cmd::dispatch(action, &config).await
        }
    }
}

// ─────────────────────────────────────────────
// Agent command
// ─────────────────────────────────────────────

async fn run_agent(
    config: &Config,
    message: Option<String>,
    session: &str,
    forced_tool: Option<String>,
) -> Result<()> {
    let mcp = connect_tool_servers(config).await;
    let agent = build_agent_loop(config, mcp.clone())?;
    let target = helpers::ChatTarget::parse(session);

    let result = match message {
        Some(text) => {
            info!(session = %session, "processing single message");
            let response = agent
                .process_message(&target.inbound(&text, forced_tool.as_deref()))
                .await;
            helpers::print_response(&response.content, response.last_tool_used.as_deref());
            Ok(())
        }
        None => repl::run(&agent, &target, forced_tool.as_deref()).await,
    };

    if let Some(mcp) = mcp {
        mcp.disconnect_all().await;
    }
    result
}

/// Connect every enabled tool-server; `None` when none are configured.
pub async fn connect_tool_servers(config: &Config) -> Option<Arc<McpManager>> {
    if config.mcp.enabled_servers().is_empty() {
        return None;
    }
    let manager = Arc::new(McpManager::from_config(&config.mcp));
    let tools = manager.reload(&config.mcp).await;
    info!(tools, servers = manager.connected_servers().await.len(), "remote tools loaded");
    Some(manager)
}

/// Build an `AgentLoop` from the loaded configuration.
pub fn build_agent_loop(config: &Config, mcp: Option<Arc<McpManager>>) -> Result<AgentLoop> {
    let defaults = &config.agents.defaults;
    let provider = create_provider(&config.provider, &defaults.model)?;

    Ok(AgentLoop::new(
        Arc::new(provider),
        ToolRegistry::with_builtins(),
        mcp,
        defaults,
    ))
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("relaybot=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

//! `relaybot status`: show configuration, provider and tool-server status.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use relaybot_agent::{Tool, ToolRegistry};
use relaybot_core::config::{get_config_path, load_config};

/// Run the status command.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
    let defaults = &config.agents.defaults;

    println!();
    println!("{}", "Relaybot Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        path.display(),
        if path.exists() {
            "✓".green().to_string()
        } else {
            "(not found)".red().to_string()
        }
    );
    println!("  {:<18} {}", "Model:".bold(), defaults.model);
    println!(
        "  {:<18} {} | {} | {}",
        "Parameters:".bold(),
        format!("temp: {}", defaults.temperature).dimmed(),
        format!("top_p: {}", defaults.top_p).dimmed(),
        format!("max_tokens: {}", defaults.max_tokens).dimmed(),
    );
    println!(
        "  {:<18} {} | {} | {}",
        "Loop:".bold(),
        format!("rounds: {}", defaults.max_tool_rounds).dimmed(),
        format!("retries: {}", defaults.request_retries).dimmed(),
        format!("concurrency: {}", defaults.concurrent_limit).dimmed(),
    );

    // Provider
    println!();
    let key_status = if config.provider.is_configured() {
        format!("{} (key set)", "✓".green())
    } else {
        format!("{}", "· no API key".dimmed())
    };
    println!("  {:<18} {}", "Provider:".bold(), key_status);
    if let Some(base) = &config.provider.api_base {
        println!("  {:<18} {}", "API base:".bold(), base);
    }

    // Local tools
    let registry = ToolRegistry::with_builtins();
    let selected: Vec<String> = registry
        .select(&defaults.tools)
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    println!("  {:<18} {}", "Local tools:".bold(), selected.join(", "));

    // Tool-servers (configured, not connected)
    println!();
    println!("  {}", "Tool-servers:".bold());
    if config.mcp.servers.is_empty() {
        println!("    {}", "· none configured".dimmed());
    }
    let mut servers: Vec<_> = config.mcp.servers.iter().collect();
    servers.sort_by(|a, b| a.0.cmp(b.0));
    for (name, server) in servers {
        let state = if server.enabled {
            "enabled".green().to_string()
        } else {
            "disabled".dimmed().to_string()
        };
        println!("    {:<20} {} ({})", name, state, server.kind);
    }

    println!();
    Ok(())
}

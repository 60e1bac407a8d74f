//! `relaybot mcp`: connect the configured tool-servers and report on them.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use relaybot_core::config::Config;
use relaybot_mcp::{HealthReport, HealthStatus, McpManager};

#[derive(Subcommand)]
pub enum McpCommands {
    /// Connect every enabled server and show what was loaded
    Reload,
    /// List remote tools
    List,
    /// Re-list tools on every connection and report health
    Health {
        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show per-server connection status
    Status,
}

pub async fn dispatch(action: McpCommands, config: &Config) -> Result<()> {
    if config.mcp.servers.is_empty() {
        println!("{}", "No remote tool-servers configured.".dimmed());
        return Ok(());
    }

    let manager = McpManager::from_config(&config.mcp);
    let tools = manager.reload(&config.mcp).await;

    match action {
        McpCommands::Reload => {
            println!(
                "{} {} remote tools from {} servers",
                "Loaded".green().bold(),
                tools,
                manager.connected_servers().await.len()
            );
            println!("{}", manager.tool_summary().await);
        }
        McpCommands::List => {
            if tools == 0 {
                println!("{}", "No remote tools loaded".dimmed());
            } else {
                println!("{}", manager.tools_description().await);
            }
        }
        McpCommands::Health { json } => {
            let report = manager.health_check().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_health(&report));
            }
        }
        McpCommands::Status => println!("{}", manager.status_summary().await),
    }

    manager.disconnect_all().await;
    Ok(())
}

fn render_health(report: &HealthReport) -> String {
    let mut out = format!(
        "Health at {}: {} servers, {} tools\n",
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        report.total_servers,
        report.total_tools
    );
    for server in &report.servers {
        let status = match server.status {
            HealthStatus::Healthy => "healthy".green().to_string(),
            HealthStatus::Unhealthy => "unhealthy".red().to_string(),
        };
        out.push_str(&format!(
            "  {:<20} {} ({}, {} tools)",
            server.name, status, server.kind, server.tool_count
        ));
        if let Some(error) = &server.error {
            out.push_str(&format!(": {error}"));
        }
        out.push('\n');
    }
    out
}

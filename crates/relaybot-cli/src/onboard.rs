//! `relaybot onboard`: write a default configuration.
//!
//! Creates `~/.relaybot/config.json` (or the `--config` path) with defaults
//! and a disabled example tool-server, plus the REPL history directory.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use relaybot_core::config::{get_config_path, save_config, Config, McpServerConfig, TransportKind};
use relaybot_core::utils::get_history_path;

/// Run the onboard command.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    println!();
    println!("{}", "Relaybot setup".cyan().bold());
    println!();

    let path = config_path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
    if write_default_config(&path)? {
        println!("  {} created config at {}", "✓".green(), path.display());
    } else {
        println!("  {} config already exists at {}", "✓".green(), path.display());
    }

    let history_dir = get_history_path();
    std::fs::create_dir_all(&history_dir)
        .with_context(|| format!("failed to create {}", history_dir.display()))?;

    println!();
    println!(
        "{}",
        "  Setup complete! Set provider.apiKey, then run `relaybot agent`.".green()
    );
    println!();

    Ok(())
}

/// Write the default config unless a file already exists. Returns whether
/// a file was written.
fn write_default_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save_config(&default_config(), Some(path))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

fn default_config() -> Config {
    let mut config = Config::default();
    config.mcp.servers.insert(
        "filesystem".to_string(),
        McpServerConfig {
            enabled: false,
            kind: TransportKind::Pipe,
            command: Some("npx".to_string()),
            args: vec![
                "-y".to_string(),
                "@modelcontextprotocol/server-filesystem".to_string(),
                "~".to_string(),
            ],
            description: Some("Read and write local files".to_string()),
            ..Default::default()
        },
    );
    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

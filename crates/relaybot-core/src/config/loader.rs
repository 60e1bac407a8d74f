//! Config loader: reads `~/.relaybot/config.json`, merges env vars, and
//! applies legacy migrations.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.relaybot/config.json`
//! 3. Environment variables `RELAYBOT_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    // Parse JSON → Value first for migration
    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    migrate_config(&mut raw);

    let config: Config = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply legacy config migrations.
///
/// Moves a top-level `mcpServers` map (the layout most tool-server READMEs
/// document) into `mcp.servers`. Entries already under `mcp.servers` win.
fn migrate_config(raw: &mut serde_json::Value) {
    let Some(obj) = raw.as_object_mut() else {
        return;
    };
    let Some(legacy) = obj.remove("mcpServers") else {
        return;
    };
    let serde_json::Value::Object(legacy) = legacy else {
        return;
    };

    let mcp = obj
        .entry("mcp")
        .or_insert_with(|| serde_json::json!({}));
    let Some(mcp) = mcp.as_object_mut() else {
        return;
    };
    let servers = mcp
        .entry("servers")
        .or_insert_with(|| serde_json::json!({}));
    let Some(servers) = servers.as_object_mut() else {
        return;
    };

    for (name, server) in legacy {
        if !servers.contains_key(&name) {
            debug!(server = %name, "Migrated mcpServers entry → mcp.servers");
            servers.insert(name, server);
        }
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `RELAYBOT_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `RELAYBOT_AGENTS__DEFAULTS__MODEL` → `agents.defaults.model`
/// - `RELAYBOT_AGENTS__DEFAULTS__MAX_TOKENS` → `agents.defaults.max_tokens`
/// - `RELAYBOT_AGENTS__DEFAULTS__TEMPERATURE` → `agents.defaults.temperature`
/// - `RELAYBOT_AGENTS__DEFAULTS__MAX_TOOL_ROUNDS` → `agents.defaults.max_tool_rounds`
/// - `RELAYBOT_AGENTS__DEFAULTS__CONCURRENT_LIMIT` → `agents.defaults.concurrent_limit`
/// - `RELAYBOT_PROVIDER__API_KEY` → `provider.api_key`
/// - `RELAYBOT_PROVIDER__API_BASE` → `provider.api_base`
/// - `RELAYBOT_MCP__REQUEST_TIMEOUT_SECS` → `mcp.request_timeout_secs`
fn apply_env_overrides(mut config: Config) -> Config {
    let defaults = &mut config.agents.defaults;
    if let Ok(val) = std::env::var("RELAYBOT_AGENTS__DEFAULTS__MODEL") {
        defaults.model = val;
    }
    if let Some(n) = env_parse::<u32>("RELAYBOT_AGENTS__DEFAULTS__MAX_TOKENS") {
        defaults.max_tokens = n;
    }
    if let Some(t) = env_parse::<f64>("RELAYBOT_AGENTS__DEFAULTS__TEMPERATURE") {
        defaults.temperature = t;
    }
    if let Some(n) = env_parse::<u32>("RELAYBOT_AGENTS__DEFAULTS__MAX_TOOL_ROUNDS") {
        defaults.max_tool_rounds = n;
    }
    if let Some(n) = env_parse::<usize>("RELAYBOT_AGENTS__DEFAULTS__CONCURRENT_LIMIT") {
        defaults.concurrent_limit = n;
    }

    if let Ok(val) = std::env::var("RELAYBOT_PROVIDER__API_KEY") {
        config.provider.api_key = val;
    }
    if let Ok(val) = std::env::var("RELAYBOT_PROVIDER__API_BASE") {
        config.provider.api_base = Some(val);
    }

    if let Some(n) = env_parse::<u64>("RELAYBOT_MCP__REQUEST_TIMEOUT_SECS") {
        config.mcp.request_timeout_secs = n;
    }

    config
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let val = std::env::var(key).ok()?;
    match val.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}: cannot parse {:?}", key, val);
            None
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

//! Configuration schema.
//!
//! Hierarchy: `Config` → `AgentsConfig`, `ProviderConfig`, `McpConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use tracing::warn;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.relaybot/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agents: AgentsConfig,
    pub provider: ProviderConfig,
    pub mcp: McpConfig,
}

// ─────────────────────────────────────────────
// Agents
// ─────────────────────────────────────────────

/// Agent configuration container.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
}

/// Default agent settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentDefaults {
    /// Default LLM model identifier.
    pub model: String,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Nucleus sampling.
    pub top_p: f64,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Tool rounds before the final tools-disabled request.
    pub max_tool_rounds: u32,
    /// Extra attempts per completion request.
    pub request_retries: u32,
    /// Ceiling on concurrently executing tool calls (0 → 5).
    pub concurrent_limit: usize,
    /// Base system prompt.
    pub system_prompt: String,
    /// Non-system messages kept from history.
    pub max_history: usize,
    /// Local tools offered to the model. Unknown names are dropped.
    pub tools: Vec<String>,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 8192,
            max_tool_rounds: 5,
            request_retries: 1,
            concurrent_limit: 5,
            system_prompt: "You are Relaybot, a helpful assistant. Use the available tools when they help answer the user.".to_string(),
            max_history: 100,
            tools: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────

/// The OpenAI-compatible completion endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Custom API base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            extra_headers: None,
            timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

// ─────────────────────────────────────────────
// MCP servers
// ─────────────────────────────────────────────

/// Remote tool-server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpConfig {
    /// Timeout for a single JSON-RPC request.
    pub request_timeout_secs: u64,
    /// Server name → connection settings. Entries that fail to parse are
    /// logged and skipped.
    #[serde(deserialize_with = "lenient_servers")]
    pub servers: HashMap<String, McpServerConfig>,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            servers: HashMap::new(),
        }
    }
}

impl McpConfig {
    /// Servers marked `enabled`, sorted by name.
    pub fn enabled_servers(&self) -> Vec<(&String, &McpServerConfig)> {
        let mut servers: Vec<_> = self.servers.iter().filter(|(_, c)| c.enabled).collect();
        servers.sort_by(|a, b| a.0.cmp(b.0));
        servers
    }
}

fn lenient_servers<'de, D>(deserializer: D) -> Result<HashMap<String, McpServerConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(name, value)| match serde_json::from_value(value) {
            Ok(server) => Some((name, server)),
            Err(e) => {
                warn!(server = %name, error = %e, "skipping malformed tool-server entry");
                None
            }
        })
        .collect())
}

/// How a remote tool-server is reached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum TransportKind {
    /// Child process speaking newline-delimited JSON-RPC on stdin/stdout.
    #[default]
    #[serde(rename = "stdio")]
    Pipe,
    /// HTTP server-sent event stream plus POSTed requests.
    #[serde(rename = "sse")]
    EventStream,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Pipe => "stdio",
            TransportKind::EventStream => "sse",
        }
    }

    /// Case-insensitive. Anything unrecognised is treated as a pipe.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sse" | "stream" => TransportKind::EventStream,
            "stdio" | "pipe" => TransportKind::Pipe,
            other => {
                warn!(kind = other, "unknown transport type, using stdio");
                TransportKind::Pipe
            }
        }
    }
}

impl<'de> Deserialize<'de> for TransportKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => TransportKind::parse(&s),
            serde_json::Value::Null => TransportKind::Pipe,
            other => {
                warn!(kind = %other, "non-string transport type, using stdio");
                TransportKind::Pipe
            }
        })
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one remote tool-server.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpServerConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: TransportKind,
    /// Pipe: executable to spawn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Arbitrary JSON values; see [`McpServerConfig::clean_env`].
    pub env: HashMap<String, serde_json::Value>,
    /// Event stream: the SSE endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Arbitrary JSON values; see [`McpServerConfig::header_pairs`].
    pub headers: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_conditions: Option<PromptConditions>,
}

impl McpServerConfig {
    /// Headers coerced to strings: trimmed, one layer of surrounding quotes
    /// removed, nulls dropped.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .headers
            .iter()
            .filter_map(|(key, value)| {
                let raw = value_to_string(value)?;
                Some((key.clone(), strip_quotes(raw.trim()).to_string()))
            })
            .collect();
        pairs.sort();
        pairs
    }

    /// Env entries coerced to strings, with nulls and empty values removed.
    pub fn clean_env(&self) -> HashMap<String, String> {
        self.env
            .iter()
            .filter_map(|(k, v)| value_to_string(v).map(|v| (k.clone(), v)))
            .filter(|(_, v)| !v.is_empty())
            .collect()
    }
}

fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s
        .strip_prefix('"')
        .or_else(|| s.strip_prefix('\''))
        .unwrap_or(s);
    let s = s
        .strip_suffix('"')
        .or_else(|| s.strip_suffix('\''))
        .unwrap_or(s);
    s.trim()
}

/// Restricts when a server's system prompt is injected. Every present
/// condition must match; absent conditions always match.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptConditions {
    #[serde(alias = "messageType", skip_serializing_if = "Option::is_none")]
    pub message_types: Option<Vec<String>>,
    #[serde(alias = "groupIds", skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

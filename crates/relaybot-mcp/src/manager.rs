//! Tool manager: owns every tool-server connection and the index of the tools
//! they expose.
//!
//! Remote tools are advertised to the model as `mcp_<name>` so they can never
//! collide with local tools. The index is keyed by the real (unprefixed) name;
//! when two servers expose the same name the server registered first keeps it.
//!
//! Locking: `servers` is always taken before `tools`, and neither lock is held
//! across a network round-trip.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_mcp_schema::CallToolResult;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use relaybot_core::config::{McpConfig, McpServerConfig, PromptConditions, TransportKind};
use relaybot_core::limiter::ConcurrencyLimiter;

use crate::client::McpClient;
use crate::error::McpError;
use crate::protocol::tool_input_schema;
use crate::transport::{validate_config, DefaultTransportFactory, TransportFactory};

/// Prefix marking a tool name as remote.
pub const REMOTE_TOOL_PREFIX: &str = "mcp_";

/// Header placed in front of server system prompts.
const PROMPTS_HEADER: &str = "[Remote tool-server capabilities]";

pub fn is_remote_tool(name: &str) -> bool {
    name.starts_with(REMOTE_TOOL_PREFIX)
}

/// Strip one leading `mcp_`; names without it are returned unchanged.
pub fn real_tool_name(name: &str) -> &str {
    name.strip_prefix(REMOTE_TOOL_PREFIX).unwrap_or(name)
}

pub fn remote_tool_name(real_name: &str) -> String {
    format!("{REMOTE_TOOL_PREFIX}{real_name}")
}

// ─────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One indexed remote tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTool {
    pub server: String,
    /// Name as the server knows it (no prefix).
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

impl RemoteTool {
    /// Name advertised to the model.
    pub fn display_name(&self) -> String {
        remote_tool_name(&self.name)
    }
}

/// Per-server snapshot for administrative listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub kind: TransportKind,
    pub description: String,
    pub enabled: bool,
    pub state: ConnectionState,
    pub tool_count: usize,
    pub tool_names: Vec<String>,
    pub has_system_prompt: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// What the current inbound message looks like, for filtering server prompts.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub message_type: Option<String>,
    pub group_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub tool_name: String,
    pub success: bool,
    pub result: Option<CallToolResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHealth {
    pub name: String,
    pub kind: TransportKind,
    pub status: HealthStatus,
    pub tool_count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub total_servers: usize,
    pub total_tools: usize,
    pub servers: Vec<ServerHealth>,
}

// ─────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────

struct ServerEntry {
    config: McpServerConfig,
    state: ConnectionState,
    client: Option<Arc<McpClient>>,
    connected_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    /// Tools this server currently owns in the index.
    tool_names: Vec<String>,
    system_prompt: Option<String>,
}

impl ServerEntry {
    fn new(config: McpServerConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            config,
            state: ConnectionState::Connecting,
            client: None,
            connected_at: None,
            last_error: None,
            tool_names: Vec::new(),
        }
    }

    fn live_client(&self) -> Option<Arc<McpClient>> {
        match self.state {
            ConnectionState::Connected => self.client.clone(),
            _ => None,
        }
    }
}

pub struct McpManager {
    factory: Arc<dyn TransportFactory>,
    request_timeout: Duration,
    /// Bounds concurrent connects and tool listings.
    fetch_limiter: ConcurrencyLimiter,
    servers: RwLock<HashMap<String, ServerEntry>>,
    /// Real tool name → tool.
    tools: RwLock<HashMap<String, RemoteTool>>,
}

impl McpManager {
    pub fn new(factory: Arc<dyn TransportFactory>, request_timeout: Duration) -> Self {
        Self {
            factory,
            request_timeout,
            fetch_limiter: ConcurrencyLimiter::default(),
            servers: RwLock::new(HashMap::new()),
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Manager using real transports and the configured request timeout.
    /// Nothing is connected until [`reload`](Self::reload) or [`connect`](Self::connect).
    pub fn from_config(config: &McpConfig) -> Self {
        let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        Self::new(Arc::new(DefaultTransportFactory::new(timeout)), timeout)
    }

    // ── Lifecycle ──

    /// Connect (or reconnect) one server and index its tools.
    ///
    /// Any live connection under the same name is closed first. Failures are
    /// recorded on the server entry and logged; they never propagate.
    pub async fn connect(&self, name: &str, config: McpServerConfig) -> bool {
        self.disconnect(name).await;

        let kind = config.kind;
        self.servers
            .write()
            .await
            .insert(name.to_string(), ServerEntry::new(config.clone()));

        let client = match self.open_client(name, &config).await {
            Ok(client) => client,
            Err(e) => {
                error!(server = %name, kind = %kind, error = %e, "Failed to connect tool-server");
                if let Some(entry) = self.servers.write().await.get_mut(name) {
                    entry.state = ConnectionState::Failed;
                    entry.last_error = Some(e.to_string());
                }
                return false;
            }
        };

        let attached = match self.servers.write().await.get_mut(name) {
            Some(entry) => {
                entry.state = ConnectionState::Connected;
                entry.client = Some(client.clone());
                entry.connected_at = Some(Utc::now());
                entry.last_error = None;
                true
            }
            None => false,
        };
        if !attached {
            // Removed by a concurrent disconnect_all while we were handshaking.
            let _ = client.close().await;
            return false;
        }

        info!(server = %name, kind = %kind, "Connected tool-server");
        let tools = self.register_server_tools(name).await;
        info!(server = %name, tools = tools.len(), "Indexed remote tools");
        true
    }

    async fn open_client(&self, name: &str, config: &McpServerConfig) -> Result<Arc<McpClient>, McpError> {
        validate_config(name, config)?;
        let transport = self.factory.open(name, config).await?;
        let client = McpClient::start(name, transport, self.request_timeout);
        if let Err(e) = client.initialize().await {
            let _ = client.close().await;
            return Err(e);
        }
        Ok(Arc::new(client))
    }

    /// Re-list a connected server's tools and replace its index entries in one
    /// step. A failed listing leaves the index untouched and returns nothing.
    pub async fn register_server_tools(&self, name: &str) -> Vec<RemoteTool> {
        let client = self.servers.read().await.get(name).and_then(ServerEntry::live_client);
        let Some(client) = client else {
            warn!(server = %name, "Cannot list tools: server not connected");
            return Vec::new();
        };

        let listed = match client.list_tools().await {
            Ok(listed) => listed,
            Err(e) => {
                error!(server = %name, error = %e, "Failed to list remote tools");
                return Vec::new();
            }
        };

        let mut servers = self.servers.write().await;
        let mut tools = self.tools.write().await;
        let Some(entry) = servers.get_mut(name) else {
            return Vec::new();
        };

        tools.retain(|_, tool| tool.server != name);

        let mut registered = Vec::with_capacity(listed.len());
        for tool in listed {
            if let Some(owner) = tools.get(&tool.name) {
                warn!(
                    server = %name,
                    tool = %tool.name,
                    owner = %owner.server,
                    "Remote tool name already taken, skipping"
                );
                continue;
            }
            let remote = RemoteTool {
                server: name.to_string(),
                input_schema: tool_input_schema(&tool),
                name: tool.name,
                description: tool.description,
            };
            debug!(server = %name, tool = %remote.name, "Registered remote tool");
            tools.insert(remote.name.clone(), remote.clone());
            registered.push(remote);
        }

        entry.tool_names = registered.iter().map(|t| t.name.clone()).collect();
        registered
    }

    /// Close a server's connection and drop its tools. The entry and its
    /// config stay on record for [`reconnect`](Self::reconnect).
    ///
    /// Returns `false` when there was no live connection.
    pub async fn disconnect(&self, name: &str) -> bool {
        let client = {
            let mut servers = self.servers.write().await;
            let mut tools = self.tools.write().await;
            let Some(entry) = servers.get_mut(name) else {
                return false;
            };
            tools.retain(|_, tool| tool.server != name);
            entry.tool_names.clear();
            entry.connected_at = None;
            let client = entry.client.take();
            if client.is_some() {
                entry.state = ConnectionState::Disconnected;
            }
            client
        };

        let Some(client) = client else {
            return false;
        };
        if let Err(e) = client.close().await {
            debug!(server = %name, error = %e, "Error while closing tool-server");
        }
        info!(server = %name, "Disconnected tool-server");
        true
    }

    /// Disconnect everything and forget every server.
    pub async fn disconnect_all(&self) {
        let names: Vec<String> = self.servers.read().await.keys().cloned().collect();
        for name in &names {
            self.disconnect(name).await;
        }

        let mut servers = self.servers.write().await;
        let mut tools = self.tools.write().await;
        servers.clear();
        tools.clear();
        info!(servers = names.len(), "Disconnected all tool-servers");
    }

    /// Disconnect then connect again with the last known config.
    pub async fn reconnect(&self, name: &str) -> bool {
        let config = self.servers.read().await.get(name).map(|e| e.config.clone());
        let Some(config) = config else {
            warn!(server = %name, "No config on record, cannot reconnect");
            return false;
        };
        self.disconnect(name).await;
        self.connect(name, config).await
    }

    /// Replace every connection with the enabled entries of `config`.
    /// Returns how many remote tools are indexed afterwards.
    pub async fn reload(&self, config: &McpConfig) -> usize {
        self.disconnect_all().await;

        let enabled = config.enabled_servers();
        let results = join_all(
            enabled
                .iter()
                .map(|(name, cfg)| self.fetch_limiter.run(self.connect(name, (*cfg).clone()))),
        )
        .await;

        let connected = results.iter().filter(|ok| **ok).count();
        let total = self.tool_count().await;
        info!(
            configured = enabled.len(),
            connected,
            tools = total,
            "Reloaded tool-servers"
        );
        total
    }

    // ── Execution ──

    /// Call a remote tool by real or prefixed name.
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<CallToolResult, McpError> {
        let real = real_tool_name(tool_name);
        let (server, client) = self.route(real).await?;

        debug!(server = %server, tool = %real, "Executing remote tool");
        match client.call_tool(real, args).await {
            Err(McpError::Closed(_)) => {
                warn!(server = %server, tool = %real, "Tool-server went away during call");
                self.disconnect(&server).await;
                Err(McpError::ServerDisconnected {
                    server,
                    tool: real.to_string(),
                })
            }
            other => other,
        }
    }

    /// Find the live client owning `real`, refreshing a stale server once.
    async fn route(&self, real: &str) -> Result<(String, Arc<McpClient>), McpError> {
        let mut refreshed = false;
        loop {
            let (server, client, stale) = {
                let servers = self.servers.read().await;
                let tools = self.tools.read().await;
                let server = tools
                    .get(real)
                    .map(|tool| tool.server.clone())
                    .ok_or_else(|| McpError::UnknownTool(real.to_string()))?;
                let entry = servers.get(&server);
                let client = entry.and_then(ServerEntry::live_client);
                let stale = entry.is_some_and(|e| is_stale(&server, e, &tools));
                (server, client, stale)
            };

            let Some(client) = client else {
                return Err(McpError::ServerDisconnected {
                    server,
                    tool: real.to_string(),
                });
            };
            if !client.is_alive() {
                warn!(server = %server, "Tool-server connection is dead");
                self.disconnect(&server).await;
                return Err(McpError::ServerDisconnected {
                    server,
                    tool: real.to_string(),
                });
            }
            if stale && !refreshed {
                warn!(server = %server, "Tool index out of sync, refreshing");
                self.register_server_tools(&server).await;
                refreshed = true;
                continue;
            }
            return Ok((server, client));
        }
    }

    /// Run calls concurrently; each outcome is reported independently.
    pub async fn execute_batch(&self, calls: &[(String, Value)]) -> Vec<BatchResult> {
        let outcomes = join_all(
            calls
                .iter()
                .map(|(name, args)| self.execute(name, args.clone())),
        )
        .await;

        calls
            .iter()
            .zip(outcomes)
            .map(|((name, _), outcome)| match outcome {
                Ok(result) => BatchResult {
                    tool_name: name.clone(),
                    success: true,
                    result: Some(result),
                    error: None,
                },
                Err(e) => BatchResult {
                    tool_name: name.clone(),
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }

    /// Re-list tools on every live connection.
    pub async fn health_check(&self) -> HealthReport {
        let live: Vec<(String, TransportKind, Arc<McpClient>)> = {
            let servers = self.servers.read().await;
            let mut live: Vec<_> = servers
                .iter()
                .filter_map(|(name, e)| e.client.clone().map(|c| (name.clone(), e.config.kind, c)))
                .collect();
            live.sort_by(|a, b| a.0.cmp(&b.0));
            live
        };

        let checks = join_all(
            live.iter()
                .map(|(_, _, client)| self.fetch_limiter.run(client.list_tools())),
        )
        .await;
        let servers = live
            .into_iter()
            .zip(checks)
            .map(|((name, kind, _), check)| match check {
                Ok(tools) => ServerHealth {
                    name,
                    kind,
                    status: HealthStatus::Healthy,
                    tool_count: tools.len(),
                    error: None,
                },
                Err(e) => ServerHealth {
                    name,
                    kind,
                    status: HealthStatus::Unhealthy,
                    tool_count: 0,
                    error: Some(e.to_string()),
                },
            })
            .collect::<Vec<_>>();

        HealthReport {
            timestamp: Utc::now(),
            total_servers: servers.len(),
            total_tools: self.tool_count().await,
            servers,
        }
    }

    // ── Queries ──

    pub async fn is_known_tool(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(real_tool_name(name))
    }

    /// Server owning a tool (real or prefixed name).
    pub async fn resolve_server(&self, name: &str) -> Option<String> {
        self.tools
            .read()
            .await
            .get(real_tool_name(name))
            .map(|tool| tool.server.clone())
    }

    pub async fn tool_info(&self, name: &str) -> Option<RemoteTool> {
        self.tools.read().await.get(real_tool_name(name)).cloned()
    }

    /// Indexed and owned by a connected server.
    pub async fn is_tool_available(&self, name: &str) -> bool {
        let servers = self.servers.read().await;
        let tools = self.tools.read().await;
        tools
            .get(real_tool_name(name))
            .and_then(|tool| servers.get(&tool.server))
            .is_some_and(|entry| entry.state == ConnectionState::Connected)
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Every indexed tool, sorted by name.
    pub async fn remote_tools(&self) -> Vec<RemoteTool> {
        let mut tools: Vec<RemoteTool> = self.tools.read().await.values().cloned().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub async fn connected_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .servers
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.state == ConnectionState::Connected)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// One line per server: `name (kind): N tools (a, b)`.
    pub async fn tool_summary(&self) -> String {
        let servers = self.servers.read().await;
        let tools = self.tools.read().await;

        let mut by_server: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for tool in tools.values() {
            by_server.entry(tool.server.as_str()).or_default().push(tool.name.as_str());
        }
        if by_server.is_empty() {
            return "No remote tools loaded".to_string();
        }

        by_server
            .into_iter()
            .map(|(server, mut names)| {
                names.sort_unstable();
                let kind = servers.get(server).map(|e| e.config.kind).unwrap_or_default();
                format!("{server} ({kind}): {} tools ({})", names.len(), names.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `mcp_name: [server] description` per tool, sorted by name.
    pub async fn tools_description(&self) -> String {
        self.remote_tools()
            .await
            .iter()
            .map(|tool| {
                format!(
                    "{}: [{}] {}",
                    tool.display_name(),
                    tool.server,
                    tool.description.as_deref().unwrap_or("No description")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn servers_info(&self) -> Vec<ServerInfo> {
        let servers = self.servers.read().await;
        let mut info: Vec<ServerInfo> = servers
            .iter()
            .map(|(name, e)| ServerInfo {
                name: name.clone(),
                kind: e.config.kind,
                description: e.config.description.clone().unwrap_or_default(),
                enabled: e.config.enabled,
                state: e.state,
                tool_count: e.tool_names.len(),
                tool_names: e.tool_names.clone(),
                has_system_prompt: e.system_prompt.as_deref().is_some_and(|p| !p.trim().is_empty()),
                connected_at: e.connected_at,
                last_error: e.last_error.clone(),
            })
            .collect();
        info.sort_by(|a, b| a.name.cmp(&b.name));
        info
    }

    /// Human-readable server listing for the CLI.
    pub async fn status_summary(&self) -> String {
        let servers = self.servers_info().await;
        if servers.is_empty() {
            return "No remote tool-servers configured".to_string();
        }

        let mut lines = vec!["Remote tool-servers:".to_string()];
        for server in servers {
            lines.push(format!("\n{} [{}]", server.name, server.state));
            lines.push(format!("   type: {}", server.kind));
            lines.push(format!("   tools: {}", server.tool_count));
            if !server.description.is_empty() {
                lines.push(format!("   description: {}", server.description));
            }
            if let Some(err) = &server.last_error {
                lines.push(format!("   error: {err}"));
            }
            if !server.tool_names.is_empty() {
                let shown = server.tool_names.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
                let more = if server.tool_names.len() > 5 { "..." } else { "" };
                lines.push(format!("   names: {shown}{more}"));
            }
        }
        lines.join("\n")
    }

    // ── System prompts ──

    /// System prompts of connected servers whose conditions match `ctx`,
    /// or `""` when none apply.
    pub async fn system_prompts(&self, ctx: &PromptContext) -> String {
        let servers = self.servers.read().await;
        let mut names: Vec<&String> = servers.keys().collect();
        names.sort();

        let blocks: Vec<String> = names
            .into_iter()
            .filter_map(|name| {
                let entry = servers.get(name)?;
                if entry.state != ConnectionState::Connected {
                    return None;
                }
                let prompt = entry.system_prompt.as_deref().map(str::trim).filter(|p| !p.is_empty())?;
                if let Some(conditions) = &entry.config.prompt_conditions {
                    if !conditions_match(conditions, ctx) {
                        return None;
                    }
                }
                Some(format!("[{name}]\n{prompt}"))
            })
            .collect();

        if blocks.is_empty() {
            return String::new();
        }
        format!("\n\n{PROMPTS_HEADER}\n{}", blocks.join("\n\n"))
    }

    /// Prompt of a connected server.
    pub async fn server_system_prompt(&self, name: &str) -> Option<String> {
        let servers = self.servers.read().await;
        let entry = servers.get(name)?;
        if entry.state != ConnectionState::Connected {
            return None;
        }
        entry.system_prompt.clone().filter(|p| !p.trim().is_empty())
    }

    /// Replace a server's prompt at runtime. `false` for unknown servers.
    pub async fn update_server_system_prompt(&self, name: &str, prompt: &str) -> bool {
        match self.servers.write().await.get_mut(name) {
            Some(entry) => {
                entry.system_prompt = Some(prompt.to_string());
                true
            }
            None => false,
        }
    }
}

/// A connected entry whose recorded tool names disagree with the index.
fn is_stale(server: &str, entry: &ServerEntry, tools: &HashMap<String, RemoteTool>) -> bool {
    let indexed = tools.values().filter(|t| t.server == server).count();
    indexed != entry.tool_names.len()
        || entry
            .tool_names
            .iter()
            .any(|name| tools.get(name).map(|t| t.server.as_str()) != Some(server))
}

/// Conditions only filter when both the condition and the matching piece of
/// context are present.
fn conditions_match(conditions: &PromptConditions, ctx: &PromptContext) -> bool {
    if let (Some(types), Some(message_type)) = (&conditions.message_types, &ctx.message_type) {
        if !types.iter().any(|t| t == message_type) {
            return false;
        }
    }
    if let (Some(groups), Some(group_id)) = (&conditions.groups, &ctx.group_id) {
        if !groups.iter().any(|g| g == group_id) {
            return false;
        }
    }
    if let (Some(keywords), Some(message)) = (&conditions.keywords, &ctx.message) {
        let message = message.to_lowercase();
        if !keywords.iter().any(|kw| message.contains(&kw.to_lowercase())) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolOutput;
    use crate::transport::mock::{MockFactory, MockServer};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn pipe(description: &str) -> McpServerConfig {
        McpServerConfig {
            enabled: true,
            command: Some("mock-server".into()),
            description: Some(description.into()),
            ..Default::default()
        }
    }

    fn manager(factory: Arc<MockFactory>) -> McpManager {
        McpManager::new(factory, Duration::from_secs(5))
    }

    #[test]
    fn test_prefix_helpers() {
        assert!(is_remote_tool("mcp_search"));
        assert!(!is_remote_tool("search"));
        assert_eq!(real_tool_name("mcp_search"), "search");
        assert_eq!(real_tool_name("search"), "search");
        assert_eq!(real_tool_name("mcp_mcp_x"), "mcp_x");
        assert_eq!(remote_tool_name("search"), "mcp_search");
    }

    #[tokio::test]
    async fn test_connect_indexes_tools() {
        let server = MockServer::with_tools(&["echo", "mixed"]);
        let mgr = manager(MockFactory::with(&[("fs", server)]));

        assert!(mgr.connect("fs", pipe("files")).await);

        assert!(mgr.is_known_tool("echo").await);
        assert!(mgr.is_known_tool("mcp_mixed").await);
        assert!(!mgr.is_known_tool("missing").await);
        assert_eq!(mgr.resolve_server("mcp_echo").await.as_deref(), Some("fs"));

        let info = mgr.servers_info().await;
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].state, ConnectionState::Connected);
        assert_eq!(info[0].tool_names.len(), 2);
        assert!(info[0].connected_at.is_some());
        assert!(info[0].last_error.is_none());

        let tool = mgr.tool_info("mcp_echo").await.unwrap();
        assert_eq!(tool.display_name(), "mcp_echo");
        assert_eq!(tool.server, "fs");
    }

    #[tokio::test]
    async fn test_pipe_without_command_fails_without_opening() {
        let factory = MockFactory::with(&[("fs", MockServer::with_tools(&["echo"]))]);
        let mgr = manager(factory.clone());

        let cfg = McpServerConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(!mgr.connect("fs", cfg).await);
        assert_eq!(factory.opened.load(Ordering::SeqCst), 0);

        let info = mgr.servers_info().await;
        assert_eq!(info[0].state, ConnectionState::Failed);
        assert!(info[0].last_error.as_deref().unwrap().contains("command"));
        assert_eq!(mgr.tool_count().await, 0);
    }

    #[tokio::test]
    async fn test_connect_failure_is_recorded() {
        let mgr = manager(MockFactory::with(&[]));
        assert!(!mgr.connect("ghost", pipe("")).await);

        let info = mgr.servers_info().await;
        assert_eq!(info[0].state, ConnectionState::Failed);
        assert!(info[0].last_error.as_deref().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_initialize_failure_closes_transport() {
        let server = MockServer::with_tools(&["echo"]);
        server.fail_initialize.store(true, Ordering::SeqCst);
        let mgr = manager(MockFactory::with(&[("fs", server.clone())]));

        assert!(!mgr.connect("fs", pipe("")).await);
        assert_eq!(server.closed.load(Ordering::SeqCst), 1);
        assert!(!mgr.is_known_tool("echo").await);
    }

    #[tokio::test]
    async fn test_register_replaces_previous_entries() {
        let server = MockServer::with_tools(&["a", "b"]);
        let mgr = manager(MockFactory::with(&[("fs", server.clone())]));
        assert!(mgr.connect("fs", pipe("")).await);

        server.set_tools(&["b", "c"]);
        let registered = mgr.register_server_tools("fs").await;
        let names: Vec<&str> = registered.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);

        assert!(!mgr.is_known_tool("a").await);
        assert!(mgr.is_known_tool("c").await);
        assert_eq!(mgr.servers_info().await[0].tool_names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_listing_keeps_connection() {
        let server = MockServer::with_tools(&["echo"]);
        server.fail_list.store(true, Ordering::SeqCst);
        let mgr = manager(MockFactory::with(&[("fs", server)]));

        assert!(mgr.connect("fs", pipe("")).await);
        assert_eq!(mgr.tool_count().await, 0);
        assert!(mgr.register_server_tools("fs").await.is_empty());
        assert_eq!(mgr.connected_servers().await, vec!["fs"]);
    }

    #[tokio::test]
    async fn test_connect_twice_replaces_connection() {
        let server = MockServer::with_tools(&["echo"]);
        let factory = MockFactory::with(&[("fs", server.clone())]);
        let mgr = manager(factory.clone());

        assert!(mgr.connect("fs", pipe("")).await);
        assert!(mgr.connect("fs", pipe("")).await);

        assert_eq!(factory.opened.load(Ordering::SeqCst), 2);
        assert_eq!(server.closed.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.tool_count().await, 1);
    }

    #[tokio::test]
    async fn test_name_collision_first_server_wins() {
        let mgr = manager(MockFactory::with(&[
            ("alpha", MockServer::with_tools(&["echo", "only_alpha"])),
            ("beta", MockServer::with_tools(&["echo", "only_beta"])),
        ]));
        assert!(mgr.connect("alpha", pipe("")).await);
        assert!(mgr.connect("beta", pipe("")).await);

        assert_eq!(mgr.resolve_server("echo").await.as_deref(), Some("alpha"));
        assert_eq!(mgr.resolve_server("only_beta").await.as_deref(), Some("beta"));

        let info = mgr.servers_info().await;
        assert_eq!(info[1].tool_names, vec!["only_beta"]);
    }

    #[tokio::test]
    async fn test_execute_forwards_arguments() {
        let server = MockServer::with_tools(&["echo", "mixed"]);
        let mgr = manager(MockFactory::with(&[("fs", server)]));
        mgr.connect("fs", pipe("")).await;

        let result = mgr.execute("mcp_echo", json!({"q": "hi"})).await.unwrap();
        assert_eq!(result.to_text(), r#"{"q":"hi"}"#);

        let mixed = mgr.execute("mixed", json!({})).await.unwrap();
        assert_eq!(mixed.content.len(), 2);
        assert!(mixed.to_text().starts_with("caption\n"));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let mgr = manager(MockFactory::with(&[]));
        let err = mgr.execute("mcp_nothing", json!({})).await.unwrap_err();
        assert_eq!(err, McpError::UnknownTool("nothing".into()));
    }

    #[tokio::test]
    async fn test_execute_on_non_connected_server() {
        let mgr = manager(MockFactory::with(&[("fs", MockServer::with_tools(&["echo"]))]));
        mgr.connect("fs", pipe("")).await;

        mgr.servers.write().await.get_mut("fs").unwrap().state = ConnectionState::Failed;

        let err = mgr.execute("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::ServerDisconnected { ref server, .. } if server == "fs"));
        assert!(!mgr.is_tool_available("echo").await);
    }

    #[tokio::test]
    async fn test_stream_end_moves_server_to_disconnected() {
        let mgr = manager(MockFactory::with(&[("fs", MockServer::with_tools(&["crash", "echo"]))]));
        mgr.connect("fs", pipe("")).await;

        let err = mgr.execute("crash", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::ServerDisconnected { .. }));

        let info = mgr.servers_info().await;
        assert_eq!(info[0].state, ConnectionState::Disconnected);
        assert_eq!(mgr.tool_count().await, 0);
        assert_eq!(
            mgr.execute("echo", json!({})).await.unwrap_err(),
            McpError::UnknownTool("echo".into())
        );
    }

    #[tokio::test]
    async fn test_stale_server_is_refreshed_before_use() {
        let server = MockServer::with_tools(&["echo"]);
        let mgr = manager(MockFactory::with(&[("fs", server.clone())]));
        mgr.connect("fs", pipe("")).await;

        server.set_tools(&["echo", "mixed"]);
        mgr.servers.write().await.get_mut("fs").unwrap().tool_names.clear();

        mgr.execute("echo", json!({})).await.unwrap();

        assert!(mgr.is_known_tool("mixed").await);
        assert_eq!(mgr.servers_info().await[0].tool_names, vec!["echo", "mixed"]);
    }

    #[tokio::test]
    async fn test_disconnect_and_reconnect() {
        let server = MockServer::with_tools(&["echo"]);
        let mgr = manager(MockFactory::with(&[("fs", server.clone())]));
        mgr.connect("fs", pipe("files")).await;

        assert!(mgr.disconnect("fs").await);
        assert!(!mgr.disconnect("fs").await);
        assert!(!mgr.is_known_tool("echo").await);
        assert_eq!(server.closed.load(Ordering::SeqCst), 1);

        let info = mgr.servers_info().await;
        assert_eq!(info[0].state, ConnectionState::Disconnected);
        assert_eq!(info[0].description, "files");

        assert!(mgr.reconnect("fs").await);
        assert!(mgr.is_known_tool("echo").await);
        assert!(!mgr.reconnect("unknown").await);
    }

    #[tokio::test]
    async fn test_disconnect_all_forgets_servers() {
        let mgr = manager(MockFactory::with(&[
            ("a", MockServer::with_tools(&["one"])),
            ("b", MockServer::with_tools(&["two"])),
        ]));
        mgr.connect("a", pipe("")).await;
        mgr.connect("b", pipe("")).await;

        mgr.disconnect_all().await;
        assert!(mgr.servers_info().await.is_empty());
        assert_eq!(mgr.tool_count().await, 0);
        assert_eq!(mgr.status_summary().await, "No remote tool-servers configured");
    }

    #[tokio::test]
    async fn test_reload_connects_enabled_servers_only() {
        let mgr = manager(MockFactory::with(&[
            ("a", MockServer::with_tools(&["one", "two"])),
            ("b", MockServer::with_tools(&["three"])),
        ]));

        let mut config = McpConfig::default();
        config.servers.insert("a".into(), pipe(""));
        let mut disabled = pipe("");
        disabled.enabled = false;
        config.servers.insert("b".into(), disabled);

        assert_eq!(mgr.reload(&config).await, 2);
        assert_eq!(mgr.connected_servers().await, vec!["a"]);

        config.servers.get_mut("b").unwrap().enabled = true;
        assert_eq!(mgr.reload(&config).await, 3);
    }

    #[tokio::test]
    async fn test_execute_batch_reports_each_call() {
        let mgr = manager(MockFactory::with(&[("fs", MockServer::with_tools(&["echo", "boom"]))]));
        mgr.connect("fs", pipe("")).await;

        let results = mgr
            .execute_batch(&[
                ("mcp_echo".into(), json!({"n": 1})),
                ("missing".into(), json!({})),
                ("boom".into(), json!({})),
            ])
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.as_deref().unwrap().contains("missing"));
        assert!(results[2].success);
        assert!(results[2].result.as_ref().unwrap().failed());
    }

    #[tokio::test]
    async fn test_health_check() {
        let healthy = MockServer::with_tools(&["one"]);
        let sick = MockServer::with_tools(&["two", "three"]);
        let mgr = manager(MockFactory::with(&[("a", healthy), ("b", sick.clone())]));
        mgr.connect("a", pipe("")).await;
        mgr.connect("b", pipe("")).await;

        sick.fail_list.store(true, Ordering::SeqCst);
        let report = mgr.health_check().await;

        assert_eq!(report.total_servers, 2);
        assert_eq!(report.total_tools, 3);
        assert_eq!(report.servers[0].status, HealthStatus::Healthy);
        assert_eq!(report.servers[0].tool_count, 1);
        assert_eq!(report.servers[1].status, HealthStatus::Unhealthy);
        assert!(report.servers[1].error.as_deref().unwrap().contains("listing failed"));
    }

    #[tokio::test]
    async fn test_system_prompts_respect_conditions() {
        let mgr = manager(MockFactory::with(&[
            ("music", MockServer::with_tools(&["play"])),
            ("notes", MockServer::with_tools(&["write"])),
            ("quiet", MockServer::with_tools(&["hush"])),
        ]));

        let mut music = pipe("");
        music.system_prompt = Some("  Use play for songs.  ".into());
        music.prompt_conditions = Some(PromptConditions {
            keywords: Some(vec!["Song".into()]),
            groups: Some(vec!["g1".into()]),
            ..Default::default()
        });
        let mut notes = pipe("");
        notes.system_prompt = Some("Use write to take notes.".into());
        mgr.connect("music", music).await;
        mgr.connect("notes", notes).await;
        mgr.connect("quiet", pipe("")).await;

        let ctx = PromptContext {
            group_id: Some("g1".into()),
            message: Some("play a SONG".into()),
            ..Default::default()
        };
        assert_eq!(
            mgr.system_prompts(&ctx).await,
            "\n\n[Remote tool-server capabilities]\n[music]\nUse play for songs.\n\n[notes]\nUse write to take notes."
        );

        let other_group = PromptContext {
            group_id: Some("g2".into()),
            message: Some("song".into()),
            ..Default::default()
        };
        let prompts = mgr.system_prompts(&other_group).await;
        assert!(!prompts.contains("[music]"));
        assert!(prompts.contains("[notes]"));

        // Absent context never filters.
        assert!(mgr.system_prompts(&PromptContext::default()).await.contains("[music]"));

        mgr.disconnect("notes").await;
        mgr.disconnect("music").await;
        assert_eq!(mgr.system_prompts(&ctx).await, "");
    }

    #[tokio::test]
    async fn test_server_prompt_accessors() {
        let mgr = manager(MockFactory::with(&[("fs", MockServer::with_tools(&["echo"]))]));
        mgr.connect("fs", pipe("")).await;

        assert_eq!(mgr.server_system_prompt("fs").await, None);
        assert!(mgr.update_server_system_prompt("fs", "Prefer echo.").await);
        assert_eq!(mgr.server_system_prompt("fs").await.as_deref(), Some("Prefer echo."));
        assert!(mgr.servers_info().await[0].has_system_prompt);
        assert!(!mgr.update_server_system_prompt("nope", "x").await);

        mgr.disconnect("fs").await;
        assert_eq!(mgr.server_system_prompt("fs").await, None);
    }

    #[tokio::test]
    async fn test_summaries() {
        let mgr = manager(MockFactory::with(&[(
            "fs",
            MockServer::with_tools(&["a", "b", "c", "d", "e", "f"]),
        )]));
        assert_eq!(mgr.tool_summary().await, "No remote tools loaded");

        mgr.connect("fs", pipe("files")).await;

        assert_eq!(mgr.tool_summary().await, "fs (stdio): 6 tools (a, b, c, d, e, f)");

        let description = mgr.tools_description().await;
        assert_eq!(description.lines().next(), Some("mcp_a: [fs] a tool"));
        assert_eq!(description.lines().count(), 6);

        let status = mgr.status_summary().await;
        assert!(status.contains("fs [connected]"));
        assert!(status.contains("type: stdio"));
        assert!(status.contains("description: files"));
        assert!(status.contains("names: a, b, c, d, e..."));
    }
}

//! Tool Registry: the set of in-process tools the agent may offer.
//!
//! Remote tools are owned by the `McpManager`; this registry only ever holds
//! local tools, and refuses names that would be mistaken for remote ones.

use std::collections::HashMap;
use std::sync::Arc;

use relaybot_core::error::ToolError;
use relaybot_core::types::ToolDefinition;
use relaybot_mcp::is_remote_tool;
use tracing::{info, warn};

use super::base::Tool;

// ─────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────

/// Stores local tools keyed by name and dispatches calls.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::builtin::EchoTool));
        registry.register(Arc::new(super::builtin::CurrentTimeTool));
        registry
    }

    /// Register a tool, replacing any previous tool with the same name.
    ///
    /// Returns `false` (and registers nothing) for names carrying the remote prefix.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        if is_remote_tool(tool.name()) {
            warn!(tool = tool.name(), "local tool name uses the remote prefix, rejected");
            return false;
        }
        info!(tool = tool.name(), "registered tool");
        self.tools.insert(tool.name().to_string(), tool);
        true
    }

    /// Unregister a tool by name. Returns the removed tool, if any.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        let removed = self.tools.remove(name);
        if removed.is_some() {
            info!(tool = name, "unregistered tool");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names of all registered tools, sorted for determinism.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tools named in `allow_list`, in allow-list order. Unknown names are
    /// dropped with a warning; an empty list selects every registered tool.
    pub fn select(&self, allow_list: &[String]) -> Vec<Arc<dyn Tool>> {
        if allow_list.is_empty() {
            return self
                .tool_names()
                .iter()
                .filter_map(|name| self.tools.get(name).cloned())
                .collect();
        }

        let mut selected: Vec<Arc<dyn Tool>> = Vec::with_capacity(allow_list.len());
        for name in allow_list {
            match self.tools.get(name) {
                Some(tool) if !selected.iter().any(|t| t.name() == name.as_str()) => {
                    selected.push(tool.clone())
                }
                Some(_) => {}
                None => warn!(tool = %name, "allow-listed tool is not registered, skipping"),
            }
        }
        selected
    }

    /// Definitions for the tools [`select`](Self::select) returns.
    pub fn definitions_for(&self, allow_list: &[String]) -> Vec<ToolDefinition> {
        self.select(allow_list).iter().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool by name with parsed arguments.
    pub async fn execute(
        &self,
        name: &str,
        params: HashMap<String, serde_json::Value>,
    ) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tool.execute(params).await.map_err(|e| {
            warn!(tool = name, error = %e, "tool execution failed");
            ToolError::execution(name, e)
        })
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

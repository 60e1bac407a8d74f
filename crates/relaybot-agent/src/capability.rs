//! Capabilities: local tools and remote tools behind one descriptor.
//!
//! A [`CapabilitySet`] is the active tool set of one session. Names are unique
//! within a set; remote names carry the `mcp_` prefix, so local and remote
//! tools cannot shadow each other.

use serde_json::{json, Value};
use tracing::warn;

use relaybot_core::schema::sanitize_schema;
use relaybot_core::types::ToolDefinition;
use relaybot_mcp::{McpManager, RemoteTool};

use crate::tools::{Tool, ToolRegistry};

/// Where a capability executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote { server: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    /// Name the model calls (`mcp_`-prefixed for remote tools).
    pub name: String,
    pub description: String,
    /// Raw parameter schema as declared by the tool.
    pub parameters: Value,
    pub origin: Origin,
}

impl Capability {
    pub fn local(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters(),
            origin: Origin::Local,
        }
    }

    pub fn remote(tool: &RemoteTool) -> Self {
        Self {
            name: tool.display_name(),
            description: tool.description.clone().unwrap_or_default(),
            parameters: tool.input_schema.clone(),
            origin: Origin::Remote {
                server: tool.server.clone(),
            },
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.origin, Origin::Remote { .. })
    }

    pub fn server(&self) -> Option<&str> {
        match &self.origin {
            Origin::Remote { server } => Some(server),
            Origin::Local => None,
        }
    }

    /// Wire descriptor with a sanitized schema. Tools that declare no schema
    /// get an empty object schema.
    pub fn to_definition(&self) -> ToolDefinition {
        let parameters = match sanitize_schema(&self.parameters) {
            Value::Null => json!({ "type": "object", "properties": {}, "required": [] }),
            schema => schema,
        };
        ToolDefinition::new(&self.name, &self.description, parameters)
    }
}

/// Name-unique collection of capabilities, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilitySet {
    capabilities: Vec<Capability>,
}

impl CapabilitySet {
    /// Build a set; on duplicate names the first capability wins.
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let mut set = Self::default();
        for capability in capabilities {
            if set.contains(&capability.name) {
                warn!(tool = %capability.name, "duplicate capability name, keeping the first");
                continue;
            }
            set.capabilities.push(capability);
        }
        set
    }

    /// Allow-listed local tools followed by every indexed remote tool.
    pub async fn assemble(
        registry: &ToolRegistry,
        allow_list: &[String],
        mcp: Option<&McpManager>,
    ) -> Self {
        let local = registry
            .select(allow_list)
            .into_iter()
            .map(|tool| Capability::local(tool.as_ref()));

        let remote = match mcp {
            Some(manager) => manager.remote_tools().await,
            None => Vec::new(),
        };

        Self::new(local.chain(remote.iter().map(Capability::remote)))
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// A set holding only `name`, if present.
    pub fn pinned(&self, name: &str) -> Option<CapabilitySet> {
        self.get(name).map(|c| CapabilitySet {
            capabilities: vec![c.clone()],
        })
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.capabilities.iter().map(Capability::to_definition).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

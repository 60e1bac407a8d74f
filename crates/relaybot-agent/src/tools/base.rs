//! Tool trait: the interface every in-process tool implements.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use relaybot_core::types::ToolDefinition;

// ─────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────

/// Every local tool implements this trait.
///
/// The capability assembly reads `name()`, `description()` and
/// `parameters()`; the invocation loop dispatches calls via `execute()`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used by the model to call this tool (e.g. `"current_time"`).
    ///
    /// Must not start with the remote prefix `mcp_`.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema describing the parameters.
    fn parameters(&self) -> Value;

    /// Execute the tool with already-parsed arguments.
    ///
    /// Returns the output the model reads. An `Err` becomes a failed tool
    /// result; it never ends the turn.
    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String>;

    /// Build the `ToolDefinition` sent to the model (schema unsanitized).
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

// ─────────────────────────────────────────────
// Param helpers
// ─────────────────────────────────────────────

/// Extract a required `String` param, returning a model-readable error.
pub fn require_string(params: &HashMap<String, Value>, key: &str) -> anyhow::Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}

/// Extract an optional `String` param.
pub fn optional_string(params: &HashMap<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_string() {
        let mut params = HashMap::new();
        params.insert("text".into(), json!("hello"));
        assert_eq!(require_string(&params, "text").unwrap(), "hello");

        params.insert("count".into(), json!(42));
        assert!(require_string(&params, "count").is_err());
        assert!(require_string(&params, "missing")
            .unwrap_err()
            .to_string()
            .contains("missing"));
    }

    #[test]
    fn test_optional_string() {
        let mut params = HashMap::new();
        params.insert("format".into(), json!("%H:%M"));
        assert_eq!(optional_string(&params, "format"), Some("%H:%M".into()));
        assert_eq!(optional_string(&params, "other"), None);
    }

    #[tokio::test]
    async fn test_to_definition_default() {
        struct DummyTool;

        #[async_trait]
        impl Tool for DummyTool {
            fn name(&self) -> &str { "dummy" }
            fn description(&self) -> &str { "A test tool" }
            fn parameters(&self) -> Value {
                json!({ "type": "object", "properties": { "msg": { "type": "string" } } })
            }
            async fn execute(&self, _params: HashMap<String, Value>) -> anyhow::Result<String> {
                Ok("ok".into())
            }
        }

        let def = DummyTool.to_definition();
        assert_eq!(def.function.name, "dummy");
        assert_eq!(def.function.description, "A test tool");
        assert_eq!(def.tool_type, "function");
    }
}

//! Built-in local tools.
//!
//! Business tools live behind tool-servers; these two exist so a fresh
//! install has something local to call and so the loop can be smoke-tested.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::base::{optional_string, require_string, Tool};

/// Returns its `text` argument unchanged.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given text unchanged. Useful for checking that tool calls work."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to echo back" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        require_string(&params, "text")
    }
}

/// Current UTC date and time.
pub struct CurrentTimeTool;

const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in UTC."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "description": "strftime-style format",
                    "default": DEFAULT_TIME_FORMAT
                }
            }
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        use std::fmt::Write;

        let format = optional_string(&params, "format").unwrap_or_else(|| DEFAULT_TIME_FORMAT.into());
        let mut out = String::new();
        // chrono reports an invalid format string as a fmt::Error
        write!(out, "{}", Utc::now().format(&format))
            .map_err(|_| anyhow::anyhow!("Invalid time format: {format}"))?;
        Ok(out)
    }
}

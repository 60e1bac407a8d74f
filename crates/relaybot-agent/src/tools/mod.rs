//! Local tools for the Relaybot agent.

pub mod base;
pub mod builtin;
pub mod registry;

pub use base::{optional_string, require_string, Tool};
pub use builtin::{CurrentTimeTool, EchoTool};
pub use registry::ToolRegistry;

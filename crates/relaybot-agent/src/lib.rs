//! Relaybot Agent: capabilities, sessions and the invocation loop.
//!
//! This crate contains:
//! - **tools**: local `Tool` trait, registry and built-in tools
//! - **capability**: local and remote tools under one descriptor
//! - **session**: per-turn state and the store that hands sessions out
//! - **context**: system prompt and message list construction
//! - **orchestrator**: the multi-round model ↔ tool loop
//! - **agent_loop**: bus-driven front door tying it all together

pub mod agent_loop;
pub mod capability;
pub mod context;
pub mod orchestrator;
pub mod session;
pub mod tools;

pub use agent_loop::AgentLoop;
pub use capability::{Capability, CapabilitySet, Origin};
pub use context::ContextBuilder;
pub use orchestrator::{Orchestrator, OrchestratorConfig, ToolCallResult, TurnOutcome};
pub use session::{Session, SessionStore};
pub use tools::{Tool, ToolRegistry};

//! Relaybot core: shared types and leaf components.
//!
//! - **types**: chat-completion wire types (messages, tool calls, tool definitions)
//! - **error**: provider and tool error taxonomy
//! - **schema**: JSON-Schema sanitizer for tool parameter schemas
//! - **limiter**: FIFO concurrency limiter
//! - **config**: JSON config schema, loader and env overrides
//! - **bus**: inbound/outbound message types

pub mod bus;
pub mod config;
pub mod error;
pub mod limiter;
pub mod schema;
pub mod types;
pub mod utils;

pub use error::{ProviderError, ToolError};
pub use limiter::ConcurrencyLimiter;
pub use schema::sanitize_schema;

//! Remote tool-server error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum McpError {
    /// The server entry cannot be used as written (e.g. pipe without `command`).
    #[error("invalid config for server '{server}': {reason}")]
    Config { server: String, reason: String },

    /// Spawning, connecting or writing to the transport failed.
    #[error("connection to server '{server}' failed: {reason}")]
    Connection { server: String, reason: String },

    /// Malformed or unexpected message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with a JSON-RPC error object.
    #[error("server error [{code}]: {message}")]
    Server { code: i64, message: String },

    #[error("'{method}' timed out after {secs}s")]
    Timeout { method: String, secs: u64 },

    /// The transport hit end-of-stream; the connection is gone.
    #[error("server '{0}' closed the connection")]
    Closed(String),

    #[error("unknown remote tool: {0}")]
    UnknownTool(String),

    #[error("server '{server}' is not connected (tool '{tool}')")]
    ServerDisconnected { server: String, tool: String },
}

impl McpError {
    pub(crate) fn connection(server: impl Into<String>, reason: impl ToString) -> Self {
        McpError::Connection {
            server: server.into(),
            reason: reason.to_string(),
        }
    }
}

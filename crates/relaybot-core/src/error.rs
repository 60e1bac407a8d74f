//! Error taxonomy shared by the provider, remote-server and agent crates.
//!
//! Only an exhausted [`ProviderError`] ends an invocation loop. Every
//! [`ToolError`] is local to one tool call and is reported back to the model
//! as a failed tool result.

use thiserror::Error;

/// Failure of a single chat-completion request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    /// Network / connection level failure (including client-side timeouts).
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-2xx HTTP status.
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Body could not be decoded as a chat completion.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A 2xx body that carries an `error` / `detail` payload.
    #[error("API error: {0}")]
    Api(String),

    /// A well-formed response whose `choices` array is empty.
    #[error("response contained no choices")]
    NoChoice,
}

impl ProviderError {
    /// Whether the invocation loop should spend a retry on this failure.
    ///
    /// An empty `choices` array is an answer, not a transport problem.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::NoChoice)
    }
}

/// Failure of a single tool call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("server '{server}' is not connected (tool '{tool}')")]
    ServerDisconnected { server: String, tool: String },

    #[error("invalid arguments for '{tool}': {reason}")]
    ArgumentParse { tool: String, reason: String },

    #[error("'{tool}' failed: {reason}")]
    Execution { tool: String, reason: String },
}

impl ToolError {
    /// Convenience constructor for execution failures.
    pub fn execution(tool: impl Into<String>, reason: impl ToString) -> Self {
        ToolError::Execution {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_choice_is_not_retryable() {
        assert!(!ProviderError::NoChoice.is_retryable());
        assert!(ProviderError::Transport("reset".into()).is_retryable());
        assert!(ProviderError::Status { status: 429, body: "slow down".into() }.is_retryable());
    }

    #[test]
    fn test_tool_error_messages() {
        let err = ToolError::ServerDisconnected {
            server: "weather".into(),
            tool: "forecast".into(),
        };
        assert_eq!(err.to_string(), "server 'weather' is not connected (tool 'forecast')");

        let err = ToolError::execution("echo", "boom");
        assert_eq!(err.to_string(), "'echo' failed: boom");
    }
}

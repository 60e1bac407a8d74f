//! Bus event types: messages flowing between a front end and the agent loop.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// An inbound message for the agent.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// Front-end name (e.g. "cli", "http").
    pub channel: String,
    /// Sender identifier within the channel.
    pub sender_id: String,
    /// Chat/conversation identifier.
    pub chat_id: String,
    /// Text content of the message.
    pub content: String,
    /// Conversation kind reported by the front end (e.g. "private", "group").
    pub message_type: Option<String>,
    /// Group identifier for group conversations.
    pub group_id: Option<String>,
    /// Tool the caller wants forced on the first round.
    pub forced_tool: Option<String>,
    /// When the message was received.
    pub timestamp: DateTime<Utc>,
    /// Channel-specific metadata.
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    /// Create a new inbound message with minimal required fields.
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        InboundMessage {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            message_type: None,
            group_id: None,
            forced_tool: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Mark this message as coming from a group conversation.
    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.message_type = Some("group".to_string());
        self.group_id = Some(group_id.into());
        self
    }

    /// Force `tool` on the first completion request.
    pub fn with_forced_tool(mut self, tool: impl Into<String>) -> Self {
        self.forced_tool = Some(tool.into());
        self
    }

    /// Key combining channel and chat_id (e.g. "cli:default").
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

/// An outbound message from the agent.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    /// Target channel name.
    pub channel: String,
    /// Target chat/conversation identifier.
    pub chat_id: String,
    /// Text content to send.
    pub content: String,
    /// Name of the last tool whose result fed this reply.
    pub last_tool_used: Option<String>,
    /// Channel-specific metadata.
    pub metadata: HashMap<String, String>,
}

impl OutboundMessage {
    /// Create a new outbound message.
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        OutboundMessage {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            last_tool_used: None,
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_creation() {
        let msg = InboundMessage::new("cli", "user_42", "chat_99", "Hello Relaybot!");

        assert_eq!(msg.channel, "cli");
        assert_eq!(msg.sender_id, "user_42");
        assert_eq!(msg.chat_id, "chat_99");
        assert_eq!(msg.content, "Hello Relaybot!");
        assert!(msg.message_type.is_none());
        assert!(msg.forced_tool.is_none());
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn test_session_key() {
        let msg = InboundMessage::new("http", "user_1", "channel_abc", "test");
        assert_eq!(msg.session_key(), "http:channel_abc");
    }

    #[test]
    fn test_group_and_forced_tool_builders() {
        let msg = InboundMessage::new("cli", "u", "c", "draw a mind map")
            .in_group("12345")
            .with_forced_tool("mindMapTool");

        assert_eq!(msg.message_type.as_deref(), Some("group"));
        assert_eq!(msg.group_id.as_deref(), Some("12345"));
        assert_eq!(msg.forced_tool.as_deref(), Some("mindMapTool"));
    }

    #[test]
    fn test_outbound_message_creation() {
        let msg = OutboundMessage::new("cli", "chat_99", "Here's your answer!");

        assert_eq!(msg.channel, "cli");
        assert_eq!(msg.chat_id, "chat_99");
        assert_eq!(msg.content, "Here's your answer!");
        assert!(msg.last_tool_used.is_none());
    }
}

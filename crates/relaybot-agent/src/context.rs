//! Context builder: constructs the system prompt and the message list for
//! one turn.
//!
//! The system prompt is the configured base prompt, a timestamp, a listing of
//! the active tools, and whatever system prompts the connected tool-servers
//! contribute for this message.

use chrono::Utc;
use relaybot_core::types::Message;

use crate::capability::{CapabilitySet, Origin};

/// Builds system prompts and conversation message lists for the agent loop.
pub struct ContextBuilder {
    /// Base system prompt from config.
    system_prompt: String,
    /// Non-system history messages kept per request.
    max_history: usize,
}

impl ContextBuilder {
    pub fn new(system_prompt: impl Into<String>, max_history: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_history,
        }
    }

    // ────────────── System prompt ──────────────

    /// Full system prompt. `server_prompts` is appended verbatim (it carries
    /// its own leading separator, or is empty).
    pub fn build_system_prompt(&self, tools: &CapabilitySet, server_prompts: &str) -> String {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let mut prompt = format!("{}\n\nCurrent time: {now}", self.system_prompt.trim());

        let tools_description = Self::describe_tools(tools);
        if !tools_description.is_empty() {
            prompt.push_str("\n\n# Tools\n\n");
            prompt.push_str(&tools_description);
        }

        prompt.push_str(server_prompts);
        prompt
    }

    /// "Local tools" and "Remote tools" sections, each omitted when empty.
    /// Remote entries read `mcp_name: [server] description`.
    pub fn describe_tools(tools: &CapabilitySet) -> String {
        let mut local = Vec::new();
        let mut remote = Vec::new();
        for capability in tools.iter() {
            match &capability.origin {
                Origin::Local => local.push(format!("{}: {}", capability.name, capability.description)),
                Origin::Remote { server } => remote.push(format!(
                    "{}: [{server}] {}",
                    capability.name, capability.description
                )),
            }
        }

        let mut sections = Vec::new();
        if !local.is_empty() {
            sections.push(format!("Local tools:\n{}", local.join("\n")));
        }
        if !remote.is_empty() {
            sections.push(format!("Remote tools:\n{}", remote.join("\n")));
        }
        sections.join("\n\n")
    }

    // ────────────── Messages ──────────────

    /// `[system, ...trimmed history, user]`.
    pub fn build_messages(
        &self,
        system_prompt: String,
        history: &[Message],
        user_content: &str,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system_prompt));
        messages.extend(trim_history(history, self.max_history));
        messages.push(Message::user(user_content));
        messages
    }
}

/// Keep every system message plus the last `max` non-system messages, in
/// their original order.
pub fn trim_history(history: &[Message], max: usize) -> Vec<Message> {
    let non_system = history.iter().filter(|m| !m.is_system()).count();
    let mut skip = non_system.saturating_sub(max);

    history
        .iter()
        .filter(|message| {
            if message.is_system() {
                return true;
            }
            if skip > 0 {
                skip -= 1;
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::tools::EchoTool;
    use relaybot_mcp::RemoteTool;
    use serde_json::json;

    fn tools() -> CapabilitySet {
        CapabilitySet::new(vec![
            Capability::local(&EchoTool),
            Capability::remote(&RemoteTool {
                server: "weather".into(),
                name: "forecast".into(),
                description: Some("Daily forecast".into()),
                input_schema: json!({"type": "object"}),
            }),
        ])
    }

    #[test]
    fn test_describe_tools_sections() {
        let text = ContextBuilder::describe_tools(&tools());
        assert!(text.starts_with("Local tools:\necho: "));
        assert!(text.ends_with("Remote tools:\nmcp_forecast: [weather] Daily forecast"));
        assert_eq!(ContextBuilder::describe_tools(&CapabilitySet::default()), "");
    }

    #[test]
    fn test_system_prompt_layout() {
        let builder = ContextBuilder::new("You are a test bot.  ", 10);
        let prompt = builder.build_system_prompt(&tools(), "\n\n[Remote tool-server capabilities]\n[weather]\nBe brief.");

        assert!(prompt.starts_with("You are a test bot.\n\nCurrent time: "));
        assert!(prompt.contains("# Tools\n\nLocal tools:"));
        assert!(prompt.ends_with("[weather]\nBe brief."));

        let bare = builder.build_system_prompt(&CapabilitySet::default(), "");
        assert!(!bare.contains("# Tools"));
    }

    #[test]
    fn test_build_messages_order() {
        let builder = ContextBuilder::new("base", 10);
        let history = vec![Message::user("earlier"), Message::assistant("reply")];
        let messages = builder.build_messages("sys".into(), &history, "now");

        assert_eq!(
            messages,
            vec![
                Message::system("sys"),
                Message::user("earlier"),
                Message::assistant("reply"),
                Message::user("now"),
            ]
        );
    }

    #[test]
    fn test_trim_history_keeps_system_messages() {
        let history = vec![
            Message::system("pinned"),
            Message::user("1"),
            Message::assistant("2"),
            Message::user("3"),
            Message::assistant("4"),
        ];

        let trimmed = trim_history(&history, 2);
        assert_eq!(
            trimmed,
            vec![Message::system("pinned"), Message::user("3"), Message::assistant("4")]
        );
        assert_eq!(trim_history(&history, 10), history);
        assert_eq!(trim_history(&history, 0), vec![Message::system("pinned")]);
    }
}

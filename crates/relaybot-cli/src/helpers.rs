//! Shared CLI helpers: path expansion, chat targets, response printing.

use std::path::PathBuf;

use colored::Colorize;

use relaybot_core::bus::types::InboundMessage;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Channel and chat id parsed from a `channel:id` session string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTarget {
    pub channel: String,
    pub chat_id: String,
}

impl ChatTarget {
    /// `"cli:direct"` → (`cli`, `direct`). A bare id goes on the `cli` channel.
    pub fn parse(session: &str) -> Self {
        match session.split_once(':') {
            Some((channel, chat_id)) if !channel.is_empty() && !chat_id.is_empty() => Self {
                channel: channel.to_string(),
                chat_id: chat_id.to_string(),
            },
            _ => Self {
                channel: "cli".to_string(),
                chat_id: session.trim_matches(':').to_string(),
            },
        }
    }

    pub fn inbound(&self, text: &str, forced_tool: Option<&str>) -> InboundMessage {
        let msg = InboundMessage::new(&self.channel, "user", &self.chat_id, text);
        match forced_tool {
            Some(tool) => msg.with_forced_tool(tool),
            None => msg,
        }
    }
}

/// Print an agent response to stdout.
pub fn print_response(response: &str, last_tool_used: Option<&str>) {
    println!();
    println!("{}", "Relaybot".cyan().bold());
    if response.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{response}");
    }
    if let Some(tool) = last_tool_used {
        println!("{}", format!("(last tool: {tool})").dimmed());
    }
    println!();
}

/// Print the banner shown at REPL start.
pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Relaybot".cyan().bold(), version.dimmed());
    println!("{}", "Type a message, or \"exit\" to quit.".dimmed());
    println!();
}

/// Print a "thinking" placeholder (for non-log mode).
pub fn print_thinking() {
    eprint!("{}", "thinking...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_home() {
        let result = expand_tilde("~/foo/bar");
        assert!(result.ends_with("foo/bar"));
        assert!(!result.starts_with("~"));
    }

    #[test]
    fn expand_tilde_no_tilde() {
        assert_eq!(expand_tilde("/absolute/path"), PathBuf::from("/absolute/path"));
        assert_eq!(expand_tilde("relative/path"), PathBuf::from("relative/path"));
    }

    #[test]
    fn chat_target_parsing() {
        assert_eq!(
            ChatTarget::parse("http:room-7"),
            ChatTarget {
                channel: "http".into(),
                chat_id: "room-7".into()
            }
        );
        assert_eq!(ChatTarget::parse("solo").channel, "cli");
        assert_eq!(ChatTarget::parse("solo").chat_id, "solo");
        assert_eq!(ChatTarget::parse(":x").channel, "cli");
    }

    #[test]
    fn chat_target_builds_inbound() {
        let target = ChatTarget::parse("cli:direct");
        let msg = target.inbound("hi", Some("echo"));
        assert_eq!(msg.session_key(), "cli:direct");
        assert_eq!(msg.forced_tool.as_deref(), Some("echo"));
        assert!(target.inbound("hi", None).forced_tool.is_none());
    }
}

//! Agent loop: turns inbound messages into replies.
//!
//! Each message gets its own [`Session`](crate::session::Session): the active
//! tool set is assembled, the system prompt is built (including any server
//! prompts that apply to this message), and the [`Orchestrator`] runs the
//! turn. The reply, or a fixed notice when the turn produced no answer, is
//! returned as an [`OutboundMessage`] for the front end to deliver.

use std::sync::Arc;

use tracing::{debug, info, warn};

use relaybot_core::bus::types::{InboundMessage, OutboundMessage};
use relaybot_core::config::AgentDefaults;
use relaybot_core::limiter::ConcurrencyLimiter;
use relaybot_core::types::Message;
use relaybot_mcp::{McpManager, PromptContext};
use relaybot_providers::traits::LlmProvider;

use crate::capability::CapabilitySet;
use crate::context::ContextBuilder;
use crate::orchestrator::{Orchestrator, OrchestratorConfig, TurnOutcome};
use crate::session::SessionStore;
use crate::tools::ToolRegistry;

/// Sent instead of a reply when a turn ends without an answer.
pub const NO_ANSWER_NOTICE: &str = "Sorry, I couldn't come up with an answer this time. Please try again.";

// ─────────────────────────────────────────────
// AgentLoop
// ─────────────────────────────────────────────

pub struct AgentLoop {
    registry: Arc<ToolRegistry>,
    mcp: Option<Arc<McpManager>>,
    /// Local tool allow-list (empty = all).
    allow_list: Vec<String>,
    context: ContextBuilder,
    sessions: SessionStore,
    orchestrator: Orchestrator,
}

impl AgentLoop {
    /// An empty `defaults.model` falls back to the provider's default model.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: ToolRegistry,
        mcp: Option<Arc<McpManager>>,
        defaults: &AgentDefaults,
    ) -> Self {
        let registry = Arc::new(registry);

        let mut config = OrchestratorConfig::from(defaults);
        if config.model.trim().is_empty() {
            config.model = provider.default_model().to_string();
        }

        info!(
            model = %config.model,
            provider = provider.display_name(),
            local_tools = registry.len(),
            remote = mcp.is_some(),
            max_rounds = config.max_rounds,
            "agent loop initialized"
        );

        let orchestrator = Orchestrator::new(
            provider,
            registry.clone(),
            mcp.clone(),
            ConcurrencyLimiter::new(defaults.concurrent_limit),
            config,
        );

        Self {
            registry,
            mcp,
            allow_list: defaults.tools.clone(),
            context: ContextBuilder::new(&defaults.system_prompt, defaults.max_history),
            sessions: SessionStore::new(defaults.max_history),
            orchestrator,
        }
    }

    /// Run one turn for `msg` and build the reply.
    pub async fn process_message(&self, msg: &InboundMessage) -> OutboundMessage {
        let key = msg.session_key();

        let tools = CapabilitySet::assemble(&self.registry, &self.allow_list, self.mcp.as_deref()).await;
        let server_prompts = match &self.mcp {
            Some(mcp) => {
                let ctx = PromptContext {
                    message_type: msg.message_type.clone(),
                    group_id: msg.group_id.clone(),
                    message: Some(msg.content.clone()),
                };
                mcp.system_prompts(&ctx).await
            }
            None => String::new(),
        };

        let system_prompt = self.context.build_system_prompt(&tools, &server_prompts);
        let history = self.sessions.history(&key);
        let messages = self.context.build_messages(system_prompt, &history, &msg.content);

        let mut session = self.sessions.begin(&key, tools, messages);
        debug!(
            session = %session.id(),
            tools = session.active_tools.len(),
            "session started"
        );

        let outcome = self.orchestrator.run(&mut session, msg.forced_tool.as_deref()).await;
        let last_tool_used = session.last_tool_used.clone();

        let content = match outcome {
            TurnOutcome::Reply(reply) => {
                self.sessions.finish(
                    session,
                    Some((Message::user(&msg.content), Message::assistant(&reply))),
                );
                reply
            }
            TurnOutcome::NoAnswer { reason } => {
                warn!(session_key = %key, reason = %reason, "no answer produced");
                self.sessions.finish(session, None);
                NO_ANSWER_NOTICE.to_string()
            }
        };

        let mut response = OutboundMessage::new(&msg.channel, &msg.chat_id, content);
        response.last_tool_used = last_tool_used;
        response
    }

    /// CLI entry point: one message on the `cli:direct` conversation.
    pub async fn process_direct(&self, text: &str) -> String {
        let msg = InboundMessage::new("cli", "user", "direct", text);
        self.process_message(&msg).await.content
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn model(&self) -> &str {
        &self.orchestrator.config().model
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

//! LLM Provider trait.
//!
//! `HttpProvider` covers every OpenAI-compatible API; tests substitute
//! scripted implementations.

use async_trait::async_trait;
use relaybot_core::error::ProviderError;
use relaybot_core::types::{LlmResponse, Message, ToolChoice, ToolDefinition};

/// Sampling parameters passed to each LLM call.
#[derive(Clone, Debug, PartialEq)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Nucleus sampling.
    pub top_p: f64,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

impl From<&relaybot_core::config::AgentDefaults> for LlmRequestConfig {
    fn from(defaults: &relaybot_core::config::AgentDefaults) -> Self {
        Self {
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            top_p: defaults.top_p,
        }
    }
}

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// # Arguments
    /// * `messages`   : Conversation in OpenAI format.
    /// * `tools`      : Tool definitions the model may call; `None` sends no `tools` field.
    /// * `tool_choice`: `auto`, `none`, or a forced function.
    /// * `model`      : Model identifier (e.g. `"gpt-4o"`).
    /// * `config`     : Temperature, top_p, max_tokens.
    ///
    /// # Returns
    /// The first choice, or a [`ProviderError`] the caller may retry.
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        tool_choice: Option<ToolChoice>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError>;

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}

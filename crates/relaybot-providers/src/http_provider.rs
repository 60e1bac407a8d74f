//! Generic HTTP-based LLM provider for OpenAI-compatible APIs.
//!
//! Talks directly to any `/chat/completions` endpoint (OpenAI, OpenRouter,
//! DeepSeek, vLLM, one-api style gateways, …).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, error, warn};

use relaybot_core::config::ProviderConfig;
use relaybot_core::error::ProviderError;
use relaybot_core::types::{
    ChatCompletionRequest, ChatCompletionResponse, LlmResponse, Message, ToolChoice,
    ToolDefinition,
};

use crate::traits::{LlmProvider, LlmRequestConfig};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

// ─────────────────────────────────────────────
// HttpProvider
// ─────────────────────────────────────────────

/// A generic LLM provider that talks to any OpenAI-compatible HTTP API.
pub struct HttpProvider {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://api.openai.com/v1"`).
    api_base: String,
    /// API key for Bearer authentication. Empty for keyless local servers.
    api_key: String,
    /// Default model for this provider instance.
    default_model: String,
    /// Extra headers to send with each request.
    extra_headers: HeaderMap,
    /// Host of `api_base`, used in logs.
    display_name: String,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl HttpProvider {
    /// Create a new HttpProvider.
    ///
    /// # Arguments
    /// * `config`: api_key, api_base, extra_headers, timeout
    /// * `model` : The default model to use
    pub fn new(config: &ProviderConfig, model: &str) -> Result<Self, ProviderError> {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = config.extra_headers {
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    extra_headers.insert(name, val);
                } else {
                    warn!("Invalid header: {}={}", key, value);
                }
            }
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let display_name = reqwest::Url::parse(&api_base)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_else(|| api_base.clone());

        Ok(HttpProvider {
            client,
            api_base,
            api_key: config.api_key.clone(),
            default_model: model.to_string(),
            extra_headers,
            display_name,
        })
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        tool_choice: Option<ToolChoice>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError> {
        debug!(
            provider = %self.display_name,
            model = %model,
            messages = messages.len(),
            tools = tools.map_or(0, |t| t.len()),
            tool_choice = ?tool_choice,
            "Calling LLM"
        );

        let request_body = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: Some(config.max_tokens),
            tools: tools.map(|t| t.to_vec()),
            tool_choice,
        };

        let mut request = self
            .client
            .post(self.completions_url())
            .headers(self.extra_headers.clone())
            .json(&request_body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = %self.display_name, error = %e, "HTTP request failed");
            ProviderError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(
                provider = %self.display_name,
                status = %status,
                body = %body,
                "API error"
            );
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat_resp = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| {
                error!(provider = %self.display_name, error = %e, "Failed to parse LLM response");
                ProviderError::Decode(e.to_string())
            })?;

        let llm_resp = chat_resp.into_response()?;
        debug!(
            provider = %self.display_name,
            has_content = llm_resp.content.is_some(),
            tool_calls = llm_resp.tool_calls.len(),
            finish_reason = llm_resp.finish_reason.as_deref().unwrap_or("?"),
            "LLM response received"
        );
        Ok(llm_resp)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}

// ─────────────────────────────────────────────
// Builder (convenience)
// ─────────────────────────────────────────────

/// Build an HttpProvider from the `provider` config section.
///
/// A missing API key is only accepted when a custom `apiBase` points at a
/// keyless server (vLLM, Ollama, …).
pub fn create_provider(config: &ProviderConfig, model: &str) -> anyhow::Result<HttpProvider> {
    if !config.is_configured() && config.api_base.is_none() {
        anyhow::bail!(
            "No API key configured for model '{}'. \
             Set provider.apiKey in config.json or RELAYBOT_PROVIDER__API_KEY.",
            model
        );
    }

    debug!(
        model = model,
        api_base = config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE),
        "Creating LLM provider"
    );

    Ok(HttpProvider::new(config, model)?)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

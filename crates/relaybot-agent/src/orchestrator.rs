//! Invocation loop: drives the model through tool rounds to a final reply.
//!
//! The loop is an explicit state machine advanced one transition at a time:
//!
//! ```text
//! AwaitingModel ─┬─ tool calls ──▶ HasToolCalls ──▶ ExecutingTools ──▶ AwaitingModel
//!                ├─ text ────────▶ Done
//!                └─ failure ─────▶ Aborted
//! ```
//!
//! After `max_rounds` passes through `ExecutingTools` one last request is sent
//! with `tool_choice = none`; whatever it returns ends the turn.
//!
//! Every tool call the model makes gets exactly one tool message back, even
//! when it was a duplicate, named an unknown tool or carried unparsable
//! arguments. Only provider failures end a turn early.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use relaybot_core::config::AgentDefaults;
use relaybot_core::error::{ProviderError, ToolError};
use relaybot_core::limiter::ConcurrencyLimiter;
use relaybot_core::types::{LlmResponse, Message, ToolCall, ToolChoice, ToolDefinition};
use relaybot_mcp::{McpError, McpManager, ToolOutput};
use relaybot_providers::traits::{LlmProvider, LlmRequestConfig};

use crate::capability::{Capability, CapabilitySet, Origin};
use crate::session::Session;
use crate::tools::ToolRegistry;

/// Output recorded for a tool that succeeded without saying anything.
const EMPTY_OUTPUT_PLACEHOLDER: &str = "completed";

// ─────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub model: String,
    /// Tool rounds before the final tools-disabled request.
    pub max_rounds: u32,
    /// Extra attempts per completion request.
    pub request_retries: u32,
    pub request: LlmRequestConfig,
}

impl From<&AgentDefaults> for OrchestratorConfig {
    fn from(defaults: &AgentDefaults) -> Self {
        Self {
            model: defaults.model.clone(),
            max_rounds: defaults.max_tool_rounds,
            request_retries: defaults.request_retries,
            request: LlmRequestConfig::from(defaults),
        }
    }
}

/// Outcome of one tool call, fed back to the model as a tool message.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallResult {
    pub request_id: String,
    pub tool_name: String,
    /// Content of the tool message.
    pub output: String,
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

impl ToolCallResult {
    fn success(call: &ToolCall, output: String) -> Self {
        let output = if output.trim().is_empty() {
            EMPTY_OUTPUT_PLACEHOLDER.to_string()
        } else {
            output
        };
        Self {
            request_id: call.id.clone(),
            tool_name: call.function.name.clone(),
            output,
            succeeded: true,
            error_detail: None,
        }
    }

    fn failure(call: &ToolCall, error: &ToolError) -> Self {
        Self {
            request_id: call.id.clone(),
            tool_name: call.function.name.clone(),
            output: format!("Error: {error}"),
            succeeded: false,
            error_detail: Some(error.to_string()),
        }
    }

    /// Same outcome, answering a different request.
    fn answering(&self, call: &ToolCall) -> Self {
        Self {
            request_id: call.id.clone(),
            ..self.clone()
        }
    }
}

/// How a turn ended.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    Reply(String),
    /// No answer was produced (distinct from an empty reply).
    NoAnswer { reason: String },
}

// ─────────────────────────────────────────────
// Loop state
// ─────────────────────────────────────────────

#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    HasToolCalls(LlmResponse),
    ExecutingTools(Round),
    Done(String),
    Aborted(String),
}

/// One assistant turn's tool calls, resolved and ready to run.
#[derive(Debug)]
struct Round {
    assistant_content: Option<String>,
    calls: Vec<PlannedCall>,
}

#[derive(Debug)]
struct PlannedCall {
    call: ToolCall,
    dispatch: Dispatch,
}

#[derive(Debug)]
enum Dispatch {
    Execute {
        capability: Capability,
        args: serde_json::Map<String, Value>,
    },
    /// Answered with a failure, never executed.
    Skip(ToolError),
    /// Same `(name, arguments)` as the call at this index.
    Duplicate(usize),
}

/// Forced tool for the first round.
struct Forced {
    name: String,
    tools: CapabilitySet,
}

/// Mutable bookkeeping for one run.
struct Progress {
    rounds: u32,
    forced: Option<Forced>,
}

// ─────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────

pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    mcp: Option<Arc<McpManager>>,
    limiter: ConcurrencyLimiter,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        mcp: Option<Arc<McpManager>>,
        limiter: ConcurrencyLimiter,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            mcp,
            limiter,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one turn over `session.messages` until a reply or an abort.
    ///
    /// `forced_tool` pins round 1 to that single tool; it is ignored with a
    /// warning when the session does not offer it.
    pub async fn run(&self, session: &mut Session, forced_tool: Option<&str>) -> TurnOutcome {
        let forced = forced_tool.and_then(|name| match session.active_tools.pinned(name) {
            Some(tools) => Some(Forced {
                name: name.to_string(),
                tools,
            }),
            None => {
                warn!(tool = %name, "forced tool is not in the active set, ignoring");
                None
            }
        });
        let mut progress = Progress { rounds: 0, forced };

        let mut state = LoopState::AwaitingModel;
        loop {
            state = match state {
                LoopState::Done(reply) => {
                    info!(session = %session.id(), rounds = progress.rounds, "turn complete");
                    return TurnOutcome::Reply(reply);
                }
                LoopState::Aborted(reason) => {
                    warn!(session = %session.id(), rounds = progress.rounds, reason = %reason, "turn aborted");
                    return TurnOutcome::NoAnswer { reason };
                }
                other => self.step(other, session, &mut progress).await,
            };
        }
    }

    /// Advance the machine by one transition.
    async fn step(&self, state: LoopState, session: &mut Session, progress: &mut Progress) -> LoopState {
        match state {
            LoopState::AwaitingModel => self.await_model(session, progress).await,
            LoopState::HasToolCalls(response) => {
                LoopState::ExecutingTools(self.plan_round(&session.active_tools, response))
            }
            LoopState::ExecutingTools(round) => {
                let results = self.execute_round(&round).await;
                append_round(session, round, results);
                progress.rounds += 1;
                LoopState::AwaitingModel
            }
            terminal @ (LoopState::Done(_) | LoopState::Aborted(_)) => terminal,
        }
    }

    async fn await_model(&self, session: &Session, progress: &mut Progress) -> LoopState {
        let final_request = progress.rounds >= self.config.max_rounds;

        let (tools, choice) = if final_request {
            (session.active_tools.definitions(), ToolChoice::None)
        } else if let (0, Some(forced)) = (progress.rounds, &progress.forced) {
            (forced.tools.definitions(), ToolChoice::Function(forced.name.clone()))
        } else {
            (session.active_tools.definitions(), ToolChoice::Auto)
        };

        debug!(
            session = %session.id(),
            round = progress.rounds,
            final_request,
            tools = tools.len(),
            "requesting completion"
        );

        let response = match self.request(&session.messages, &tools, choice).await {
            Ok(response) => response,
            Err(e) => return LoopState::Aborted(e.to_string()),
        };

        if response.has_tool_calls() && !final_request {
            return LoopState::HasToolCalls(response);
        }
        match response.content.filter(|c| !c.trim().is_empty()) {
            Some(text) => LoopState::Done(text),
            None if final_request => LoopState::Aborted("final response carried no text".into()),
            None => LoopState::Aborted("response carried neither text nor tool calls".into()),
        }
    }

    /// One completion request, retried up to `request_retries` extra times on
    /// retryable failures.
    async fn request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        choice: ToolChoice,
    ) -> Result<LlmResponse, ProviderError> {
        let (tools, choice) = if tools.is_empty() {
            (None, None)
        } else {
            (Some(tools), Some(choice))
        };

        let attempts = self.config.request_retries + 1;
        let mut attempt = 1;
        loop {
            match self
                .provider
                .chat(messages, tools, choice.clone(), &self.config.model, &self.config.request)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(attempt, attempts, error = %e, "completion request failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Dedupe, resolve and parse a response's tool calls.
    fn plan_round(&self, active: &CapabilitySet, response: LlmResponse) -> Round {
        let mut seen: HashMap<(String, String), usize> = HashMap::new();
        let mut calls = Vec::with_capacity(response.tool_calls.len());

        for (index, call) in response.tool_calls.into_iter().enumerate() {
            let key = (call.function.name.clone(), call.function.arguments.clone());
            let dispatch = if let Some(&first) = seen.get(&key) {
                debug!(tool = %call.function.name, id = %call.id, "duplicate tool call");
                Dispatch::Duplicate(first)
            } else {
                seen.insert(key, index);
                resolve(active, &call)
            };
            calls.push(PlannedCall { call, dispatch });
        }

        Round {
            assistant_content: response.content.filter(|c| !c.trim().is_empty()),
            calls,
        }
    }

    /// Run every executable call concurrently under the limiter, then fill in
    /// skipped and duplicate calls. Results are in call order.
    async fn execute_round(&self, round: &Round) -> Vec<ToolCallResult> {
        let executions = round.calls.iter().map(|planned| async move {
            match &planned.dispatch {
                Dispatch::Execute { capability, args } => {
                    let outcome = self.limiter.run(self.execute_with_retry(capability, args)).await;
                    Some(match outcome {
                        Ok(output) => ToolCallResult::success(&planned.call, output),
                        Err(e) => ToolCallResult::failure(&planned.call, &e),
                    })
                }
                Dispatch::Skip(e) => Some(ToolCallResult::failure(&planned.call, e)),
                Dispatch::Duplicate(_) => None,
            }
        });
        let executed: Vec<Option<ToolCallResult>> = join_all(executions).await;

        let mut results: Vec<ToolCallResult> = Vec::with_capacity(round.calls.len());
        for (planned, result) in round.calls.iter().zip(executed) {
            let result = match (result, &planned.dispatch) {
                (Some(result), _) => result,
                (None, Dispatch::Duplicate(first)) => match results.get(*first) {
                    Some(original) => original.answering(&planned.call),
                    None => ToolCallResult::failure(
                        &planned.call,
                        &ToolError::execution(&planned.call.function.name, "duplicate of a missing call"),
                    ),
                },
                (None, _) => ToolCallResult::failure(
                    &planned.call,
                    &ToolError::execution(&planned.call.function.name, "not executed"),
                ),
            };
            results.push(result);
        }
        results
    }

    /// Execute once; a failed execution gets one more attempt.
    async fn execute_with_retry(
        &self,
        capability: &Capability,
        args: &serde_json::Map<String, Value>,
    ) -> Result<String, ToolError> {
        match self.execute_capability(capability, args).await {
            Ok(output) => Ok(output),
            Err(e @ ToolError::UnknownTool(_)) => Err(e),
            Err(e) => {
                debug!(tool = %capability.name, error = %e, "tool failed, retrying once");
                self.execute_capability(capability, args).await
            }
        }
    }

    async fn execute_capability(
        &self,
        capability: &Capability,
        args: &serde_json::Map<String, Value>,
    ) -> Result<String, ToolError> {
        info!(tool = %capability.name, origin = ?capability.origin, "executing tool call");

        match &capability.origin {
            Origin::Local => {
                let params: HashMap<String, Value> =
                    args.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                self.registry.execute(&capability.name, params).await
            }
            Origin::Remote { .. } => {
                let Some(mcp) = &self.mcp else {
                    return Err(ToolError::UnknownTool(capability.name.clone()));
                };
                let result = mcp
                    .execute(&capability.name, Value::Object(args.clone()))
                    .await
                    .map_err(|e| remote_error(&capability.name, e))?;
                if result.failed() {
                    return Err(ToolError::execution(&capability.name, result.to_text()));
                }
                Ok(result.to_text())
            }
        }
    }
}

/// Look up the capability and parse the arguments as a JSON object. Blank
/// arguments count as `{}`.
fn resolve(active: &CapabilitySet, call: &ToolCall) -> Dispatch {
    let name = &call.function.name;
    let Some(capability) = active.get(name) else {
        warn!(tool = %name, "model called a tool outside the active set");
        return Dispatch::Skip(ToolError::UnknownTool(name.clone()));
    };

    let raw = call.function.arguments.trim();
    let parsed = if raw.is_empty() {
        Ok(Value::Object(Default::default()))
    } else {
        serde_json::from_str::<Value>(raw)
    };
    match parsed {
        Ok(Value::Object(args)) => Dispatch::Execute {
            capability: capability.clone(),
            args,
        },
        Ok(other) => Dispatch::Skip(ToolError::ArgumentParse {
            tool: name.clone(),
            reason: format!("expected a JSON object, got {other}"),
        }),
        Err(e) => Dispatch::Skip(ToolError::ArgumentParse {
            tool: name.clone(),
            reason: e.to_string(),
        }),
    }
}

fn remote_error(tool: &str, error: McpError) -> ToolError {
    match error {
        McpError::UnknownTool(_) => ToolError::UnknownTool(tool.to_string()),
        McpError::ServerDisconnected { server, .. } => ToolError::ServerDisconnected {
            server,
            tool: tool.to_string(),
        },
        other => ToolError::execution(tool, other),
    }
}

/// Append the assistant message and one tool message per call.
fn append_round(session: &mut Session, round: Round, results: Vec<ToolCallResult>) {
    let calls: Vec<ToolCall> = round.calls.into_iter().map(|p| p.call).collect();
    session.messages.push(Message::Assistant {
        content: round.assistant_content,
        tool_calls: Some(calls),
    });

    for result in results {
        debug!(
            tool = %result.tool_name,
            succeeded = result.succeeded,
            output_len = result.output.len(),
            "tool result"
        );
        session.last_tool_used = Some(result.tool_name.clone());
        session
            .messages
            .push(Message::tool_result(result.request_id, result.tool_name, result.output));
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#![deny(missing_docs)]
//! Agent Loop — the core reason-act engine, one loop per session, per spec §4.4.
//!
//! [`AgentLoop<P>`] implements `layer0::Operator` by running a
//! classify → gate → reason-act cycle in front of a [`Provider`]:
//! the Signal Classifier and Noise Filter gate the inbound message,
//! the Context Builder assembles the system prompt, the provider is
//! called with an explicit retry/backoff policy on transient failures,
//! and tool calls are dispatched through the Tool Registry with the
//! Hook Pipeline firing at every lifecycle point.
//!
//! This generalizes `neuron-op-react`'s `ReactOperator` — same
//! assemble-context/call-model/execute-tools/repeat shape — adding the
//! noise gate, the Budget Gate's direct ledger check around each
//! provider call (the hook pipeline alone only covers tool calls),
//! event publication, and a bounded retry loop the teacher's operator
//! never had (`ReactOperator` surfaces a transient provider error as
//! `OperatorError::Retryable` and leaves retrying to its caller).

mod history;
mod retry;

pub use history::{HistoryError, HISTORY_KEY};
pub use retry::RetryConfig;

use async_trait::async_trait;
use layer0::content::Content;
use layer0::duration::DurationMs;
use layer0::effect::{Effect, Scope, SignalPayload};
use layer0::error::OperatorError;
use layer0::hook::{HookAction, HookContext, HookPoint};
use layer0::id::{AgentId, SessionId, WorkflowId};
use layer0::operator::{
    ExitReason, Operator, OperatorInput, OperatorMetadata, OperatorOutput, ToolCallRecord,
};
use layer0::StateStore;
use neuron_budget::{BudgetLedger, LedgerEntry};
use neuron_classifier::{classify, ClassifierConfig, FilterDecision, NoiseFilter, Signal};
use neuron_context::{ContextBuilder, EnvironmentContext, OverlayRequest, RuntimeContext};
use neuron_events::{Event, EventBus};
use neuron_hooks::HookRegistry;
use neuron_tool::ToolRegistry;
use neuron_turn::context::{ContextStrategy, NoCompaction};
use neuron_turn::convert::{content_to_user_message, parts_to_content};
use neuron_turn::provider::Provider;
use neuron_turn::types::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Names of tools that produce Effects instead of executing through the
/// Tool Registry, grounded on `neuron-op-react`'s identical table.
const EFFECT_TOOL_NAMES: &[&str] = &["write_memory", "delete_memory", "delegate", "handoff", "signal"];

/// Static configuration for an [`AgentLoop`] instance.
pub struct LoopConfig {
    /// Default model identifier, used when a call doesn't override it.
    pub default_model: String,
    /// Default max tokens per model response.
    pub default_max_tokens: u32,
    /// Hard cap on reasoning iterations per call, per spec §4.4.
    /// Exhausting this returns `ExitReason::MaxTurns` (the spec's
    /// `iteration_limit`), never an error.
    pub max_iterations: u32,
    /// Tokens reserved for the model's response when budgeting context.
    pub response_reserve: usize,
    /// Estimated cost of one provider call, used for the direct budget
    /// check around `Provider::complete` (the `BudgetGateHook` installed
    /// in `hooks` only covers tool calls, per `neuron_budget`'s own
    /// documentation of that gap).
    pub cost_estimate_per_call: Decimal,
    /// The provider's name, recorded on each ledger entry and in the
    /// static context base.
    pub provider_name: String,
    /// Retry/backoff tuning for transient provider failures.
    pub retry: RetryConfig,
    /// Tunables for the Signal Classifier and Noise Filter.
    pub classifier: ClassifierConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            default_model: String::new(),
            default_max_tokens: 4096,
            max_iterations: 20,
            response_reserve: 1024,
            cost_estimate_per_call: Decimal::new(1, 2),
            provider_name: "unknown".to_string(),
            retry: RetryConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

/// The Agent Loop: one reason-act engine implementing `layer0::Operator`.
///
/// Generic over `P: Provider` (not object-safe, per `neuron_turn::provider`'s
/// RPITIT design). The object-safe boundary is `layer0::Operator`, which
/// `AgentLoop<P>` implements via `#[async_trait]` — the same pattern as
/// `ReactOperator<P>` and `SingleShotOperator<P>`.
pub struct AgentLoop<P: Provider> {
    provider: P,
    tools: Arc<ToolRegistry>,
    hooks: HookRegistry,
    budget: BudgetLedger,
    events: Arc<EventBus>,
    context: ContextBuilder,
    noise_filter: NoiseFilter,
    state: Arc<dyn StateStore>,
    config: LoopConfig,
}

impl<P: Provider> AgentLoop<P> {
    /// Assemble an `AgentLoop` from its dependencies. Every collaborator
    /// is constructed once by the caller and shared across sessions —
    /// this struct owns none of their lifecycles.
    pub fn new(
        provider: P,
        tools: Arc<ToolRegistry>,
        hooks: HookRegistry,
        budget: BudgetLedger,
        events: Arc<EventBus>,
        context: ContextBuilder,
        state: Arc<dyn StateStore>,
        config: LoopConfig,
    ) -> Self {
        let noise_filter = NoiseFilter::new(config.classifier.clone());
        Self {
            provider,
            tools,
            hooks,
            budget,
            events,
            context,
            noise_filter,
            state,
            config,
        }
    }

    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn channel_of(&self, input: &OperatorInput) -> String {
        input
            .metadata
            .get("channel")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }

    fn publish(&self, session: &Option<SessionId>, event_type: &str, payload: serde_json::Value) {
        let mut event = Event::new(event_type, payload, DurationMs::from_millis(self.now_ms()));
        if let Some(session) = session {
            event = event.with_session(session.clone());
        }
        self.events.publish(event);
    }

    async fn fire_hook(&self, ctx: &HookContext) -> HookAction {
        self.hooks.dispatch(ctx).await
    }

    /// Run this session's `session_end` hooks and publish `session_ended`,
    /// per spec §4.7's `pattern_consolidation` built-in and §4.3's
    /// termination/reaping observability requirement.
    ///
    /// Not part of the `Operator` trait (kept intentionally one method,
    /// per its own doc comment) — called directly by whatever owns the
    /// concrete `AgentLoop` at the point a session is actually torn down
    /// (the idle reaper, or an explicit terminate), since `Arc<dyn
    /// Operator>` alone can't reach it.
    pub async fn end_session(&self, session_id: SessionId, cause: &str) {
        let ctx = self.hook_context(
            HookPoint::SessionEnd,
            &Some(session_id.clone()),
            0,
            0,
            Decimal::ZERO,
            0,
            DurationMs::from_millis(self.now_ms()),
        );
        self.hooks.dispatch_all(&ctx).await;
        self.publish(
            &Some(session_id),
            "session_ended",
            serde_json::json!({"cause": cause}),
        );
    }

    fn hook_context(
        &self,
        point: HookPoint,
        session: &Option<SessionId>,
        tokens_in: u64,
        tokens_out: u64,
        cost: Decimal,
        turns_completed: u32,
        elapsed: DurationMs,
    ) -> HookContext {
        let mut ctx = HookContext::new(point);
        ctx.session_id = session.clone();
        ctx.tokens_used = tokens_in + tokens_out;
        ctx.cost = cost;
        ctx.turns_completed = turns_completed;
        ctx.elapsed = elapsed;
        ctx
    }

    fn build_tool_schemas(&self, allowed_tools: &Option<Vec<String>>) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .catalogue()
            .into_iter()
            .map(|(name, description, input_schema)| ToolSchema {
                name,
                description,
                input_schema,
            })
            .collect();
        if let Some(allowed) = allowed_tools {
            schemas.retain(|s| allowed.contains(&s.name));
        }
        schemas
    }

    /// Build the system prompt for this call via the Context Builder,
    /// per spec §4.5: static base (tools, guardrail, profile) plus a
    /// dynamic overlay keyed off the classified Signal.
    fn assemble_system(
        &self,
        signal: &Signal,
        channel: &str,
        session: &Option<SessionId>,
        history_tokens: usize,
        max_tokens: u32,
    ) -> String {
        let request = OverlayRequest {
            signal,
            runtime: RuntimeContext {
                timestamp: signal.timestamp,
                channel: channel.to_string(),
                session_id: session.as_ref().map(|s| s.as_str().to_string()),
            },
            environment: EnvironmentContext {
                cwd: String::new(),
                date: String::new(),
                os: std::env::consts::OS.to_string(),
                provider: self.config.provider_name.clone(),
                model: self.config.default_model.clone(),
            },
            plan_mode_directive: None,
            memory_candidates: &[],
            task_list: &[],
            workflow_state: None,
            communication_profile: None,
            memory_bulletin: None,
            addenda: &[],
            history_tokens,
            max_tokens: max_tokens as usize,
            response_reserve: self.config.response_reserve,
        };
        self.context.build(&request).as_single_string()
    }

    fn try_as_effect(&self, name: &str, input: &serde_json::Value) -> Option<Effect> {
        match name {
            "write_memory" => {
                let scope_str = input.get("scope")?.as_str()?;
                let key = input.get("key")?.as_str()?.to_string();
                let value = input.get("value")?.clone();
                Some(Effect::WriteMemory {
                    scope: parse_scope(scope_str),
                    key,
                    value,
                })
            }
            "delete_memory" => {
                let scope_str = input.get("scope")?.as_str()?;
                let key = input.get("key")?.as_str()?.to_string();
                Some(Effect::DeleteMemory {
                    scope: parse_scope(scope_str),
                    key,
                })
            }
            "delegate" => {
                let agent = input.get("agent")?.as_str()?;
                let message = input.get("message").and_then(|m| m.as_str()).unwrap_or("");
                let delegate_input =
                    OperatorInput::new(Content::text(message), layer0::operator::TriggerType::Task);
                Some(Effect::Delegate {
                    agent: AgentId::new(agent),
                    input: Box::new(delegate_input),
                })
            }
            "handoff" => {
                let agent = input.get("agent")?.as_str()?;
                let state = input.get("state").cloned().unwrap_or(serde_json::Value::Null);
                Some(Effect::Handoff {
                    agent: AgentId::new(agent),
                    state,
                })
            }
            "signal" => {
                let target = input.get("target")?.as_str()?;
                let signal_type = input.get("signal_type").and_then(|s| s.as_str()).unwrap_or("default");
                let data = input.get("data").cloned().unwrap_or(serde_json::Value::Null);
                Some(Effect::Signal {
                    target: WorkflowId::new(target),
                    payload: SignalPayload::new(signal_type, data),
                })
            }
            _ => None,
        }
    }

    /// Call the provider, retrying transient failures with jittered
    /// exponential backoff before giving up, per spec §4.4/§7.
    ///
    /// By the time this has exhausted its attempts there's nothing left
    /// for an outer retry policy to gain, so exhaustion maps to
    /// `OperatorError::NonRetryable` rather than `Retryable` — the
    /// opposite of `ReactOperator`, which has no retry loop of its own
    /// and so must surface every transient failure as `Retryable` for
    /// its caller to handle.
    async fn call_provider(&self, request: &ProviderRequest) -> Result<ProviderResponse, OperatorError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.config.retry.max_attempts => {
                    tokio::time::sleep(self.config.retry.backoff_delay(attempt)).await;
                    continue;
                }
                Err(e) if e.is_transient() => {
                    return Err(OperatorError::NonRetryable(format!(
                        "provider_error: retries exhausted: {e}"
                    )));
                }
                Err(e) => {
                    return Err(OperatorError::NonRetryable(format!("provider_error: {e}")));
                }
            }
        }
    }
}

#[async_trait]
impl<P: Provider + Send + Sync + 'static> Operator for AgentLoop<P> {
    async fn execute(&self, input: OperatorInput) -> Result<OperatorOutput, OperatorError> {
        let start = Instant::now();
        let session = input.session.clone();
        let channel = self.channel_of(&input);
        let raw_text = input.message.as_text().unwrap_or_default().to_string();

        // 1. Classify and gate, per spec §4.2. This runs before any
        // history read, provider call, or hook fires.
        let signal = classify(&raw_text, &channel, self.now_ms(), &self.config.classifier);
        let signal = match self.noise_filter.filter(signal).await {
            FilterDecision::Filtered(signal) => {
                self.publish(
                    &session,
                    "signal_filtered",
                    serde_json::json!({"weight": signal.weight, "kind": signal.kind}),
                );
                let message = Content::Blocks(vec![layer0::content::ContentBlock::Custom {
                    content_type: "signal_filtered".to_string(),
                    data: serde_json::to_value(&signal).unwrap_or(serde_json::Value::Null),
                }]);
                return Ok(OperatorOutput::new(message, ExitReason::Custom("signal_filtered".to_string())));
            }
            FilterDecision::Pass(signal) => signal,
        };

        // 2. Load history and fire SessionStart on the first turn of a
        // session, per spec §4.4. A session with no persisted history
        // yet is, by definition, on its first turn.
        let mut turn_history = match &session {
            Some(sid) => history::load(self.state.as_ref(), sid).await.unwrap_or_default(),
            None => Vec::new(),
        };
        if turn_history.is_empty() {
            let ctx = self.hook_context(HookPoint::SessionStart, &session, 0, 0, Decimal::ZERO, 0, DurationMs::ZERO);
            let _ = self.fire_hook(&ctx).await;
        }
        turn_history.push(content_to_user_message(&input.message));

        let tc = input.config.as_ref();
        let model = tc
            .and_then(|c| c.model.clone())
            .or_else(|| (!self.config.default_model.is_empty()).then(|| self.config.default_model.clone()));
        let max_turns = tc.and_then(|c| c.max_turns).unwrap_or(self.config.max_iterations);
        let max_iterations = max_turns.min(self.config.max_iterations);
        let allowed_tools = tc.and_then(|c| c.allowed_tools.clone());
        let max_tokens = self.config.default_max_tokens;

        let tool_schemas = self.build_tool_schemas(&allowed_tools);
        let compaction = NoCompaction;

        let mut total_tokens_in: u64 = 0;
        let mut total_tokens_out: u64 = 0;
        let mut total_cost = Decimal::ZERO;
        let mut turns_used: u32 = 0;
        let mut tool_records: Vec<ToolCallRecord> = vec![];
        let mut effects: Vec<Effect> = vec![];
        // Best-effort content from the most recent provider response, returned
        // verbatim if the loop exhausts `max_iterations` without a no-tool-call
        // reply (spec §4.4 step 5: "best-effort assistant content from the
        // last iteration", not an empty body).
        let mut last_content = Content::text("");

        let result = 'outer: loop {
            if turns_used >= max_iterations {
                break Ok(OperatorOutput::new(last_content.clone(), ExitReason::MaxTurns));
            }
            turns_used += 1;

            let history_tokens = compaction.token_estimate(&turn_history);
            let system = self.assemble_system(&signal, &channel, &session, history_tokens, max_tokens);

            let request = ProviderRequest {
                model: model.clone(),
                messages: turn_history.clone(),
                tools: tool_schemas.clone(),
                max_tokens: Some(max_tokens),
                temperature: None,
                system: Some(system),
                extra: input.metadata.clone(),
            };

            // 3. Direct budget check around the provider call, per
            // `neuron_budget`'s documented gap: the Budget Gate hook
            // alone only covers `pre_tool_use`.
            if self.budget.check(self.config.cost_estimate_per_call).await.is_err() {
                self.publish(&session, "budget_exceeded", serde_json::json!({"stage": "provider"}));
                break Err(OperatorError::NonRetryable("budget_exceeded".to_string()));
            }

            self.publish(
                &session,
                "llm_request",
                serde_json::json!({"turn": turns_used, "model": request.model}),
            );

            let response = match self.call_provider(&request).await {
                Ok(r) => r,
                Err(e) => break Err(e),
            };

            self.budget
                .record(LedgerEntry {
                    timestamp: DurationMs::from_millis(self.now_ms()),
                    provider: self.config.provider_name.clone(),
                    model: response.model.clone(),
                    tokens_in: response.usage.input_tokens,
                    tokens_out: response.usage.output_tokens,
                    estimated_cost: response.cost.unwrap_or(Decimal::ZERO),
                })
                .await;

            self.publish(
                &session,
                "llm_response",
                serde_json::json!({
                    "turn": turns_used,
                    "stop_reason": format!("{:?}", response.stop_reason),
                    "tokens_in": response.usage.input_tokens,
                    "tokens_out": response.usage.output_tokens,
                }),
            );

            total_tokens_in += response.usage.input_tokens;
            total_tokens_out += response.usage.output_tokens;
            if let Some(cost) = response.cost {
                total_cost += cost;
            }

            match response.stop_reason {
                StopReason::MaxTokens => {
                    break Err(OperatorError::Model("output truncated (max_tokens)".to_string()));
                }
                StopReason::ContentFilter => {
                    break Err(OperatorError::Model("content filtered".to_string()));
                }
                StopReason::EndTurn => {
                    let message = parts_to_content(&response.content);

                    let mut pre_ctx = self.hook_context(
                        HookPoint::PreResponse,
                        &session,
                        total_tokens_in,
                        total_tokens_out,
                        total_cost,
                        turns_used,
                        DurationMs::from(start.elapsed()),
                    );
                    pre_ctx.model_output = Some(message.clone());
                    if let HookAction::Halt { reason } = self.fire_hook(&pre_ctx).await {
                        break Ok(OperatorOutput::new(message, ExitReason::ObserverHalt { reason }));
                    }

                    turn_history.push(ProviderMessage {
                        role: Role::Assistant,
                        content: response.content.clone(),
                    });

                    self.publish(
                        &session,
                        "agent_response",
                        serde_json::json!({"turn": turns_used}),
                    );

                    let post_ctx = self.hook_context(
                        HookPoint::PostResponse,
                        &session,
                        total_tokens_in,
                        total_tokens_out,
                        total_cost,
                        turns_used,
                        DurationMs::from(start.elapsed()),
                    );
                    self.hooks.dispatch_all(&post_ctx).await;

                    break Ok(OperatorOutput::new(message, ExitReason::Complete));
                }
                StopReason::ToolUse => {
                    turn_history.push(ProviderMessage {
                        role: Role::Assistant,
                        content: response.content.clone(),
                    });
                    last_content = parts_to_content(&response.content);

                    let tool_uses: Vec<(String, String, serde_json::Value)> = response
                        .content
                        .iter()
                        .filter_map(|part| match part {
                            ContentPart::ToolUse { id, name, input } => {
                                Some((id.clone(), name.clone(), input.clone()))
                            }
                            _ => None,
                        })
                        .collect();

                    let mut tool_results = Vec::new();

                    for (id, name, tool_input) in tool_uses {
                        if EFFECT_TOOL_NAMES.contains(&name.as_str()) {
                            if let Some(effect) = self.try_as_effect(&name, &tool_input) {
                                effects.push(effect);
                            }
                            tool_results.push(ContentPart::ToolResult {
                                tool_use_id: id,
                                content: format!("{name} effect recorded."),
                                is_error: false,
                            });
                            tool_records.push(ToolCallRecord::new(&name, DurationMs::ZERO, true));
                            continue;
                        }

                        let mut pre_ctx = self.hook_context(
                            HookPoint::PreToolUse,
                            &session,
                            total_tokens_in,
                            total_tokens_out,
                            total_cost,
                            turns_used,
                            DurationMs::from(start.elapsed()),
                        );
                        pre_ctx.tool_name = Some(name.clone());
                        pre_ctx.tool_input = Some(tool_input.clone());

                        let action = self.fire_hook(&pre_ctx).await;
                        let (skip_reason, actual_input) = match action {
                            HookAction::Halt { reason } => {
                                break 'outer Ok(OperatorOutput::new(
                                    parts_to_content(&response.content),
                                    ExitReason::ObserverHalt { reason },
                                ));
                            }
                            HookAction::SkipTool { reason } => (Some(reason), tool_input.clone()),
                            HookAction::ModifyToolInput { new_input } => (None, new_input),
                            _ => (None, tool_input.clone()),
                        };

                        if let Some(reason) = skip_reason {
                            self.publish(
                                &session,
                                "hook_blocked",
                                serde_json::json!({"tool": name, "reason": reason}),
                            );
                            tool_results.push(ContentPart::ToolResult {
                                tool_use_id: id,
                                content: format!("skipped by policy: {reason}"),
                                is_error: true,
                            });
                            tool_records.push(ToolCallRecord::new(&name, DurationMs::ZERO, false));
                            continue;
                        }

                        self.publish(
                            &session,
                            "tool_call_start",
                            serde_json::json!({"tool": name, "turn": turns_used}),
                        );
                        let tool_start = Instant::now();
                        let outcome = self.tools.dispatch(&name, actual_input).await;
                        let tool_duration = DurationMs::from(tool_start.elapsed());

                        let (result_text, is_error) = match &outcome {
                            Ok(output) => (output.as_history_text(), output.is_error()),
                            Err(e) => (e.to_string(), true),
                        };

                        self.publish(
                            &session,
                            "tool_call_end",
                            serde_json::json!({"tool": name, "success": !is_error}),
                        );

                        let mut post_ctx = self.hook_context(
                            HookPoint::PostToolUse,
                            &session,
                            total_tokens_in,
                            total_tokens_out,
                            total_cost,
                            turns_used,
                            DurationMs::from(start.elapsed()),
                        );
                        post_ctx.tool_name = Some(name.clone());
                        post_ctx.tool_result = Some(result_text.clone());

                        let final_text = match self.fire_hook(&post_ctx).await {
                            HookAction::ModifyToolOutput { new_output } => {
                                new_output.as_str().map(|s| s.to_string()).unwrap_or(result_text)
                            }
                            _ => result_text,
                        };

                        tool_records.push(ToolCallRecord::new(&name, tool_duration, !is_error));
                        tool_results.push(ContentPart::ToolResult {
                            tool_use_id: id,
                            content: final_text,
                            is_error,
                        });
                    }

                    turn_history.push(ProviderMessage {
                        role: Role::User,
                        content: tool_results,
                    });
                }
            }
        };

        if let Some(sid) = &session {
            let _ = history::store(self.state.as_ref(), sid, &turn_history).await;
        }

        let duration = DurationMs::from(start.elapsed());
        result.map(|mut output| {
            output.metadata = OperatorMetadata {
                tokens_in: total_tokens_in,
                tokens_out: total_tokens_out,
                cost: total_cost,
                turns_used,
                tools_called: tool_records,
                duration,
            };
            output.effects = effects;
            output
        })
    }
}

fn parse_scope(s: &str) -> Scope {
    if let Some(rest) = s.strip_prefix("session:") {
        Scope::Session(SessionId::new(rest))
    } else if let Some(rest) = s.strip_prefix("workflow:") {
        Scope::Workflow(WorkflowId::new(rest))
    } else if s == "global" {
        Scope::Global
    } else {
        Scope::Custom(s.to_string())
    }
}

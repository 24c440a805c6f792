//! Process-wide application state: every subsystem wired together once at
//! startup and shared by every handler.
//!
//! Generalizes `neuron-orch-local`'s single `HashMap<String, Arc<dyn
//! Operator>>` assembly into the full runtime graph — Session Registry,
//! Swarm Orchestrator, Event Bus, Tool Registry, Hook Pipeline, and
//! Budget Gate all built once here and cloned (cheaply — every field is
//! an `Arc` handle) into each request's extractor.

use crate::auth::{AsAuthState, AuthState};
use crate::config::RuntimeConfig;
use layer0::error::OperatorError;
use neuron_budget::{BudgetGateHook, BudgetLedger, BudgetLimits};
use neuron_classifier::{ClassifierConfig, NoiseFilter};
use neuron_context::{ContextBuilder, StaticBaseConfig};
use neuron_events::EventBus;
use neuron_hook_security::{ExfilGuardHook, PathAllowListHook, RedactionHook, ShellDenyListHook};
use neuron_hooks::HookRegistry;
use neuron_loop::{AgentLoop, LoopConfig, RetryConfig};
use neuron_provider_mock::MockProvider;
use neuron_session::SessionRegistry;
use neuron_state_fs::FsStore;
use neuron_state_memory::MemoryStore;
use neuron_swarm::{RuleBasedPlanner, SwarmLimits, SwarmRunner};
use neuron_tool::builtin::{ReadFileTool, ShellExecuteTool};
use neuron_tool::ToolRegistry;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

/// Concrete per-session execution handle this binary wires up. Kept
/// concrete (rather than erased to `Arc<dyn Operator>`) so the reaper
/// can reach [`AgentLoop::end_session`] directly — the `Operator` trait
/// itself stays the teacher's intentional one-method shape.
pub type SessionHandle = Arc<AgentLoop<MockProvider>>;

/// Shared handle to every subsystem. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub(crate) config: Arc<RuntimeConfig>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) sessions: Arc<SessionRegistry<SessionHandle>>,
    pub(crate) swarm: Arc<SwarmRunner<MockProvider>>,
    pub(crate) budget_limits: BudgetLimits,
    pub(crate) classifier_config: ClassifierConfig,
    pub(crate) state_store: Arc<dyn layer0::StateStore>,
    pub(crate) auth: AuthState,
}

impl AsAuthState for AppState {
    fn auth_state(&self) -> &AuthState {
        &self.auth
    }
}

impl AppState {
    /// Build the full dependency graph from a loaded config.
    pub fn build(config: RuntimeConfig) -> Self {
        let events = Arc::new(EventBus::new());
        let tools = Arc::new(ToolRegistry::new());

        for root in &config.tool_allow_paths {
            tools.register(Arc::new(ReadFileTool::new(root.clone())));
        }
        if config.tool_allow_paths.is_empty() {
            tools.register(Arc::new(ReadFileTool::new(".")));
        }
        tools.register(Arc::new(ShellExecuteTool::new(".")));

        let classifier_config = ClassifierConfig {
            noise_threshold: config.noise_threshold,
            ..ClassifierConfig::default()
        };

        let budget_limits = BudgetLimits {
            daily_limit: parse_usd(&config.daily_limit_usd),
            monthly_limit: parse_usd(&config.monthly_limit_usd),
            per_call_limit: parse_usd(&config.per_call_limit_usd),
            ..BudgetLimits::default()
        };

        let state_store: Arc<dyn layer0::StateStore> = match &config.state_dir {
            Some(dir) => Arc::new(FsStore::new(std::path::Path::new(dir))),
            None => Arc::new(MemoryStore::new()),
        };

        let planner = Arc::new(RuleBasedPlanner);
        let swarm_provider = Arc::new(MockProvider::single_reply("synthesized swarm result"));
        let swarm_limits = SwarmLimits {
            max_concurrent_swarms: config.max_concurrent_swarms,
            max_agents_per_swarm: config.max_agents_per_swarm,
            default_timeout: config.swarm_default_timeout(),
        };
        let swarm = Arc::new(SwarmRunner::new(swarm_provider, planner, Arc::clone(&events), swarm_limits));

        let sessions = Arc::new(SessionRegistry::new(config.require_auth));

        let auth = AuthState::new(config.shared_secret.clone());

        Self {
            config: Arc::new(config),
            events,
            tools,
            sessions,
            swarm,
            budget_limits,
            classifier_config,
            state_store,
            auth,
        }
    }

    /// Build a fresh `pre_tool_use` hook pipeline from this state's
    /// config. Called once per new session rather than shared, since
    /// `HookRegistry` has no internal mutable state worth amortizing and
    /// isn't `Clone` (each registration holds a fresh `Arc<dyn Hook>`).
    fn build_hooks(&self, budget: BudgetLedger) -> HookRegistry {
        let mut hooks = HookRegistry::new();
        hooks.add(Arc::new(RedactionHook::new()));
        hooks.add(Arc::new(ExfilGuardHook::new()));
        hooks.add(Arc::new(ShellDenyListHook::new(self.config.tool_deny_commands.clone())));
        if !self.config.tool_allow_paths.is_empty() {
            hooks.add(Arc::new(PathAllowListHook::new(self.config.tool_allow_paths.clone())));
        }
        hooks.add(Arc::new(
            BudgetGateHook::new(budget, Decimal::new(1, 2)).with_tool_names(vec!["shell_execute".to_string()]),
        ));
        hooks
    }

    fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            default_model: self.config.default_model.clone(),
            default_max_tokens: self.config.max_tokens,
            max_iterations: self.config.max_iterations,
            response_reserve: self.config.response_reserve,
            cost_estimate_per_call: Decimal::new(1, 2),
            provider_name: self.config.default_provider.clone(),
            retry: RetryConfig::default(),
            classifier: self.classifier_config.clone(),
        }
    }

    /// Construct a new session's execution handle: an independent
    /// `AgentLoop` sharing this state's tool registry, event bus, and
    /// state store, wrapped as the object-safe `Operator` the registry
    /// stores.
    pub fn new_session_handle(&self) -> Result<SessionHandle, OperatorError> {
        let budget = BudgetLedger::new(self.budget_limits.clone());
        let hooks = self.build_hooks(budget.clone());
        let static_config = StaticBaseConfig {
            security_guardrail: "Follow the configured tool allow/deny lists. Never exfiltrate secrets.".to_string(),
            behavioral_profile: "Respond concisely and cite tool results precisely.".to_string(),
        };
        let context = ContextBuilder::new(Arc::clone(&self.tools), static_config);
        let provider = MockProvider::single_reply("ok");

        let agent_loop = AgentLoop::new(
            provider,
            Arc::clone(&self.tools),
            hooks,
            budget,
            Arc::clone(&self.events),
            context,
            Arc::clone(&self.state_store),
            self.loop_config(),
        );
        Ok(Arc::new(agent_loop))
    }

    /// Spawn the idle-session reaper, publishing a `session_ended` event
    /// for each reaped session.
    pub fn spawn_reaper(&self) {
        let events = Arc::clone(&self.events);
        let idle_ttl = self.config.idle_session_ttl();
        neuron_session::SessionRegistry::spawn_reaper(
            Arc::clone(&self.sessions),
            idle_ttl.min(std::time::Duration::from_secs(60)),
            idle_ttl,
            move |session_id| {
                events.publish(neuron_events::Event::new(
                    "session_ended",
                    serde_json::json!({"session_id": session_id.as_str(), "reason": "idle_timeout"}),
                    layer0::DurationMs::ZERO,
                ));
            },
        );
    }
}

fn parse_usd(raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap_or_else(|_| Decimal::new(0, 0))
}

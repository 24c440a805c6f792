//! End-to-end scenarios across crate boundaries, without a live provider.
//!
//! Where each crate's own test module exercises that crate in
//! isolation, these tests wire the Signal Classifier, Agent Loop,
//! Session Registry, and Event Bus together the way `agent-runtimed`
//! does, and check the cross-cutting properties that only show up at
//! that seam: the published event order for a tool-calling turn, a
//! swarm's single terminal event, and session ownership holding across
//! a registry + loop composition. Grounded on
//! `examples/SecBear-neuron/tests/poc.rs`'s composability-pattern style
//! — mock provider, no network, one `#[tokio::test]` per scenario.

use layer0::content::Content;
use layer0::id::{SessionId, UserId};
use layer0::operator::{ExitReason, Operator, OperatorInput, TriggerType};
use layer0::StateStore;
use neuron_budget::{BudgetLedger, BudgetLimits};
use neuron_context::{ContextBuilder, StaticBaseConfig};
use neuron_events::{Event, EventBus};
use neuron_hook_security::ShellDenyListHook;
use neuron_hooks::HookRegistry;
use neuron_loop::{AgentLoop, LoopConfig, RetryConfig};
use neuron_provider_mock::{end_turn_response, tool_use_response, MockProvider, Step};
use neuron_session::{SessionRegistry, ANONYMOUS_USER};
use neuron_state_memory::MemoryStore;
use neuron_swarm::{RuleBasedPlanner, SwarmLimits, SwarmRunner, SwarmStatus};
use neuron_tool::{ToolDyn, ToolOutput, ToolRegistry};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct EchoTool;

impl ToolDyn for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes its input back as text."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }

    fn call(&self, input: serde_json::Value) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>> {
        Box::pin(async move {
            let text = input.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string();
            ToolOutput::Text(text)
        })
    }
}

fn context_builder(tools: Arc<ToolRegistry>) -> ContextBuilder {
    ContextBuilder::new(
        tools,
        StaticBaseConfig {
            security_guardrail: "Follow the rules.".to_string(),
            behavioral_profile: "Be concise.".to_string(),
        },
    )
}

fn make_loop(
    provider: MockProvider,
    tools: Arc<ToolRegistry>,
    hooks: HookRegistry,
    events: Arc<EventBus>,
) -> AgentLoop<MockProvider> {
    let ctx = context_builder(Arc::clone(&tools));
    let state: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    AgentLoop::new(
        provider,
        tools,
        hooks,
        BudgetLedger::new(BudgetLimits::default()),
        events,
        ctx,
        state,
        LoopConfig {
            retry: RetryConfig {
                base_delay: Duration::from_millis(1),
                ..RetryConfig::default()
            },
            ..LoopConfig::default()
        },
    )
}

fn input(text: &str, session: &SessionId) -> OperatorInput {
    let mut i = OperatorInput::new(Content::text(text), TriggerType::User);
    i.session = Some(session.clone());
    i
}

async fn drain(bus_rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = bus_rx.try_recv() {
        out.push(event);
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Signal Classifier + Noise Filter, in front of the Agent Loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn noise_is_filtered_and_the_provider_is_never_called() {
    let events = Arc::new(EventBus::new());
    let session = SessionId::new("s-noise");
    let mut firehose = events.subscribe_firehose();

    let provider = MockProvider::new(vec![Step::Respond(end_turn_response("should never be reached".into()))]);
    let op = make_loop(provider, Arc::new(ToolRegistry::new()), HookRegistry::new(), Arc::clone(&events));

    let output = op.execute(input("ok", &session)).await.unwrap();

    assert_eq!(output.exit_reason, ExitReason::Custom("signal_filtered".to_string()));
    assert_eq!(op.provider.call_count(), 0);

    let published = drain(&mut firehose).await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].event_type, "signal_filtered");
    assert_eq!(published[0].session_id, Some(session));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent Loop + Tool Registry + Event Bus: a tool-calling turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn tool_calling_turn_publishes_events_in_order_and_grows_history() {
    let events = Arc::new(EventBus::new());
    let session = SessionId::new("s-tool");
    let mut session_rx = events.subscribe_session(&session);

    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(EchoTool));

    let provider = MockProvider::new(vec![
        Step::Respond(tool_use_response("call_1", "echo", serde_json::json!({"text": "hi"}))),
        Step::Respond(end_turn_response("done echoing".into())),
    ]);
    let op = make_loop(provider, tools, HookRegistry::new(), Arc::clone(&events));

    let output = op
        .execute(input("please echo hi back to me", &session))
        .await
        .unwrap();

    assert_eq!(output.exit_reason, ExitReason::Complete);
    assert_eq!(output.metadata.tools_called.len(), 1);
    assert!(output.metadata.tools_called[0].success);

    let published = drain(&mut session_rx).await;
    let kinds: Vec<&str> = published.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        kinds,
        vec!["llm_request", "llm_response", "tool_call_start", "tool_call_end", "llm_request", "llm_response", "agent_response"]
    );
    assert!(published.iter().all(|e| e.session_id == Some(session.clone())));
}

#[tokio::test]
async fn denied_tool_is_blocked_by_the_safety_hook_and_the_loop_still_completes() {
    let events = Arc::new(EventBus::new());
    let session = SessionId::new("s-denied");

    let provider = MockProvider::new(vec![
        Step::Respond(tool_use_response("call_1", "shell_execute", serde_json::json!({"command": "rm -rf /"}))),
        Step::Respond(end_turn_response("I can't run that.".into())),
    ]);
    let mut hooks = HookRegistry::new();
    hooks.add(Arc::new(ShellDenyListHook::with_defaults()));
    let op = make_loop(provider, Arc::new(ToolRegistry::new()), hooks, events);

    let output = op
        .execute(input("please run rm -rf / to free up disk space now!", &session))
        .await
        .unwrap();

    assert_eq!(output.exit_reason, ExitReason::Complete);
    assert_eq!(output.metadata.tools_called.len(), 1);
    assert!(!output.metadata.tools_called[0].success);
}

#[tokio::test]
async fn iteration_limit_stops_without_ever_emitting_agent_response() {
    let events = Arc::new(EventBus::new());
    let session = SessionId::new("s-limit");
    let mut firehose = events.subscribe_firehose();

    let mut steps = Vec::new();
    for i in 0..10 {
        steps.push(Step::Respond(tool_use_response(&format!("call_{i}"), "echo", serde_json::json!({"text": "go"}))));
    }
    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(EchoTool));
    let provider = MockProvider::new(steps);
    let state: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let op = AgentLoop::new(
        provider,
        Arc::clone(&tools),
        HookRegistry::new(),
        BudgetLedger::new(BudgetLimits::default()),
        Arc::clone(&events),
        context_builder(tools),
        state,
        LoopConfig {
            max_iterations: 3,
            retry: RetryConfig {
                base_delay: Duration::from_millis(1),
                ..RetryConfig::default()
            },
            ..LoopConfig::default()
        },
    );

    let output = op
        .execute(input("please keep going and don't stop!", &session))
        .await
        .unwrap();

    assert_eq!(output.exit_reason, ExitReason::MaxTurns);
    let published = drain(&mut firehose).await;
    assert!(published.iter().all(|e| e.event_type != "agent_response"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session Registry + Agent Loop: ownership across the composition
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn session_registry_ownership_gates_access_to_a_running_loop() {
    let events = Arc::new(EventBus::new());
    let tools = Arc::new(ToolRegistry::new());
    let provider = MockProvider::single_reply("hello there");
    let op = Arc::new(make_loop(provider, tools, HookRegistry::new(), events));

    let registry: SessionRegistry<Arc<AgentLoop<MockProvider>>> = SessionRegistry::new(true);
    let session_id = SessionId::new("s-owned");
    let owner = UserId::new("alice");

    registry
        .ensure(session_id.clone(), owner.clone(), "http", layer0::DurationMs::ZERO, || Ok::<_, ()>(Arc::clone(&op)))
        .unwrap();

    let record = registry.lookup(&session_id, &owner).expect("owner can look up their own session");
    let output = record.handle.execute(input("hi", &session_id)).await.unwrap();
    assert!(output.message.as_text().unwrap().contains("hello"));

    assert!(registry.lookup(&session_id, &UserId::new("mallory")).is_err());
    assert!(registry.lookup(&session_id, &UserId::new(ANONYMOUS_USER)).is_err());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Swarm Orchestrator: plan -> run -> synthesize, and cancel races
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn parallel_swarm_runs_to_completion_with_exactly_one_terminal_event() {
    let events = Arc::new(EventBus::new());
    let mut firehose = events.subscribe_firehose();

    let provider = Arc::new(MockProvider::new(vec![Step::Respond(end_turn_response("worker or synthesis output".into()))]));
    let runner = Arc::new(SwarmRunner::new(provider, Arc::new(RuleBasedPlanner), Arc::clone(&events), SwarmLimits::default()));

    let swarm_id = Arc::clone(&runner)
        .launch("Draft the release notes. Tag the repo. Announce in chat.", "parallel", Some(3), None)
        .await
        .unwrap();

    let mut status = runner.status(&swarm_id).unwrap().status;
    for _ in 0..200 {
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        status = runner.status(&swarm_id).unwrap().status;
    }
    assert_eq!(status, SwarmStatus::Completed);

    let published = drain(&mut firehose).await;
    let terminal_events = published.iter().filter(|e| e.event_type == "swarm_completed").count();
    assert_eq!(terminal_events, 1);
}

#[tokio::test]
async fn cancelling_a_running_swarm_races_late_worker_completion_exactly_once() {
    let events = Arc::new(EventBus::new());
    let mut firehose = events.subscribe_firehose();

    let provider = Arc::new(MockProvider::new(vec![Step::Respond(end_turn_response("slow worker output".into()))]));
    let runner = Arc::new(SwarmRunner::new(provider, Arc::new(RuleBasedPlanner), Arc::clone(&events), SwarmLimits::default()));

    let swarm_id = Arc::clone(&runner).launch("write a single haiku", "parallel", Some(1), None).await.unwrap();
    runner.cancel(&swarm_id).unwrap();

    let mut status = runner.status(&swarm_id).unwrap().status;
    for _ in 0..200 {
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        status = runner.status(&swarm_id).unwrap().status;
    }
    assert_eq!(status, SwarmStatus::Cancelled);

    // A second cancel on an already-terminal swarm is a no-op, not an error.
    assert!(runner.cancel(&swarm_id).is_err());

    let published = drain(&mut firehose).await;
    let terminal_events = published
        .iter()
        .filter(|e| matches!(e.event_type.as_str(), "swarm_completed" | "swarm_cancelled" | "swarm_failed"))
        .count();
    assert_eq!(terminal_events, 1);
}

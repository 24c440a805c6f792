#![deny(missing_docs)]
//! # agent-runtime — umbrella crate
//!
//! Single import surface for the agent runtime described in this
//! workspace's specification: Signal Classifier + Noise Filter, Session
//! Registry + Agent Loop, Event Bus, and Swarm Orchestrator, plus the
//! Context Builder / Tool Registry / Hook Pipeline / Budget Gate
//! substrate they share.
//!
//! Re-exports every subsystem crate behind a feature flag, plus a
//! `prelude` module for the happy path — the same shape as the teacher
//! crate this replaces (`neuron`'s `core`/`hooks`/`op-react`/
//! `orch-local`/`state-memory`/`state-fs`/`providers-all` features),
//! renamed to this workspace's crates and module boundaries.

#[cfg(feature = "core")]
pub use layer0;
#[cfg(feature = "core")]
pub use neuron_budget;
#[cfg(feature = "core")]
pub use neuron_classifier;
#[cfg(feature = "core")]
pub use neuron_context;
#[cfg(feature = "core")]
pub use neuron_events;
#[cfg(feature = "hooks")]
pub use neuron_hook_security;
#[cfg(feature = "hooks")]
pub use neuron_hooks;
#[cfg(feature = "session")]
pub use neuron_loop;
#[cfg(feature = "op-single-shot")]
pub use neuron_op_single_shot;
#[cfg(feature = "provider-mock")]
pub use neuron_provider_mock;
#[cfg(feature = "session")]
pub use neuron_session;
#[cfg(feature = "state-fs")]
pub use neuron_state_fs;
#[cfg(feature = "state-memory")]
pub use neuron_state_memory;
#[cfg(feature = "swarm")]
pub use neuron_swarm;
#[cfg(feature = "core")]
pub use neuron_tool;
#[cfg(feature = "core")]
pub use neuron_turn;

/// Happy-path imports for composing an agent runtime.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use layer0::{
        AgentId, Content, ContentBlock, Effect, ExitReason, Hook, HookAction, HookContext,
        HookPoint, Operator, OperatorConfig, OperatorInput, OperatorOutput, Scope, SessionId,
        StateReader, StateStore, SwarmId, UserId, WorkflowId,
    };

    #[cfg(feature = "core")]
    pub use neuron_budget::{BudgetError, BudgetGateHook, BudgetLedger, BudgetLimits, LedgerEntry};

    #[cfg(feature = "core")]
    pub use neuron_classifier::{classify, ClassifierConfig, FilterDecision, NoiseFilter, Signal};

    #[cfg(feature = "core")]
    pub use neuron_context::ContextBuilder;

    #[cfg(feature = "core")]
    pub use neuron_events::{Event, EventBus};

    #[cfg(feature = "hooks")]
    pub use neuron_hooks::HookRegistry;

    #[cfg(feature = "session")]
    pub use neuron_loop::{AgentLoop, LoopConfig};

    #[cfg(feature = "op-single-shot")]
    pub use neuron_op_single_shot::SingleShotOperator;

    #[cfg(feature = "session")]
    pub use neuron_session::{SessionRegistry, ANONYMOUS_USER};

    #[cfg(feature = "state-fs")]
    pub use neuron_state_fs::FsStore;

    #[cfg(feature = "state-memory")]
    pub use neuron_state_memory::MemoryStore;

    #[cfg(feature = "swarm")]
    pub use neuron_swarm::{SwarmLimits, SwarmPattern, SwarmRunner, SwarmStatus};

    #[cfg(feature = "core")]
    pub use neuron_tool::{ToolDyn, ToolError, ToolRegistry};

    #[cfg(feature = "core")]
    pub use neuron_turn::provider::{Provider, ProviderError};
}

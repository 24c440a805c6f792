use layer0::error::HookError;
use layer0::hook::{Hook, HookAction, HookContext, HookPoint};
use layer0::test_utils::LoggingHook;
use neuron_hooks::HookRegistry;
use std::sync::Arc;

// --- Empty registry ---

#[tokio::test]
async fn empty_registry_returns_continue() {
    let registry = HookRegistry::new();
    let ctx = HookContext::new(HookPoint::SessionStart);
    let action = registry.dispatch(&ctx).await;
    assert!(matches!(action, HookAction::Continue));
}

// --- Single hook ---

#[tokio::test]
async fn single_hook_dispatches() {
    let mut registry = HookRegistry::new();
    let hook = Arc::new(LoggingHook::new());
    registry.register("logger", 0, hook.clone());

    let ctx = HookContext::new(HookPoint::SessionStart);
    let action = registry.dispatch(&ctx).await;
    assert!(matches!(action, HookAction::Continue));

    let events = hook.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].point, HookPoint::SessionStart);
}

// --- Hook ordering by priority ---

/// A hook that records its name for ordering verification.
struct NamedHook {
    name: String,
    log: Arc<std::sync::Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl Hook for NamedHook {
    fn points(&self) -> &[HookPoint] {
        &[HookPoint::PreToolUse]
    }

    async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
        self.log.lock().unwrap().push(self.name.clone());
        Ok(HookAction::Continue)
    }
}

#[tokio::test]
async fn hooks_execute_in_ascending_priority_order() {
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut registry = HookRegistry::new();
    // Registered out of priority order; dispatch must still run low-to-high.
    registry.register(
        "third",
        30,
        Arc::new(NamedHook {
            name: "third".into(),
            log: Arc::clone(&log),
        }),
    );
    registry.register(
        "first",
        10,
        Arc::new(NamedHook {
            name: "first".into(),
            log: Arc::clone(&log),
        }),
    );
    registry.register(
        "second",
        20,
        Arc::new(NamedHook {
            name: "second".into(),
            log: Arc::clone(&log),
        }),
    );

    let ctx = HookContext::new(HookPoint::PreToolUse);
    registry.dispatch(&ctx).await;

    let log = log.lock().unwrap();
    assert_eq!(*log, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn equal_priority_ties_break_by_registration_order() {
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut registry = HookRegistry::new();
    registry.register(
        "a",
        5,
        Arc::new(NamedHook {
            name: "a".into(),
            log: Arc::clone(&log),
        }),
    );
    registry.register(
        "b",
        5,
        Arc::new(NamedHook {
            name: "b".into(),
            log: Arc::clone(&log),
        }),
    );

    let ctx = HookContext::new(HookPoint::PreToolUse);
    registry.dispatch(&ctx).await;

    let log = log.lock().unwrap();
    assert_eq!(*log, vec!["a", "b"]);
}

// --- Halt propagation ---

/// A hook that halts.
struct HaltingHook;

#[async_trait::async_trait]
impl Hook for HaltingHook {
    fn points(&self) -> &[HookPoint] {
        &[HookPoint::PreToolUse]
    }

    async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
        Ok(HookAction::Halt {
            reason: "policy violation".into(),
        })
    }
}

#[tokio::test]
async fn halt_stops_pipeline() {
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut registry = HookRegistry::new();
    registry.register(
        "before-halt",
        0,
        Arc::new(NamedHook {
            name: "before-halt".into(),
            log: Arc::clone(&log),
        }),
    );
    registry.register("halter", 10, Arc::new(HaltingHook));
    registry.register(
        "after-halt",
        20,
        Arc::new(NamedHook {
            name: "after-halt".into(),
            log: Arc::clone(&log),
        }),
    );

    let ctx = HookContext::new(HookPoint::PreToolUse);
    let action = registry.dispatch(&ctx).await;

    assert!(matches!(action, HookAction::Halt { .. }));

    let log = log.lock().unwrap();
    assert_eq!(*log, vec!["before-halt"]);
}

// --- Point filtering ---

#[tokio::test]
async fn hooks_only_fire_at_registered_points() {
    let mut registry = HookRegistry::new();
    let hook = Arc::new(LoggingHook::new());
    registry.register("logger", 0, hook.clone());

    // LoggingHook registers for all 7 points.
    let ctx = HookContext::new(HookPoint::SessionEnd);
    registry.dispatch(&ctx).await;
    assert_eq!(hook.events().len(), 1);

    // A hook that only registers for PreToolUse should not fire on SessionStart.
    struct PreToolOnly;
    #[async_trait::async_trait]
    impl Hook for PreToolOnly {
        fn points(&self) -> &[HookPoint] {
            &[HookPoint::PreToolUse]
        }
        async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
            panic!("should not fire at SessionStart!");
        }
    }

    let mut registry2 = HookRegistry::new();
    registry2.register("pre-tool-only", 0, Arc::new(PreToolOnly));

    let ctx = HookContext::new(HookPoint::SessionStart);
    let action = registry2.dispatch(&ctx).await;
    assert!(matches!(action, HookAction::Continue));
}

// --- Error handling ---

/// A hook that errors (but errors don't halt).
struct ErroringHook;

#[async_trait::async_trait]
impl Hook for ErroringHook {
    fn points(&self) -> &[HookPoint] {
        &[HookPoint::PreToolUse]
    }

    async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
        Err(HookError::Failed("something broke".into()))
    }
}

#[tokio::test]
async fn hook_error_does_not_halt_pipeline() {
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut registry = HookRegistry::new();
    registry.register("erroring", 0, Arc::new(ErroringHook));
    registry.register(
        "after-error",
        10,
        Arc::new(NamedHook {
            name: "after-error".into(),
            log: Arc::clone(&log),
        }),
    );

    let ctx = HookContext::new(HookPoint::PreToolUse);
    let action = registry.dispatch(&ctx).await;

    assert!(matches!(action, HookAction::Continue));
    let log = log.lock().unwrap();
    assert_eq!(*log, vec!["after-error"]);
}

// --- SkipTool and ModifyToolInput propagation ---

struct SkipToolHook;

#[async_trait::async_trait]
impl Hook for SkipToolHook {
    fn points(&self) -> &[HookPoint] {
        &[HookPoint::PreToolUse]
    }

    async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
        Ok(HookAction::SkipTool {
            reason: "not allowed".into(),
        })
    }
}

#[tokio::test]
async fn skip_tool_stops_pipeline() {
    let mut registry = HookRegistry::new();
    registry.register("skip", 0, Arc::new(SkipToolHook));

    let ctx = HookContext::new(HookPoint::PreToolUse);
    let action = registry.dispatch(&ctx).await;
    assert!(matches!(action, HookAction::SkipTool { .. }));
}

struct ModifyInputHook;

#[async_trait::async_trait]
impl Hook for ModifyInputHook {
    fn points(&self) -> &[HookPoint] {
        &[HookPoint::PreToolUse]
    }

    async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
        Ok(HookAction::ModifyToolInput {
            new_input: serde_json::json!({"sanitized": true}),
        })
    }
}

#[tokio::test]
async fn modify_tool_input_stops_pipeline() {
    let mut registry = HookRegistry::new();
    registry.register("modify", 0, Arc::new(ModifyInputHook));

    let ctx = HookContext::new(HookPoint::PreToolUse);
    let action = registry.dispatch(&ctx).await;
    assert!(matches!(action, HookAction::ModifyToolInput { .. }));
}

// --- Hot-reload: remove + re-register ---

#[tokio::test]
async fn remove_then_register_replaces_hook() {
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut registry = HookRegistry::new();
    registry.register(
        "swappable",
        0,
        Arc::new(NamedHook {
            name: "v1".into(),
            log: Arc::clone(&log),
        }),
    );
    registry.remove("swappable");
    registry.register(
        "swappable",
        0,
        Arc::new(NamedHook {
            name: "v2".into(),
            log: Arc::clone(&log),
        }),
    );

    let ctx = HookContext::new(HookPoint::PreToolUse);
    registry.dispatch(&ctx).await;

    let log = log.lock().unwrap();
    assert_eq!(*log, vec!["v2"]);
}

#![deny(missing_docs)]
//! Hook registry and composition for the agent runtime.
//!
//! The [`HookRegistry`] collects multiple [`Hook`] implementations into
//! a priority-ordered pipeline. At each hook point, hooks registered for
//! that point are dispatched in ascending priority order (lower runs
//! first); ties are broken by registration order. The pipeline
//! short-circuits on `Halt`, `SkipTool`, or `ModifyToolInput` —
//! subsequent hooks are not called. Hook errors are logged and the
//! pipeline continues (errors don't halt).

use layer0::hook::{Hook, HookAction, HookContext};
use std::sync::Arc;

/// A single hook registration: name, priority, and the hook itself.
struct Registration {
    name: String,
    priority: i32,
    hook: Arc<dyn Hook>,
}

/// A registry that dispatches hook events to a priority-ordered pipeline
/// of hooks.
///
/// Hooks fire in ascending priority order (lower priority value = earlier).
/// The pipeline short-circuits on any action other than `Continue` (except
/// errors, which are logged and ignored).
pub struct HookRegistry {
    registrations: Vec<Registration>,
}

impl HookRegistry {
    /// Create a new empty hook registry.
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Register a hook under a name with a given priority (lower runs
    /// earlier). Re-sorts the pipeline so the new hook takes effect for
    /// every dispatch after this call returns, including loops already
    /// in flight that haven't yet reached this event point.
    pub fn register(&mut self, name: impl Into<String>, priority: i32, hook: Arc<dyn Hook>) {
        self.registrations.push(Registration {
            name: name.into(),
            priority,
            hook,
        });
        // Stable sort: ties keep registration order.
        self.registrations.sort_by_key(|r| r.priority);
    }

    /// Add a hook at priority 0 (kept for callers that don't care about
    /// ordering relative to other hooks).
    pub fn add(&mut self, hook: Arc<dyn Hook>) {
        self.register("unnamed", 0, hook);
    }

    /// Remove every registration with the given name. Used by hot-reload
    /// to replace a hook: remove then register again.
    pub fn remove(&mut self, name: &str) {
        self.registrations.retain(|r| r.name != name);
    }

    /// Names of all currently registered hooks, in dispatch order.
    pub fn names(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.name.as_str()).collect()
    }

    /// Dispatch a hook event through the pipeline.
    ///
    /// Returns the final action. If all hooks return `Continue`, the
    /// result is `Continue`. If any hook returns `Halt`, `SkipTool`,
    /// or `ModifyToolInput`, the pipeline stops and that action is
    /// returned. Hook errors are logged and treated as `Continue`.
    pub async fn dispatch(&self, ctx: &HookContext) -> HookAction {
        for reg in &self.registrations {
            if !reg.hook.points().contains(&ctx.point) {
                continue;
            }

            match reg.hook.on_event(ctx).await {
                Ok(HookAction::Continue) => continue,
                Ok(action) => return action,
                Err(e) => {
                    tracing::warn!(hook = %reg.name, error = %e, "hook raised an error; continuing");
                    continue;
                }
            }
        }

        HookAction::Continue
    }

    /// Dispatch to every matching hook without honoring short-circuit
    /// actions, ignoring their return values. Used for `post_tool_use`
    /// and other fire-and-forget events where a handler's decision
    /// cannot abort anything.
    pub async fn dispatch_all(&self, ctx: &HookContext) {
        for reg in &self.registrations {
            if !reg.hook.points().contains(&ctx.point) {
                continue;
            }
            if let Err(e) = reg.hook.on_event(ctx).await {
                tracing::warn!(hook = %reg.name, error = %e, "hook raised an error; continuing");
            }
        }
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

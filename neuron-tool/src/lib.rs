#![deny(missing_docs)]
//! Tool registry and dispatcher for the agent runtime.
//!
//! Defines the [`ToolDyn`] trait for object-safe tool abstraction, the
//! [`ToolOutput`] envelope every handler returns, and [`ToolRegistry`]
//! — a hot-reloadable catalogue that dispatches a named call under a
//! per-tool timeout and never lets a handler panic escape the turn.
//!
//! The registry itself enforces only name resolution and timeout; the
//! deny-list/allow-list safety checks from spec §4.6 are implemented as
//! `pre_tool_use` [`Hook`](layer0::hook::Hook)s in `neuron-hook-security`,
//! run ahead of dispatch by the agent loop.

pub mod builtin;

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from tool operations that escape the dispatcher itself (as
/// opposed to handler-reported failures, which live inside [`ToolOutput`]).
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// The requested tool was not found in the registry.
    #[error("unknown_tool")]
    UnknownTool,

    /// The tool did not complete within its configured timeout.
    #[error("tool_timeout")]
    Timeout,
}

/// An image result from a tool, per spec §3's `image_envelope`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ImageEnvelope {
    /// MIME type, e.g. `image/png`.
    pub media_type: String,
    /// Base64-encoded image bytes, present for inline images.
    pub base64: Option<String>,
    /// Filesystem path, present for images written to disk instead of inlined.
    pub path: Option<String>,
}

/// The value half of a tool handler's result, per spec §3:
/// `{ok, string} | {ok, image_envelope} | {error, string_reason}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutput {
    /// A successful plain-text result.
    Text(String),
    /// A successful image result.
    Image(ImageEnvelope),
    /// A handler-reported failure. Distinct from [`ToolError`]: handlers
    /// never throw, they signal failure by returning this variant, and
    /// identical arguments must fail with the same error kind every time
    /// (see spec §3's tool descriptor invariant).
    Error(String),
}

impl ToolOutput {
    /// Render this output as the string fed back into conversation
    /// history as a tool-result message.
    pub fn as_history_text(&self) -> String {
        match self {
            ToolOutput::Text(s) => s.clone(),
            ToolOutput::Image(img) => format!(
                "[image: {}{}]",
                img.media_type,
                img.path.as_deref().map(|p| format!(" at {p}")).unwrap_or_default()
            ),
            ToolOutput::Error(reason) => reason.clone(),
        }
    }

    /// Whether this is an error output (handler-reported, not dispatcher-level).
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error(_))
    }
}

/// Object-safe trait for tool implementations.
///
/// Any tool source (local function, shell wrapper, file accessor, MCP
/// bridge) implements this trait. Tools are stored as `Arc<dyn ToolDyn>`
/// in [`ToolRegistry`]. Handlers must never panic; `call` returning
/// `Err` is reserved for truly exceptional conditions the dispatcher
/// itself needs to know about (in practice, implementations should
/// prefer `Ok(ToolOutput::Error(..))` and are still protected from
/// panics by [`ToolRegistry::dispatch`]'s timeout/catch boundary).
pub trait ToolDyn: Send + Sync {
    /// The tool's unique name.
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given input.
    fn call(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>>;
}

/// A snapshot of the tool catalogue, shared lock-free across readers.
type Catalogue = HashMap<String, Arc<dyn ToolDyn>>;

/// Hot-reloadable registry of tools available to the agent loop.
///
/// Registration swaps in a new immutable [`Catalogue`] version via
/// [`ArcSwap`]; any loop iteration already in flight keeps using the
/// version it captured at iteration start (`snapshot`), so hot-reload
/// never disrupts an in-flight call — new registrations simply take
/// effect for every call dispatched after they land.
pub struct ToolRegistry {
    catalogue: ArcSwap<Catalogue>,
    default_timeout: Duration,
}

impl ToolRegistry {
    /// Create an empty registry with the spec's default per-tool timeout
    /// of 30 seconds.
    pub fn new() -> Self {
        Self {
            catalogue: ArcSwap::from_pointee(HashMap::new()),
            default_timeout: Duration::from_secs(30),
        }
    }

    /// Create an empty registry with a custom default per-tool timeout.
    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        Self {
            catalogue: ArcSwap::from_pointee(HashMap::new()),
            default_timeout,
        }
    }

    /// Register a tool, replacing any existing tool of the same name.
    /// Takes effect for every subsequent dispatch without restart.
    pub fn register(&self, tool: Arc<dyn ToolDyn>) {
        let mut next = (**self.catalogue.load()).clone();
        next.insert(tool.name().to_string(), tool);
        self.catalogue.store(Arc::new(next));
    }

    /// Remove a tool by name. A no-op if the tool isn't registered.
    pub fn unregister(&self, name: &str) {
        let mut next = (**self.catalogue.load()).clone();
        next.remove(name);
        self.catalogue.store(Arc::new(next));
    }

    /// Look up a tool by name in the current catalogue snapshot.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolDyn>> {
        self.catalogue.load().get(name).cloned()
    }

    /// The full tool catalogue as `(name, description, schema)` triples,
    /// for the Context Builder's static base and the `/tools` HTTP endpoint.
    pub fn catalogue(&self) -> Vec<(String, String, serde_json::Value)> {
        self.catalogue
            .load()
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string(), t.input_schema()))
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.catalogue.load().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.catalogue.load().is_empty()
    }

    /// Dispatch a named tool call with the registry's default timeout.
    ///
    /// Resolves `name` against the catalogue snapshot captured at the
    /// start of this call. Returns `Err(ToolError::UnknownTool)` if the
    /// name isn't registered, `Err(ToolError::Timeout)` if the handler
    /// doesn't complete in time, otherwise the handler's [`ToolOutput`]
    /// (which may itself be `ToolOutput::Error` — a handler-reported
    /// failure, not a dispatcher failure).
    pub async fn dispatch(
        &self,
        name: &str,
        input: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        self.dispatch_with_timeout(name, input, self.default_timeout).await
    }

    /// Dispatch with an explicit timeout override.
    pub async fn dispatch_with_timeout(
        &self,
        name: &str,
        input: serde_json::Value,
        timeout: Duration,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.get(name).ok_or(ToolError::UnknownTool)?;
        match tokio::time::timeout(timeout, tool.call(input)).await {
            Ok(output) => Ok(output),
            Err(_elapsed) => Err(ToolError::Timeout),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn _assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn tool_dyn_is_object_safe() {
        _assert_send_sync::<Arc<dyn ToolDyn>>();
    }

    struct EchoTool;

    impl ToolDyn for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input back"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn call(
            &self,
            input: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>> {
            Box::pin(async move { ToolOutput::Text(input.to_string()) })
        }
    }

    struct FailTool;

    impl ToolDyn for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn call(
            &self,
            _input: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>> {
            Box::pin(async { ToolOutput::Error("always fails".into()) })
        }
    }

    struct SlowTool;

    impl ToolDyn for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Never completes in time"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn call(
            &self,
            _input: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                ToolOutput::Text("too late".into())
            })
        }
    }

    #[test]
    fn registry_add_and_get() {
        let reg = ToolRegistry::new();
        assert!(reg.is_empty());

        reg.register(Arc::new(EchoTool));
        assert_eq!(reg.len(), 1);
        assert!(reg.get("echo").is_some());
        assert!(reg.get("nonexistent").is_none());
    }

    #[test]
    fn registry_unregister() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.unregister("echo");
        assert!(reg.is_empty());
        // Unregistering a missing tool is a no-op, not an error.
        reg.unregister("echo");
    }

    #[test]
    fn registry_catalogue_lists_schema() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let cat = reg.catalogue();
        assert_eq!(cat.len(), 1);
        assert_eq!(cat[0].0, "echo");
    }

    #[tokio::test]
    async fn registry_dispatch_ok() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));

        let result = reg.dispatch("echo", json!({"msg": "hello"})).await.unwrap();
        assert_eq!(result, ToolOutput::Text(json!({"msg": "hello"}).to_string()));
    }

    #[tokio::test]
    async fn registry_dispatch_handler_error_is_not_dispatcher_error() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(FailTool));

        let result = reg.dispatch("fail", json!({})).await.unwrap();
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn registry_dispatch_unknown_tool() {
        let reg = ToolRegistry::new();
        let result = reg.dispatch("nope", json!({})).await;
        assert_eq!(result.unwrap_err(), ToolError::UnknownTool);
    }

    #[tokio::test]
    async fn registry_dispatch_timeout() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(SlowTool));

        let result = reg
            .dispatch_with_timeout("slow", json!({}), Duration::from_millis(10))
            .await;
        assert_eq!(result.unwrap_err(), ToolError::Timeout);
    }

    #[test]
    fn registry_overwrite() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        assert_eq!(reg.len(), 1);

        reg.register(Arc::new(EchoTool));
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn hot_reload_takes_effect_immediately() {
        let reg = Arc::new(ToolRegistry::new());
        assert!(reg.get("echo").is_none());

        reg.register(Arc::new(EchoTool));
        assert!(reg.dispatch("echo", json!({})).await.is_ok());
    }
}

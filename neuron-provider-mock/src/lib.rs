#![deny(missing_docs)]
//! A scriptable in-memory [`Provider`] for tests and the end-to-end
//! scenarios that exercise the agent loop without a real vendor
//! integration.
//!
//! Shaped like `neuron-provider-anthropic`/`-openai`/`-ollama` — a
//! struct implementing [`Provider`], with a single constructor and a
//! builder method — but with a scripted queue instead of an HTTP
//! client, since real vendor adapters are out of scope here.

use neuron_turn::provider::{Provider, ProviderError};
use neuron_turn::types::{ProviderRequest, ProviderResponse, StopReason, TokenUsage};
use std::sync::Mutex;

/// One scripted outcome for [`MockProvider::complete`].
#[derive(Debug, Clone)]
pub enum Step {
    /// Return this response.
    Respond(ProviderResponse),
    /// Fail with this error.
    Fail(ProviderError),
}

/// A `Provider` whose responses are scripted in advance: a FIFO queue of
/// [`Step`]s, one consumed per `complete` call. Useful for exercising
/// tool-call loops (`Respond` a `ToolUse` step N times, then `EndTurn`),
/// retry paths (`Fail` with a transient error before a later success),
/// and hard-error paths (`Fail` with a hard error).
///
/// When the queue is exhausted, `complete` keeps returning the last
/// step forever — this lets a test script "emit tool calls forever" per
/// spec §8 without needing an unbounded queue.
pub struct MockProvider {
    steps: Mutex<Vec<Step>>,
    calls: Mutex<usize>,
}

impl MockProvider {
    /// Create a provider that plays back `steps` in order, repeating the
    /// last step once exhausted.
    pub fn new(steps: Vec<Step>) -> Self {
        assert!(!steps.is_empty(), "MockProvider needs at least one scripted step");
        Self {
            steps: Mutex::new(steps),
            calls: Mutex::new(0),
        }
    }

    /// Convenience constructor for a single-turn final reply: one
    /// `EndTurn` response with `text`.
    pub fn single_reply(text: impl Into<String>) -> Self {
        Self::new(vec![Step::Respond(end_turn_response(text.into()))])
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        *self.calls.lock().expect("mock provider mutex poisoned")
    }
}

/// Build a minimal `EndTurn` response carrying a single text block.
pub fn end_turn_response(text: String) -> ProviderResponse {
    ProviderResponse {
        content: vec![neuron_turn::types::ContentPart::Text { text }],
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage::default(),
        model: "mock-1".to_string(),
        cost: None,
        truncated: None,
    }
}

/// Build a minimal `ToolUse` response invoking `tool_name` with `input`.
pub fn tool_use_response(call_id: &str, tool_name: &str, input: serde_json::Value) -> ProviderResponse {
    ProviderResponse {
        content: vec![neuron_turn::types::ContentPart::ToolUse {
            id: call_id.to_string(),
            name: tool_name.to_string(),
            input,
        }],
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage::default(),
        model: "mock-1".to_string(),
        cost: None,
        truncated: None,
    }
}

impl Provider for MockProvider {
    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut calls = self.calls.lock().expect("mock provider mutex poisoned");
        let index = *calls;
        *calls += 1;
        drop(calls);

        let steps = self.steps.lock().expect("mock provider mutex poisoned");
        let step = steps.get(index).unwrap_or_else(|| steps.last().expect("non-empty"));
        match step.clone() {
            Step::Respond(response) => Ok(response),
            Step::Fail(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_back_steps_in_order() {
        let provider = MockProvider::new(vec![
            Step::Respond(tool_use_response("call-1", "read_file", serde_json::json!({"path": "a.txt"}))),
            Step::Respond(end_turn_response("done".to_string())),
        ]);

        let req = ProviderRequest {
            model: None,
            messages: vec![],
            tools: vec![],
            max_tokens: None,
            temperature: None,
            system: None,
            extra: serde_json::Value::Null,
        };

        let first = provider.complete(req.clone()).await.unwrap();
        assert_eq!(first.stop_reason, StopReason::ToolUse);

        let second = provider.complete(req).await.unwrap();
        assert_eq!(second.stop_reason, StopReason::EndTurn);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn repeats_last_step_when_exhausted() {
        let provider = MockProvider::single_reply("only reply");
        let req = ProviderRequest {
            model: None,
            messages: vec![],
            tools: vec![],
            max_tokens: None,
            temperature: None,
            system: None,
            extra: serde_json::Value::Null,
        };
        provider.complete(req.clone()).await.unwrap();
        let again = provider.complete(req).await.unwrap();
        assert_eq!(again.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn scripts_a_transient_failure_then_success() {
        let provider = MockProvider::new(vec![
            Step::Fail(ProviderError::RateLimited),
            Step::Respond(end_turn_response("recovered".to_string())),
        ]);
        let req = ProviderRequest {
            model: None,
            messages: vec![],
            tools: vec![],
            max_tokens: None,
            temperature: None,
            system: None,
            extra: serde_json::Value::Null,
        };
        let first = provider.complete(req.clone()).await;
        assert!(matches!(first, Err(e) if e.is_transient()));
        let second = provider.complete(req).await.unwrap();
        assert_eq!(second.stop_reason, StopReason::EndTurn);
    }
}

//! Task decomposition for a swarm launch.
//!
//! `Planner` is deliberately a plain object-safe trait (unlike
//! `neuron_turn::provider::Provider`) since a planner is consulted once
//! per launch, not on every hot-path turn — the RPITIT ergonomics that
//! matter for `Provider` aren't worth the genericity cost here.

use async_trait::async_trait;
use neuron_turn::provider::Provider;
use neuron_turn::types::{ContentPart, ProviderMessage, ProviderRequest, Role};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One item of a swarm's plan: a role and the subtask text assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    /// The role this worker plays (e.g. "researcher", "critic", "generalist").
    pub role: String,
    /// The subtask text this worker receives.
    pub subtask_text: String,
}

/// Decomposes a task into a bounded list of plan items.
///
/// Per spec §4.10, a planner failure falls back to a single-agent plan —
/// that fallback lives in `SwarmRunner::launch`, not here, so a planner
/// is free to fail loudly.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Decompose `task` into at most `max_agents` plan items.
    async fn plan(&self, task: &str, max_agents: usize) -> Result<Vec<PlanItem>, String>;
}

/// Splits a task on sentence-ish boundaries (`.`, `;`, newlines) into up
/// to `max_agents` generalist workers. No model call, no network —
/// always succeeds.
pub struct RuleBasedPlanner;

#[async_trait]
impl Planner for RuleBasedPlanner {
    async fn plan(&self, task: &str, max_agents: usize) -> Result<Vec<PlanItem>, String> {
        let pieces: Vec<&str> = task
            .split(['.', ';', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if pieces.len() <= 1 {
            return Ok(vec![PlanItem {
                role: "generalist".to_string(),
                subtask_text: task.to_string(),
            }]);
        }

        Ok(pieces
            .into_iter()
            .take(max_agents.max(1))
            .enumerate()
            .map(|(i, text)| PlanItem {
                role: format!("agent_{}", i + 1),
                subtask_text: text.to_string(),
            })
            .collect())
    }
}

/// Decomposes a task by asking a provider for a JSON plan.
///
/// The prompt asks for `{"plan": [{"role": ..., "subtask_text": ...}]}`;
/// anything that doesn't parse to that shape is a planner failure, which
/// `SwarmRunner::launch` handles by falling back to a single-agent plan.
pub struct ProviderPlanner<P: Provider> {
    provider: Arc<P>,
}

impl<P: Provider> ProviderPlanner<P> {
    /// Wrap a provider as a JSON-decomposing planner.
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[derive(Debug, Deserialize)]
struct PlanResponse {
    plan: Vec<PlanItem>,
}

#[async_trait]
impl<P: Provider + Send + Sync> Planner for ProviderPlanner<P> {
    async fn plan(&self, task: &str, max_agents: usize) -> Result<Vec<PlanItem>, String> {
        let request = ProviderRequest {
            model: None,
            messages: vec![ProviderMessage {
                role: Role::User,
                content: vec![ContentPart::Text {
                    text: format!(
                        "Decompose this task into at most {max_agents} worker roles. \
                         Respond with JSON only, shaped exactly as \
                         {{\"plan\": [{{\"role\": \"...\", \"subtask_text\": \"...\"}}]}}.\n\nTask: {task}"
                    ),
                }],
            }],
            tools: vec![],
            max_tokens: Some(1024),
            temperature: None,
            system: Some("You are a task planner. Output only valid JSON, no prose.".to_string()),
            extra: serde_json::Value::Null,
        };

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| e.to_string())?;

        let text = response
            .content
            .iter()
            .find_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .ok_or_else(|| "planner response had no text content".to_string())?;

        let parsed: PlanResponse = serde_json::from_str(text).map_err(|e| e.to_string())?;
        if parsed.plan.is_empty() {
            return Err("planner returned an empty plan".to_string());
        }
        Ok(parsed.plan.into_iter().take(max_agents.max(1)).collect())
    }
}

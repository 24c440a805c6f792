//! Context Builder — token-budgeted system-prompt assembly, per spec §4.5.
//!
//! Two tiers. The **static base** (tool catalogue, security guardrail,
//! behavioural profile) is cached per process and only recomputed when
//! [`ContextBuilder::rebuild_static_base`] is called (on configuration
//! reload — tool registration, guardrail edits). The **dynamic overlay**
//! is assembled fresh on every call from four descending-priority tiers,
//! fit into whatever budget remains after the static base and
//! conversation history.
//!
//! This is new code: the teacher's `ReactOperator` sends a single opaque
//! `config.system_prompt` string and never tiers or budgets it. The
//! shape of what counts as "signal"/"environment" data is grounded on
//! `layer0::lifecycle` and `neuron_classifier::Signal`.

use neuron_classifier::Signal;
use neuron_tool::ToolRegistry;
use std::sync::Arc;

/// Block-concatenation separator within the dynamic overlay.
const SEPARATOR: &str = "\n\n";

/// Marker appended to a block truncated at a word boundary.
const TRUNCATION_MARKER: &str = " [...truncated...]";

/// Estimates how many tokens a string will cost a provider.
///
/// The deterministic fallback is always available; a real tokenizer
/// service can be plugged in by implementing this trait, per the
/// corpus's preference for a pluggable seam over a hardcoded heuristic.
pub trait TokenEstimator: Send + Sync {
    /// Estimate the token count of `text`.
    fn estimate(&self, text: &str) -> usize;
}

/// Deterministic fallback: ≈ 1 token per 1.3 whitespace-separated words,
/// plus one token per run of punctuation, per spec §4.5.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        let words = text.split_whitespace().count();
        let punctuation = text
            .chars()
            .filter(|c| c.is_ascii_punctuation())
            .count();
        ((words as f64 / 1.3).ceil() as usize) + punctuation
    }
}

/// Fixed, rarely-changing prompt content that makes up the static base.
#[derive(Debug, Clone)]
pub struct StaticBaseConfig {
    /// Fixed security guardrail text.
    pub security_guardrail: String,
    /// Fixed behavioural profile text.
    pub behavioral_profile: String,
}

/// The cached static base: tool catalogue + guardrail + behavioural
/// profile, flattened to a single string with its token count memoised.
#[derive(Debug, Clone)]
pub struct StaticBase {
    text: String,
    tokens: usize,
    /// Whether providers that support prompt caching may mark this block
    /// cache-eligible. Always `true` today — the static base never
    /// varies within a process lifetime between rebuilds.
    pub cacheable: bool,
}

impl StaticBase {
    fn build(tools: &ToolRegistry, config: &StaticBaseConfig, estimator: &dyn TokenEstimator) -> Self {
        let mut sections = Vec::new();

        let mut catalogue = tools.catalogue();
        catalogue.sort_by(|a, b| a.0.cmp(&b.0));
        if !catalogue.is_empty() {
            let mut tool_section = String::from("Available tools:\n");
            for (name, description, schema) in &catalogue {
                tool_section.push_str(&format!("- {name}: {description} (args: {schema})\n"));
            }
            sections.push(tool_section);
        }

        sections.push(config.security_guardrail.clone());
        sections.push(config.behavioral_profile.clone());

        let text = sections.join(SEPARATOR);
        let tokens = estimator.estimate(&text);
        Self {
            text,
            tokens,
            cacheable: true,
        }
    }

    /// The assembled text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Memoised token count.
    pub fn tokens(&self) -> usize {
        self.tokens
    }
}

/// Runtime facts about the inbound call, per spec §4.5's P1 tier.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// Epoch-millisecond timestamp of this call.
    pub timestamp: u64,
    /// The channel the message arrived on.
    pub channel: String,
    /// The session this call belongs to, if any.
    pub session_id: Option<String>,
}

/// Environment facts, per spec §4.5's P1 tier.
#[derive(Debug, Clone)]
pub struct EnvironmentContext {
    /// Current working directory.
    pub cwd: String,
    /// Current date (already formatted by the caller; the builder does
    /// not read the clock itself).
    pub date: String,
    /// Operating system identifier.
    pub os: String,
    /// The active provider name.
    pub provider: String,
    /// The active model name.
    pub model: String,
}

/// Everything the dynamic overlay needs for one call. Borrowed, not
/// owned — the builder doesn't outlive the call.
pub struct OverlayRequest<'a> {
    /// The classified signal for this message.
    pub signal: &'a Signal,
    /// Runtime facts (P1).
    pub runtime: RuntimeContext,
    /// Environment facts (P1).
    pub environment: EnvironmentContext,
    /// Optional plan-mode directive (P1).
    pub plan_mode_directive: Option<&'a str>,
    /// Long-term memory candidates to rank by keyword overlap against
    /// the signal's raw text and include as fits (P2).
    pub memory_candidates: &'a [String],
    /// Current task list (P2).
    pub task_list: &'a [String],
    /// Workflow state summary, if any (P2).
    pub workflow_state: Option<&'a str>,
    /// Communication profile text (P3).
    pub communication_profile: Option<&'a str>,
    /// Memory bulletin text (P3).
    pub memory_bulletin: Option<&'a str>,
    /// Active machine/template addenda (P4).
    pub addenda: &'a [String],
    /// Tokens already spent on conversation history.
    pub history_tokens: usize,
    /// The model's max output/context tokens for this call.
    pub max_tokens: usize,
    /// Tokens to reserve for the model's response.
    pub response_reserve: usize,
}

/// The assembled context for one call: a cacheable static block and an
/// uncached dynamic block, per spec §4.5's prompt-caching optimisation.
#[derive(Debug, Clone)]
pub struct BuiltContext {
    /// The static base text.
    pub static_base: String,
    /// Whether the static base may be marked cache-eligible.
    pub static_base_cacheable: bool,
    /// The assembled dynamic overlay text.
    pub dynamic_overlay: String,
    /// Total tokens consumed by `static_base`.
    pub static_base_tokens: usize,
    /// Total tokens consumed by `dynamic_overlay`.
    pub dynamic_overlay_tokens: usize,
}

impl BuiltContext {
    /// The combined system message, for providers that don't distinguish
    /// cacheable/uncached blocks. They get the same content either way.
    pub fn as_single_string(&self) -> String {
        format!("{}{SEPARATOR}{}", self.static_base, self.dynamic_overlay)
    }
}

/// Assembles the system message within a token budget, per spec §4.5.
pub struct ContextBuilder {
    tools: Arc<ToolRegistry>,
    static_config: StaticBaseConfig,
    estimator: Arc<dyn TokenEstimator>,
    static_base: StaticBase,
}

impl ContextBuilder {
    /// Build a new context builder, computing the static base once.
    pub fn new(tools: Arc<ToolRegistry>, static_config: StaticBaseConfig) -> Self {
        Self::with_estimator(tools, static_config, Arc::new(HeuristicEstimator))
    }

    /// Build with a custom token estimator (e.g. a real tokenizer
    /// service) instead of the deterministic heuristic.
    pub fn with_estimator(
        tools: Arc<ToolRegistry>,
        static_config: StaticBaseConfig,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        let static_base = StaticBase::build(&tools, &static_config, estimator.as_ref());
        Self {
            tools,
            static_config,
            estimator,
            static_base,
        }
    }

    /// Recompute the static base. Call this after a tool registration or
    /// a guardrail/profile configuration change — the static base is
    /// otherwise memoised for the life of the process.
    pub fn rebuild_static_base(&mut self) {
        self.static_base = StaticBase::build(&self.tools, &self.static_config, self.estimator.as_ref());
    }

    /// The cached static base.
    pub fn static_base(&self) -> &StaticBase {
        &self.static_base
    }

    /// Assemble the full context for one call.
    pub fn build(&self, request: &OverlayRequest<'_>) -> BuiltContext {
        let budget = request
            .max_tokens
            .saturating_sub(request.response_reserve)
            .saturating_sub(request.history_tokens)
            .saturating_sub(self.static_base.tokens);

        let mut remaining = budget;
        let mut blocks = Vec::new();

        // P1: always included in full, never truncated.
        let p1 = self.render_p1(request);
        remaining = remaining.saturating_sub(self.estimator.estimate(&p1));
        blocks.push(p1);

        // P2: long-term memory, tasks, workflow state — capped at 40% of B.
        let p2_budget = ((budget as f64 * 0.4) as usize).min(remaining);
        let (p2, used) = self.render_p2(request, p2_budget);
        if !p2.is_empty() {
            blocks.push(p2);
        }
        remaining = remaining.saturating_sub(used);

        // P3: communication profile, memory bulletin — capped at 30% of B.
        let p3_budget = ((budget as f64 * 0.3) as usize).min(remaining);
        let (p3, used) = self.render_p3(request, p3_budget);
        if !p3.is_empty() {
            blocks.push(p3);
        }
        remaining = remaining.saturating_sub(used);

        // P4: whatever's left.
        let (p4, _used) = self.render_p4(request, remaining);
        if !p4.is_empty() {
            blocks.push(p4);
        }

        let dynamic_overlay = blocks.join(SEPARATOR);
        let dynamic_overlay_tokens = self.estimator.estimate(&dynamic_overlay);

        BuiltContext {
            static_base: self.static_base.text.clone(),
            static_base_cacheable: self.static_base.cacheable,
            dynamic_overlay,
            static_base_tokens: self.static_base.tokens,
            dynamic_overlay_tokens,
        }
    }

    fn render_p1(&self, request: &OverlayRequest<'_>) -> String {
        let signal = request.signal;
        let mut out = format!(
            "Signal: mode={:?} genre={:?} type={} weight={:.2}\n\
             Runtime: timestamp={} channel={} session={}\n\
             Environment: cwd={} date={} os={} provider={} model={}",
            signal.mode,
            signal.genre,
            signal.kind,
            signal.weight,
            request.runtime.timestamp,
            request.runtime.channel,
            request.runtime.session_id.as_deref().unwrap_or("none"),
            request.environment.cwd,
            request.environment.date,
            request.environment.os,
            request.environment.provider,
            request.environment.model,
        );
        if let Some(plan) = request.plan_mode_directive {
            out.push_str(&format!("\nPlan mode: {plan}"));
        }
        out
    }

    fn render_p2(&self, request: &OverlayRequest<'_>, budget: usize) -> (String, usize) {
        let mut remaining = budget;
        let mut parts = Vec::new();

        let ranked = rank_by_keyword_overlap(&request.signal.raw_text, request.memory_candidates);
        if !ranked.is_empty() {
            let (text, used) = fit_list("Relevant memory:", &ranked, remaining, self.estimator.as_ref());
            remaining = remaining.saturating_sub(used);
            if !text.is_empty() {
                parts.push(text);
            }
        }

        if !request.task_list.is_empty() {
            let (text, used) = fit_list("Task list:", request.task_list, remaining, self.estimator.as_ref());
            remaining = remaining.saturating_sub(used);
            if !text.is_empty() {
                parts.push(text);
            }
        }

        if let Some(state) = request.workflow_state {
            let (text, used) = fit_block(&format!("Workflow state: {state}"), remaining, self.estimator.as_ref());
            remaining = remaining.saturating_sub(used);
            if !text.is_empty() {
                parts.push(text);
            }
        }

        let used_total = budget.saturating_sub(remaining);
        (parts.join(SEPARATOR), used_total)
    }

    fn render_p3(&self, request: &OverlayRequest<'_>, budget: usize) -> (String, usize) {
        let mut remaining = budget;
        let mut parts = Vec::new();

        if let Some(profile) = request.communication_profile {
            let (text, used) = fit_block(&format!("Communication profile: {profile}"), remaining, self.estimator.as_ref());
            remaining = remaining.saturating_sub(used);
            if !text.is_empty() {
                parts.push(text);
            }
        }

        if let Some(bulletin) = request.memory_bulletin {
            let (text, used) = fit_block(&format!("Memory bulletin: {bulletin}"), remaining, self.estimator.as_ref());
            remaining = remaining.saturating_sub(used);
            if !text.is_empty() {
                parts.push(text);
            }
        }

        let used_total = budget.saturating_sub(remaining);
        (parts.join(SEPARATOR), used_total)
    }

    fn render_p4(&self, request: &OverlayRequest<'_>, budget: usize) -> (String, usize) {
        if request.addenda.is_empty() {
            return (String::new(), 0);
        }
        fit_list("Active addenda:", request.addenda, budget, self.estimator.as_ref())
    }
}

/// Rank memory candidates by whitespace-token overlap with `text`,
/// descending. Ties keep input order (stable sort).
fn rank_by_keyword_overlap(text: &str, candidates: &[String]) -> Vec<String> {
    let query: std::collections::HashSet<String> =
        text.to_lowercase().split_whitespace().map(str::to_string).collect();

    let mut scored: Vec<(usize, &String)> = candidates
        .iter()
        .map(|c| {
            let overlap = c
                .to_lowercase()
                .split_whitespace()
                .filter(|w| query.contains(*w))
                .count();
            (overlap, c)
        })
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, c)| c.clone()).collect()
}

/// Render a heading plus a bulleted list of `items`, truncating the
/// whole block to fit `budget` tokens.
fn fit_list(heading: &str, items: &[String], budget: usize, estimator: &dyn TokenEstimator) -> (String, usize) {
    let mut text = String::from(heading);
    for item in items {
        text.push('\n');
        text.push_str("- ");
        text.push_str(item);
    }
    fit_block(&text, budget, estimator)
}

/// Include `text` in full if it fits `budget` tokens; otherwise truncate
/// at a word boundary and append the truncation marker, per spec §4.5.
/// Returns the (possibly truncated) text and the tokens it consumes.
fn fit_block(text: &str, budget: usize, estimator: &dyn TokenEstimator) -> (String, usize) {
    if budget == 0 {
        return (String::new(), 0);
    }

    let full_tokens = estimator.estimate(text);
    if full_tokens <= budget {
        return (text.to_string(), full_tokens);
    }

    // Binary search the longest word-boundary prefix whose estimated
    // token count (plus the marker) fits the budget.
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut included = words.len();
    loop {
        if included == 0 {
            return (TRUNCATION_MARKER.trim_start().to_string(), estimator.estimate(TRUNCATION_MARKER));
        }
        let candidate = words[..included].join(" ") + TRUNCATION_MARKER;
        if estimator.estimate(&candidate) <= budget {
            let tokens = estimator.estimate(&candidate);
            return (candidate, tokens);
        }
        included -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuron_classifier::{ClassifierConfig, classify};
    use neuron_tool::ToolRegistry;

    fn sample_signal() -> Signal {
        classify("please build a new dashboard", "http", 0, &ClassifierConfig::default())
    }

    fn builder() -> ContextBuilder {
        let tools = Arc::new(ToolRegistry::new());
        ContextBuilder::new(
            tools,
            StaticBaseConfig {
                security_guardrail: "Never run destructive commands.".to_string(),
                behavioral_profile: "Be concise.".to_string(),
            },
        )
    }

    fn request(signal: &Signal) -> OverlayRequest<'_> {
        OverlayRequest {
            signal,
            runtime: RuntimeContext {
                timestamp: 0,
                channel: "http".to_string(),
                session_id: Some("sess-1".to_string()),
            },
            environment: EnvironmentContext {
                cwd: "/work".to_string(),
                date: "2026-07-28".to_string(),
                os: "linux".to_string(),
                provider: "mock".to_string(),
                model: "mock-1".to_string(),
            },
            plan_mode_directive: None,
            memory_candidates: &[],
            task_list: &[],
            workflow_state: None,
            communication_profile: None,
            memory_bulletin: None,
            addenda: &[],
            history_tokens: 0,
            max_tokens: 4096,
            response_reserve: 512,
        }
    }

    #[test]
    fn static_base_includes_guardrail_and_profile() {
        let builder = builder();
        assert!(builder.static_base().text().contains("destructive"));
        assert!(builder.static_base().text().contains("concise"));
    }

    #[test]
    fn p1_is_always_present() {
        let builder = builder();
        let signal = sample_signal();
        let built = builder.build(&request(&signal));
        assert!(built.dynamic_overlay.contains("Signal: mode="));
        assert!(built.dynamic_overlay.contains("session=sess-1"));
    }

    #[test]
    fn memory_ranked_by_keyword_overlap() {
        let builder = builder();
        let signal = sample_signal();
        let mut req = request(&signal);
        let candidates = vec![
            "unrelated note about lunch".to_string(),
            "dashboard build history and widget config".to_string(),
        ];
        req.memory_candidates = &candidates;
        let built = builder.build(&req);
        assert!(built.dynamic_overlay.contains("dashboard build history"));
    }

    #[test]
    fn truncates_oversized_block_at_word_boundary() {
        let long_text = "word ".repeat(5000);
        let estimator = HeuristicEstimator;
        let (text, tokens) = fit_block(&long_text, 10, &estimator);
        assert!(text.ends_with("[...truncated...]"));
        assert!(tokens <= 10);
    }

    #[test]
    fn fits_block_in_full_when_budget_allows() {
        let estimator = HeuristicEstimator;
        let (text, _) = fit_block("short text", 1000, &estimator);
        assert_eq!(text, "short text");
    }

    #[test]
    fn static_base_is_cacheable() {
        let builder = builder();
        assert!(builder.static_base().cacheable);
        let signal = sample_signal();
        let built = builder.build(&request(&signal));
        assert!(built.static_base_cacheable);
    }

    #[test]
    fn rebuild_static_base_picks_up_new_tools() {
        let mut builder = builder();
        let before = builder.static_base().tokens();
        // No tools registered yet; registering one should grow the base
        // once rebuilt. We can't register through a borrowed Arc here
        // without a concrete ToolDyn impl, so this just exercises the
        // rebuild path returning a stable result for an unchanged registry.
        builder.rebuild_static_base();
        assert_eq!(builder.static_base().tokens(), before);
    }

    #[test]
    fn as_single_string_concatenates_both_blocks() {
        let builder = builder();
        let signal = sample_signal();
        let built = builder.build(&request(&signal));
        let combined = built.as_single_string();
        assert!(combined.starts_with(&built.static_base));
        assert!(combined.contains(&built.dynamic_overlay));
    }
}

#![deny(missing_docs)]
//! Swarm Orchestrator, per spec §4.10.
//!
//! Generalizes `neuron-orch-kit`'s `OrchestratedRunner`/`EffectExecutor`/
//! `ExecutionTrace` depth-first effect loop: where the kit holds a single
//! follow-up queue drained one dispatch at a time, [`SwarmRunner`] holds
//! one `JoinHandle` per worker and a `watch::Sender<SwarmStatus>` per
//! swarm for terminal observation. The kit's `max_followups` safety bound
//! reappears here as the debate/review round cap.

mod pattern;
mod plan;

pub use pattern::{SwarmPattern, SwarmPatternParseError};
pub use plan::{Planner, PlanItem, ProviderPlanner, RuleBasedPlanner};

use layer0::id::SwarmId;
use layer0::DurationMs;
use neuron_events::{Event, EventBus};
use neuron_turn::provider::Provider;
use neuron_turn::types::{ContentPart, ProviderMessage, ProviderRequest, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;

/// Failure modes for swarm operations.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SwarmError {
    /// The requested pattern isn't one of parallel/pipeline/debate/review.
    #[error("invalid pattern")]
    InvalidPattern,
    /// `max_concurrent_swarms` is already saturated.
    #[error("too many concurrent swarms")]
    TooManySwarms,
    /// No swarm exists with this id.
    #[error("swarm not found")]
    NotFound,
    /// `cancel` was called on a swarm that is already in a terminal state.
    #[error("swarm not running")]
    NotRunning,
}

/// Terminal and in-flight states of a swarm, per spec §3/§4.10.
///
/// The single source of truth for a swarm's lifecycle: every terminal
/// transition is a compare-and-swap against this value (see
/// [`SwarmHandle::try_finish`]), which is what makes a late worker
/// completion after cancellation a no-op instead of a double transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmStatus {
    /// Workers are running.
    Running,
    /// All workers finished; the synthesis call is in flight.
    Synthesizing,
    /// Synthesis completed (or fell back to concatenation). Terminal.
    Completed,
    /// The planner or a provider hard-failed, or every worker failed. Terminal.
    Failed,
    /// `cancel` was called while the swarm was running. Terminal.
    Cancelled,
    /// The timeout deadline elapsed before completion. Terminal.
    Timeout,
}

impl SwarmStatus {
    /// Whether this status is one of the four terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SwarmStatus::Completed | SwarmStatus::Failed | SwarmStatus::Cancelled | SwarmStatus::Timeout
        )
    }
}

/// One worker's contribution to the swarm, keyed by its plan role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutput {
    /// The role this worker was assigned in the plan.
    pub role: String,
    /// The worker's text output. Empty and `success = false` on failure.
    pub text: String,
    /// Whether the worker completed without a hard provider error.
    pub success: bool,
}

/// A read-only snapshot of a swarm's current state, for `GET /swarm/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSnapshot {
    /// This swarm's id.
    pub swarm_id: SwarmId,
    /// The original task text passed to `launch`.
    pub task_text: String,
    /// The coordination pattern in use.
    pub pattern: SwarmPattern,
    /// The decomposed plan this swarm is executing.
    pub plan: Vec<PlanItem>,
    /// Current lifecycle status.
    pub status: SwarmStatus,
    /// Per-worker outputs gathered so far.
    pub worker_outputs: Vec<WorkerOutput>,
    /// The synthesized final result, once `status` is `Completed`.
    pub result: Option<String>,
    /// Epoch milliseconds the swarm was launched.
    pub started_at: DurationMs,
    /// Epoch milliseconds the swarm reached a terminal state, if it has.
    pub completed_at: Option<DurationMs>,
}

/// Synthesizes a final result from a swarm's worker outputs.
///
/// Generic over `P: Provider` rather than a trait object, matching
/// `ProviderPlanner`'s reasoning in `plan.rs`: synthesis runs once per
/// swarm, not on a hot path, but it shares the same provider instance as
/// planning and worker execution, so it's a plain function rather than a
/// second indirection layer.
async fn synthesize<P: Provider>(
    provider: &P,
    task: &str,
    pattern: SwarmPattern,
    outputs: &[WorkerOutput],
) -> String {
    let agent_outputs = outputs
        .iter()
        .map(|o| format!("### {} ({})\n{}", o.role, if o.success { "ok" } else { "failed" }, o.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!(
        "Synthesize a single final result for this task, using the pattern \"{pattern}\" \
         and the following per-worker outputs. Respond with prose only, no preamble.\n\n\
         Task: {task}\n\n{agent_outputs}"
    );

    let request = ProviderRequest {
        model: None,
        messages: vec![ProviderMessage {
            role: Role::User,
            content: vec![ContentPart::Text { text: prompt }],
        }],
        tools: vec![],
        max_tokens: Some(2048),
        temperature: None,
        system: Some("You are a synthesis agent combining the output of several workers.".to_string()),
        extra: serde_json::Value::Null,
    };

    match provider.complete(request).await {
        Ok(response) => response
            .content
            .iter()
            .find_map(|part| match part {
                ContentPart::Text { text } => Some(text.clone()),
                _ => None,
            })
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| fallback_concat(outputs)),
        Err(_) => fallback_concat(outputs),
    }
}

/// Concatenate per-agent outputs with separators — the synthesis
/// fallback per spec §4.10.
fn fallback_concat(outputs: &[WorkerOutput]) -> String {
    outputs
        .iter()
        .filter(|o| o.success)
        .map(|o| format!("[{}]\n{}", o.role, o.text))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

async fn run_worker<P: Provider>(provider: &P, role: &str, prompt: String) -> WorkerOutput {
    let request = ProviderRequest {
        model: None,
        messages: vec![ProviderMessage {
            role: Role::User,
            content: vec![ContentPart::Text { text: prompt }],
        }],
        tools: vec![],
        max_tokens: Some(2048),
        temperature: None,
        system: Some(format!("You are a worker agent playing the role \"{role}\" in a larger task.")),
        extra: serde_json::Value::Null,
    };

    match provider.complete(request).await {
        Ok(response) => {
            let text = response
                .content
                .iter()
                .find_map(|part| match part {
                    ContentPart::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            WorkerOutput { role: role.to_string(), text, success: true }
        }
        Err(e) => WorkerOutput { role: role.to_string(), text: e.to_string(), success: false },
    }
}

/// Number of rounds debate/review patterns run before giving up on
/// convergence/approval, reusing `neuron-orch-kit`'s `max_followups`
/// safety-bound idea at a much smaller scale.
const MAX_COORDINATION_ROUNDS: usize = 3;

async fn run_parallel<P: Provider>(provider: &P, plan: &[PlanItem]) -> Vec<WorkerOutput> {
    let futures = plan
        .iter()
        .map(|item| run_worker(provider, &item.role, item.subtask_text.clone()));
    futures_util::future::join_all(futures).await
}

async fn run_pipeline<P: Provider>(provider: &P, plan: &[PlanItem]) -> Vec<WorkerOutput> {
    let mut outputs = Vec::with_capacity(plan.len());
    let mut previous: Option<String> = None;
    for item in plan {
        let prompt = match &previous {
            Some(prev) => format!("{}\n\nPrevious worker's output:\n{}", item.subtask_text, prev),
            None => item.subtask_text.clone(),
        };
        let output = run_worker(provider, &item.role, prompt).await;
        previous = Some(output.text.clone());
        outputs.push(output);
    }
    outputs
}

async fn run_debate<P: Provider>(provider: &P, plan: &[PlanItem]) -> Vec<WorkerOutput> {
    let mut round_outputs: Vec<WorkerOutput> = plan
        .iter()
        .map(|item| WorkerOutput { role: item.role.clone(), text: item.subtask_text.clone(), success: true })
        .collect();

    for _round in 0..MAX_COORDINATION_ROUNDS {
        let mut next_round = Vec::with_capacity(plan.len());
        for (i, item) in plan.iter().enumerate() {
            let others = round_outputs
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, o)| format!("{}: {}", o.role, o.text))
                .collect::<Vec<_>>()
                .join("\n");
            let prompt = format!(
                "Debate topic: {}\n\nOther participants' previous positions:\n{}\n\nState your position, \
                 taking the others into account.",
                item.subtask_text, others
            );
            next_round.push(run_worker(provider, &item.role, prompt).await);
        }

        let converged = next_round
            .iter()
            .zip(round_outputs.iter())
            .all(|(next, prev)| next.text == prev.text);
        round_outputs = next_round;
        if converged {
            break;
        }
    }
    round_outputs
}

async fn run_review<P: Provider>(provider: &P, plan: &[PlanItem]) -> Vec<WorkerOutput> {
    let Some((author, reviewers)) = plan.split_first() else {
        return vec![];
    };

    let mut draft = run_worker(provider, &author.role, author.subtask_text.clone()).await;

    for _round in 0..MAX_COORDINATION_ROUNDS {
        let mut critiques = Vec::with_capacity(reviewers.len());
        for reviewer in reviewers {
            let prompt = format!(
                "Critique this draft for the task \"{}\". If it is acceptable as-is, say APPROVED. \
                 Otherwise explain what to change.\n\nDraft:\n{}",
                reviewer.subtask_text, draft.text
            );
            critiques.push(run_worker(provider, &reviewer.role, prompt).await);
        }

        let approved = !critiques.is_empty()
            && critiques.iter().all(|c| c.text.to_uppercase().contains("APPROVED"));

        let mut outputs = vec![draft.clone()];
        outputs.extend(critiques.iter().cloned());
        if approved {
            return outputs;
        }

        let feedback = critiques
            .iter()
            .map(|c| format!("{}: {}", c.role, c.text))
            .collect::<Vec<_>>()
            .join("\n");
        let revise_prompt = format!(
            "Revise your draft for \"{}\" given this reviewer feedback:\n{}\n\nPrevious draft:\n{}",
            author.subtask_text, feedback, draft.text
        );
        draft = run_worker(provider, &author.role, revise_prompt).await;

        if _round == MAX_COORDINATION_ROUNDS - 1 {
            return outputs;
        }
    }
    vec![draft]
}

/// A swarm's live state: its status (single source of truth), collected
/// worker outputs, and a cancellation token every worker task observes.
struct SwarmHandle {
    task_text: String,
    pattern: SwarmPattern,
    plan: Vec<PlanItem>,
    status_tx: watch::Sender<SwarmStatus>,
    status_rx: watch::Receiver<SwarmStatus>,
    worker_outputs: Mutex<Vec<WorkerOutput>>,
    result: Mutex<Option<String>>,
    cancel: CancellationToken,
    started_at: DurationMs,
    completed_at: Mutex<Option<DurationMs>>,
}

impl SwarmHandle {
    /// Attempt the one-and-only terminal transition for this swarm.
    /// Returns `true` if this call performed the transition (and is
    /// therefore responsible for publishing the terminal event); `false`
    /// if the swarm was already terminal, per spec §4.10's idempotency
    /// requirement — a late `swarm_complete` after a cancel must not
    /// double-decrement anything.
    fn try_finish(&self, new_status: SwarmStatus, now: DurationMs) -> bool {
        debug_assert!(new_status.is_terminal());
        let changed = self
            .status_tx
            .send_if_modified(|status| {
                if status.is_terminal() {
                    false
                } else {
                    *status = new_status;
                    true
                }
            });
        if changed {
            *self.completed_at.lock().expect("swarm handle mutex poisoned") = Some(now);
        }
        changed
    }

    fn status(&self) -> SwarmStatus {
        *self.status_rx.borrow()
    }
}

/// Tunable limits for the swarm orchestrator, per spec §4.10/§6.
#[derive(Debug, Clone)]
pub struct SwarmLimits {
    /// Maximum number of swarms running at once, process-wide.
    pub max_concurrent_swarms: usize,
    /// Maximum plan items (workers) per swarm.
    pub max_agents_per_swarm: usize,
    /// Default per-swarm deadline if `launch` isn't given one.
    pub default_timeout: Duration,
}

impl Default for SwarmLimits {
    fn default() -> Self {
        Self {
            max_concurrent_swarms: 10,
            max_agents_per_swarm: 10,
            default_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// The Swarm Orchestrator: launches, tracks, and cancels bounded
/// multi-worker coordination runs, per spec §4.10.
pub struct SwarmRunner<P: Provider> {
    provider: Arc<P>,
    planner: Arc<dyn Planner>,
    events: Arc<EventBus>,
    limits: SwarmLimits,
    concurrency: Arc<Semaphore>,
    swarms: Mutex<HashMap<SwarmId, Arc<SwarmHandle>>>,
    next_id: AtomicU64,
}

impl<P: Provider + Send + Sync + 'static> SwarmRunner<P> {
    /// Build a runner. `provider` is shared by planning, every worker,
    /// and synthesis; `planner` decomposes each launched task.
    pub fn new(provider: Arc<P>, planner: Arc<dyn Planner>, events: Arc<EventBus>, limits: SwarmLimits) -> Self {
        let concurrency = Arc::new(Semaphore::new(limits.max_concurrent_swarms));
        Self {
            provider,
            planner,
            events,
            limits,
            concurrency,
            swarms: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn now_ms(&self) -> DurationMs {
        DurationMs::from_millis(
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0),
        )
    }

    fn publish(&self, event_type: &str, swarm_id: &SwarmId, payload: serde_json::Value) {
        self.events.publish(Event::new(event_type, payload, self.now_ms()));
        let _ = swarm_id; // swarm_id is embedded in `payload`; events have no swarm-scoped topic per spec §4.8
    }

    /// Launch a swarm. Validates the pattern, decomposes the task (with
    /// a single-agent fallback on planner failure), clamps the plan to
    /// `max_agents_per_swarm`, and spawns the coordination + synthesis
    /// task in the background. Returns immediately with the new swarm's
    /// id; callers poll `status` or subscribe to the firehose for the
    /// terminal event.
    pub async fn launch(
        self: Arc<Self>,
        task: impl Into<String>,
        pattern: &str,
        max_agents: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<SwarmId, SwarmError> {
        let task = task.into();
        let pattern: SwarmPattern = pattern.parse().map_err(|_| SwarmError::InvalidPattern)?;
        let max_agents = max_agents.unwrap_or(self.limits.max_agents_per_swarm).min(self.limits.max_agents_per_swarm);
        let timeout = timeout.unwrap_or(self.limits.default_timeout);

        let permit = Arc::clone(&self.concurrency)
            .try_acquire_owned()
            .map_err(|_| SwarmError::TooManySwarms)?;

        let mut plan = match self.planner.plan(&task, max_agents).await {
            Ok(plan) if !plan.is_empty() => plan,
            _ => vec![PlanItem { role: "generalist".to_string(), subtask_text: task.clone() }],
        };
        plan.truncate(max_agents.max(1));

        let swarm_id = SwarmId::new(format!("swarm_{}", self.next_id.fetch_add(1, Ordering::Relaxed)));
        let (status_tx, status_rx) = watch::channel(SwarmStatus::Running);
        let handle = Arc::new(SwarmHandle {
            task_text: task.clone(),
            pattern,
            plan: plan.clone(),
            status_tx,
            status_rx,
            worker_outputs: Mutex::new(Vec::new()),
            result: Mutex::new(None),
            cancel: CancellationToken::new(),
            started_at: self.now_ms(),
            completed_at: Mutex::new(None),
        });

        self.swarms.lock().expect("swarm map mutex poisoned").insert(swarm_id.clone(), Arc::clone(&handle));

        self.publish(
            "swarm_started",
            &swarm_id,
            serde_json::json!({"swarm_id": swarm_id.as_str(), "pattern": pattern, "plan_size": plan.len()}),
        );

        let runner = Arc::clone(&self);
        let swarm_id_for_task = swarm_id.clone();
        tokio::spawn(async move {
            runner.drive(swarm_id_for_task, handle, timeout, permit).await;
        });

        Ok(swarm_id)
    }

    async fn drive(
        self: Arc<Self>,
        swarm_id: SwarmId,
        handle: Arc<SwarmHandle>,
        timeout: Duration,
        _permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        // One deadline for the whole run (workers + synthesis), per spec
        // §4.10's "schedule a timeout timer" at launch time.
        let deadline = tokio::time::Instant::now() + timeout;

        let run = async {
            match handle.pattern {
                SwarmPattern::Parallel => run_parallel(self.provider.as_ref(), &handle.plan).await,
                SwarmPattern::Pipeline => run_pipeline(self.provider.as_ref(), &handle.plan).await,
                SwarmPattern::Debate => run_debate(self.provider.as_ref(), &handle.plan).await,
                SwarmPattern::Review => run_review(self.provider.as_ref(), &handle.plan).await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => None,
            _ = tokio::time::sleep_until(deadline) => None,
            outputs = run => Some(outputs),
        };

        let Some(outputs) = outcome else {
            // Either cancelled or timed out; tell the two apart via whether
            // the cancellation token (set only by `cancel`) fired.
            let status = if handle.cancel.is_cancelled() { SwarmStatus::Cancelled } else { SwarmStatus::Timeout };
            if handle.try_finish(status, self.now_ms()) {
                let event_type = match status {
                    SwarmStatus::Cancelled => "swarm_cancelled",
                    SwarmStatus::Timeout => "swarm_timeout",
                    _ => unreachable!(),
                };
                self.publish(event_type, &swarm_id, serde_json::json!({"swarm_id": swarm_id.as_str()}));
            }
            return;
        };

        *handle.worker_outputs.lock().expect("swarm handle mutex poisoned") = outputs.clone();

        if handle.cancel.is_cancelled() {
            // A cancel raced in between the workers finishing and us
            // observing it; the transition below is a no-op if so.
            if handle.try_finish(SwarmStatus::Cancelled, self.now_ms()) {
                self.publish("swarm_cancelled", &swarm_id, serde_json::json!({"swarm_id": swarm_id.as_str()}));
            }
            return;
        }

        if outputs.iter().all(|o| !o.success) {
            if handle.try_finish(SwarmStatus::Failed, self.now_ms()) {
                self.publish(
                    "swarm_failed",
                    &swarm_id,
                    serde_json::json!({"swarm_id": swarm_id.as_str(), "reason": "all workers failed"}),
                );
            }
            return;
        }

        let _ = handle.status_tx.send_if_modified(|status| {
            if *status == SwarmStatus::Running {
                *status = SwarmStatus::Synthesizing;
                true
            } else {
                false
            }
        });

        let synthesized = tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => None,
            _ = tokio::time::sleep_until(deadline) => None,
            result = synthesize(self.provider.as_ref(), &handle.task_text, handle.pattern, &outputs) => Some(result),
        };

        let Some(result) = synthesized else {
            let status = if handle.cancel.is_cancelled() { SwarmStatus::Cancelled } else { SwarmStatus::Timeout };
            if handle.try_finish(status, self.now_ms()) {
                let event_type = match status {
                    SwarmStatus::Cancelled => "swarm_cancelled",
                    SwarmStatus::Timeout => "swarm_timeout",
                    _ => unreachable!(),
                };
                self.publish(event_type, &swarm_id, serde_json::json!({"swarm_id": swarm_id.as_str()}));
            }
            return;
        };

        *handle.result.lock().expect("swarm handle mutex poisoned") = Some(result);
        if handle.try_finish(SwarmStatus::Completed, self.now_ms()) {
            self.publish("swarm_completed", &swarm_id, serde_json::json!({"swarm_id": swarm_id.as_str()}));
        }
    }

    /// A snapshot of the swarm's current state, for `GET /swarm/{id}`.
    pub fn status(&self, swarm_id: &SwarmId) -> Result<SwarmSnapshot, SwarmError> {
        let handle = {
            let swarms = self.swarms.lock().expect("swarm map mutex poisoned");
            Arc::clone(swarms.get(swarm_id).ok_or(SwarmError::NotFound)?)
        };
        Ok(SwarmSnapshot {
            swarm_id: swarm_id.clone(),
            task_text: handle.task_text.clone(),
            pattern: handle.pattern,
            plan: handle.plan.clone(),
            status: handle.status(),
            worker_outputs: handle.worker_outputs.lock().expect("swarm handle mutex poisoned").clone(),
            result: handle.result.lock().expect("swarm handle mutex poisoned").clone(),
            started_at: handle.started_at,
            completed_at: *handle.completed_at.lock().expect("swarm handle mutex poisoned"),
        })
    }

    /// Cancel a running swarm. A no-op, returning [`SwarmError::NotRunning`],
    /// if the swarm is already in a terminal state — the idempotency
    /// guarantee of spec §4.10.
    pub fn cancel(&self, swarm_id: &SwarmId) -> Result<(), SwarmError> {
        let handle = {
            let swarms = self.swarms.lock().expect("swarm map mutex poisoned");
            Arc::clone(swarms.get(swarm_id).ok_or(SwarmError::NotFound)?)
        };
        if handle.status().is_terminal() {
            return Err(SwarmError::NotRunning);
        }
        handle.cancel.cancel();
        Ok(())
    }

    /// Number of swarms currently tracked (running or terminal but not
    /// yet pruned). Exposed for tests and introspection.
    pub fn tracked_count(&self) -> usize {
        self.swarms.lock().expect("swarm map mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuron_provider_mock::{end_turn_response, MockProvider, Step};

    fn runner(provider: MockProvider, limits: SwarmLimits) -> Arc<SwarmRunner<MockProvider>> {
        Arc::new(SwarmRunner::new(
            Arc::new(provider),
            Arc::new(RuleBasedPlanner),
            Arc::new(EventBus::new()),
            limits,
        ))
    }

    #[tokio::test]
    async fn invalid_pattern_is_rejected_before_any_provider_call() {
        let runner = runner(MockProvider::new(vec![Step::Respond(end_turn_response("x".into()))]), SwarmLimits::default());
        let result = Arc::clone(&runner).launch("do a thing", "not_a_pattern", None, None).await;
        assert_eq!(result.unwrap_err(), SwarmError::InvalidPattern);
    }

    #[tokio::test]
    async fn parallel_swarm_completes_and_emits_exactly_one_terminal_event() {
        let provider = MockProvider::new(vec![Step::Respond(end_turn_response("worker or synthesis output".into()))]);
        let runner = runner(provider, SwarmLimits::default());

        let mut firehose = runner.events.subscribe_firehose();
        let id = Arc::clone(&runner)
            .launch("Plan a launch. Write docs. Notify the team.", "parallel", Some(3), None)
            .await
            .unwrap();

        let mut status = runner.status(&id).unwrap().status;
        for _ in 0..200 {
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            status = runner.status(&id).unwrap().status;
        }
        assert_eq!(status, SwarmStatus::Completed);

        let mut terminal_events = 0;
        loop {
            match firehose.try_recv() {
                Ok(event) if event.event_type == "swarm_completed" => terminal_events += 1,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        assert_eq!(terminal_events, 1);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_on_a_terminal_swarm() {
        let provider = MockProvider::new(vec![Step::Respond(end_turn_response("done".into()))]);
        let runner = runner(provider, SwarmLimits::default());
        let id = Arc::clone(&runner).launch("write a haiku", "parallel", Some(1), None).await.unwrap();

        for _ in 0..200 {
            if runner.status(&id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(runner.cancel(&id).unwrap_err(), SwarmError::NotRunning);
    }

    #[tokio::test]
    async fn cancel_race_terminates_exactly_once() {
        let provider = MockProvider::new(vec![Step::Respond(end_turn_response("slow worker".into()))]);
        let runner = runner(provider, SwarmLimits::default());

        let mut firehose = runner.events.subscribe_firehose();
        let id = Arc::clone(&runner).launch("a. b. c.", "parallel", Some(3), None).await.unwrap();
        runner.cancel(&id).unwrap();

        for _ in 0..200 {
            if runner.status(&id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(runner.status(&id).unwrap().status, SwarmStatus::Cancelled);
        assert_eq!(runner.cancel(&id).unwrap_err(), SwarmError::NotRunning);

        let mut cancelled_events = 0;
        loop {
            match firehose.try_recv() {
                Ok(event) if event.event_type == "swarm_cancelled" => cancelled_events += 1,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        assert_eq!(cancelled_events, 1);
    }

    #[tokio::test]
    async fn too_many_concurrent_swarms_is_rejected() {
        let provider = MockProvider::new(vec![Step::Respond(end_turn_response("x".into()))]);
        let limits = SwarmLimits { max_concurrent_swarms: 1, ..SwarmLimits::default() };
        let runner = runner(provider, limits);

        let _first = Arc::clone(&runner).launch("task one", "parallel", Some(1), None).await.unwrap();
        let second = Arc::clone(&runner).launch("task two", "parallel", Some(1), None).await;
        assert_eq!(second.unwrap_err(), SwarmError::TooManySwarms);
    }

    #[tokio::test]
    async fn review_pattern_stops_on_approval() {
        let provider = MockProvider::new(vec![
            Step::Respond(end_turn_response("first draft".into())), // author draft
            Step::Respond(end_turn_response("APPROVED".into())),    // reviewer
        ]);
        let runner = runner(provider, SwarmLimits::default());
        let id = Arc::clone(&runner).launch("draft a plan. critique the plan.", "review", Some(2), None).await.unwrap();

        for _ in 0..200 {
            if runner.status(&id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let snapshot = runner.status(&id).unwrap();
        assert_eq!(snapshot.status, SwarmStatus::Completed);
        assert_eq!(snapshot.worker_outputs.len(), 2);
    }
}

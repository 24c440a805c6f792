#![deny(missing_docs)]
//! Budget and safety gate for the agent runtime, per spec §4.9.
//!
//! [`BudgetLedger`] tracks spend against daily, monthly, and per-call
//! limits behind a `tokio::sync::Mutex` — a single writer, following the
//! source corpus's shared-resource model for budget state. [`BudgetGateHook`]
//! wraps a ledger as a [`Hook`] so it composes into the same `pre_tool_use`
//! pipeline as the redaction and exfiltration guards, rather than living
//! as a separate code path.
//!
//! No teacher crate enforces spend caps directly — `layer0::lifecycle`
//! only *observes* budget via [`BudgetEvent`](layer0::lifecycle::BudgetEvent).
//! This crate is the gate that produces those events.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use layer0::error::HookError;
use layer0::hook::{Hook, HookAction, HookContext, HookPoint};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One charge recorded in the spend ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// When the charge was recorded, epoch milliseconds.
    pub timestamp: layer0::DurationMs,
    /// The provider the charge was incurred against.
    pub provider: String,
    /// The model used.
    pub model: String,
    /// Input tokens consumed.
    pub tokens_in: u64,
    /// Output tokens produced.
    pub tokens_out: u64,
    /// Estimated cost of the call, in USD.
    pub estimated_cost: Decimal,
}

/// The configured spend caps, per spec §3's Budget state.
#[derive(Debug, Clone)]
pub struct BudgetLimits {
    /// Max spend allowed per day (UTC), resets at midnight UTC.
    pub daily_limit: Decimal,
    /// Max spend allowed per calendar month (UTC).
    pub monthly_limit: Decimal,
    /// Max estimated cost for a single call.
    pub per_call_limit: Decimal,
    /// Ledger entries older than this many most-recent entries are pruned.
    pub ledger_capacity: usize,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            daily_limit: Decimal::new(10_00, 2),
            monthly_limit: Decimal::new(200_00, 2),
            per_call_limit: Decimal::new(1_00, 2),
            ledger_capacity: 10_000,
        }
    }
}

/// Why a charge or call was denied.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BudgetError {
    /// The call's estimated cost alone exceeds `per_call_limit`.
    #[error("estimated cost exceeds per-call limit")]
    PerCallExceeded,
    /// The call would push `daily_spent` over `daily_limit`.
    #[error("charge would exceed daily budget")]
    DailyExceeded,
    /// The call would push `monthly_spent` over `monthly_limit`.
    #[error("charge would exceed monthly budget")]
    MonthlyExceeded,
}

/// Utilisation thresholds at which [`BudgetLedger::check`] additionally
/// reports a warning alongside an otherwise-successful check.
const WARNING_UTILISATION: Decimal = Decimal::from_parts(80, 0, 0, false, 2);

/// A non-fatal signal that spend has crossed the warning utilisation
/// (≥ 80%) without yet breaching a hard limit, per spec §4.9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetWarning {
    /// Which limit is approaching exhaustion.
    pub limit_kind: LimitKind,
}

/// Which spend limit a warning or denial refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// The daily spend cap.
    Daily,
    /// The monthly spend cap.
    Monthly,
}

struct LedgerState {
    daily_spent: Decimal,
    monthly_spent: Decimal,
    day: chrono::NaiveDate,
    month: (i32, u32),
    entries: VecDeque<LedgerEntry>,
}

impl LedgerState {
    fn new(now: chrono::DateTime<Utc>) -> Self {
        let day = now.date_naive();
        Self {
            daily_spent: Decimal::ZERO,
            monthly_spent: Decimal::ZERO,
            day,
            month: (day.year(), day.month()),
            entries: VecDeque::new(),
        }
    }

    /// Roll `daily_spent`/`monthly_spent` over calendar boundaries (UTC),
    /// per spec §4.9.
    fn roll_if_needed(&mut self, now: chrono::DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.day {
            self.daily_spent = Decimal::ZERO;
            self.day = today;
        }
        let month = (today.year(), today.month());
        if month != self.month {
            self.monthly_spent = Decimal::ZERO;
            self.month = month;
        }
    }
}

/// Shared, mutex-guarded spend ledger enforcing per-call, daily, and
/// monthly caps. Clone is cheap — it's an `Arc` handle.
#[derive(Clone)]
pub struct BudgetLedger {
    limits: BudgetLimits,
    state: Arc<Mutex<LedgerState>>,
}

impl BudgetLedger {
    /// Create a ledger with the given limits, with daily/monthly spend
    /// starting at zero.
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            state: Arc::new(Mutex::new(LedgerState::new(Utc::now()))),
        }
    }

    /// Check whether a call estimated to cost `estimated_cost` may
    /// proceed, without recording it. Rolls calendar boundaries first.
    /// Returns `Ok(Some(warning))` when the call would push utilisation
    /// past 80% without breaching a hard cap.
    pub async fn check(&self, estimated_cost: Decimal) -> Result<Option<BudgetWarning>, BudgetError> {
        if estimated_cost > self.limits.per_call_limit {
            return Err(BudgetError::PerCallExceeded);
        }

        let mut state = self.state.lock().await;
        state.roll_if_needed(Utc::now());

        let projected_daily = state.daily_spent + estimated_cost;
        if projected_daily > self.limits.daily_limit {
            return Err(BudgetError::DailyExceeded);
        }
        let projected_monthly = state.monthly_spent + estimated_cost;
        if projected_monthly > self.limits.monthly_limit {
            return Err(BudgetError::MonthlyExceeded);
        }

        if utilisation(projected_daily, self.limits.daily_limit) >= WARNING_UTILISATION {
            return Ok(Some(BudgetWarning {
                limit_kind: LimitKind::Daily,
            }));
        }
        if utilisation(projected_monthly, self.limits.monthly_limit) >= WARNING_UTILISATION {
            return Ok(Some(BudgetWarning {
                limit_kind: LimitKind::Monthly,
            }));
        }

        Ok(None)
    }

    /// Record a completed charge, appending it to the ledger and
    /// incrementing the daily/monthly counters. Pruned to
    /// `limits.ledger_capacity` entries, oldest first.
    pub async fn record(&self, entry: LedgerEntry) {
        let mut state = self.state.lock().await;
        state.roll_if_needed(Utc::now());
        state.daily_spent += entry.estimated_cost;
        state.monthly_spent += entry.estimated_cost;
        state.entries.push_back(entry);
        while state.entries.len() > self.limits.ledger_capacity {
            state.entries.pop_front();
        }
    }

    /// Current daily and monthly spend, after rolling calendar
    /// boundaries forward if needed.
    pub async fn spent(&self) -> (Decimal, Decimal) {
        let mut state = self.state.lock().await;
        state.roll_if_needed(Utc::now());
        (state.daily_spent, state.monthly_spent)
    }

    /// A snapshot of the ledger's recorded entries, oldest first.
    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.entries.iter().cloned().collect()
    }
}

fn utilisation(spent: Decimal, limit: Decimal) -> Decimal {
    if limit.is_zero() {
        return Decimal::ZERO;
    }
    spent / limit
}

/// The Budget Gate as a [`Hook`]: fires at `pre_tool_use` for any
/// tool call tagged as model-costing (see [`BudgetGateHook::with_tool_names`]),
/// skipping the call with `SkipTool{"budget_exceeded"}` when the ledger
/// denies it.
///
/// This only covers the `pre_tool_use` boundary; provider calls
/// themselves have no hook point in this runtime's lifecycle (there is
/// no `pre_inference`), so the agent loop calls
/// [`BudgetLedger::check`]/[`BudgetLedger::record`] directly around each
/// provider invocation in addition to installing this hook.
pub struct BudgetGateHook {
    ledger: BudgetLedger,
    tool_names: Option<Vec<String>>,
    estimate_per_call: Decimal,
}

impl BudgetGateHook {
    /// Gate every tool call, estimating `estimate_per_call` cost for each.
    pub fn new(ledger: BudgetLedger, estimate_per_call: Decimal) -> Self {
        Self {
            ledger,
            tool_names: None,
            estimate_per_call,
        }
    }

    /// Restrict this gate to only the named tools (the rest pass through
    /// unchecked).
    pub fn with_tool_names(mut self, names: Vec<String>) -> Self {
        self.tool_names = Some(names);
        self
    }

    fn applies_to(&self, tool_name: &str) -> bool {
        match &self.tool_names {
            Some(names) => names.iter().any(|n| n == tool_name),
            None => true,
        }
    }
}

#[async_trait]
impl Hook for BudgetGateHook {
    fn points(&self) -> &[HookPoint] {
        &[HookPoint::PreToolUse]
    }

    async fn on_event(&self, ctx: &HookContext) -> Result<HookAction, HookError> {
        let Some(ref tool_name) = ctx.tool_name else {
            return Ok(HookAction::Continue);
        };
        if !self.applies_to(tool_name) {
            return Ok(HookAction::Continue);
        }

        match self.ledger.check(self.estimate_per_call).await {
            Ok(_) => Ok(HookAction::Continue),
            Err(_) => Ok(HookAction::SkipTool {
                reason: "budget_exceeded".to_string(),
            }),
        }
    }
}

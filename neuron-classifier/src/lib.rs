#![deny(missing_docs)]
//! Signal classifier and noise filter — the entry gate in front of the
//! Session Registry.
//!
//! [`classify`] maps a raw inbound message to a [`Signal`]: a five-axis
//! label (`mode`, `genre`, `kind`, `format`, `weight`) plus the original
//! text, channel, and timestamp. It is a pure function — same inputs and
//! [`ClassifierConfig`] always produce the same [`Signal`] — so it carries
//! no `async-trait`/state of its own. [`NoiseFilter`] sits directly in
//! front of the agent loop: inputs whose weight falls below the
//! configured threshold are rejected before any provider or tool call,
//! with an optional secondary rescore tier for weights in the
//! uncertainty band around the threshold.

mod rescore;
mod rules;
mod weight;

pub use rescore::{NoOpRescorer, Rescorer};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What should be done, per spec §3: the first matching rule among
/// `BUILD`, `EXECUTE`, `ANALYZE`, `MAINTAIN` wins; `ASSIST` is the
/// fallback when nothing else matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Imperative construction: build, create, generate, scaffold, new.
    Build,
    /// Imperative action: run, execute, send, trigger, sync, import, export.
    Execute,
    /// Inspection/reporting: analyze, report, dashboard, metrics, trend, kpi.
    Analyze,
    /// Upkeep: fix, update, migrate, backup, restore, upgrade, rollback.
    Maintain,
    /// Fallback when no other mode rule matches.
    Assist,
}

/// The speech-act intent of the message, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    /// Imperative markers, a trailing `!`, or explicit command verbs.
    Direct,
    /// Whole-phrase commitment markers ("I will", "let me", "I promise").
    Commit,
    /// Decision markers: approve, reject, cancel, confirm, decide, set.
    Decide,
    /// Affective markers: thanks, love, hate, great, terrible, wow.
    Express,
    /// Fallback when no other genre rule matches.
    Inform,
}

/// The container form the message arrived in, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// A conversational message (the default).
    Message,
    /// A document-shaped payload.
    Document,
    /// A push notification / webhook delivery.
    Notification,
    /// A CLI or slash-command invocation.
    Command,
    /// A transcript of a prior conversation or recording.
    Transcript,
}

/// An immutable, pure classification of one inbound message, per spec §3.
///
/// `classify` never mutates anything and never consults wall-clock time
/// itself — callers supply `timestamp_ms` so that the same
/// `(raw_text, channel)` pair under the same [`ClassifierConfig`] always
/// yields byte-for-byte the same `Signal`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// What should be done.
    pub mode: Mode,
    /// The speech-act intent.
    pub genre: Genre,
    /// A free-form short tag (`question`, `issue`, `scheduling`, `summary`,
    /// `general`). Named `kind` in Rust to avoid the `type` keyword; the
    /// wire form uses `type` per spec §3.
    #[serde(rename = "type")]
    pub kind: String,
    /// The container form the message arrived in.
    pub format: Format,
    /// Informational density in `[0.0, 1.0]`.
    pub weight: f64,
    /// The original, unmodified message text.
    pub raw_text: String,
    /// The channel tag the message arrived on (`cli`, `http`, a webhook name, ...).
    pub channel: String,
    /// When the message was classified, in epoch milliseconds.
    pub timestamp: u64,
}

/// Tunables for [`classify`] and [`NoiseFilter`], per spec §6's
/// configuration surface (`noise_threshold`) plus the §4.2 escalation
/// tier's latency cap.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Below this weight, [`NoiseFilter::filter`] rejects the input.
    /// Default 0.3, per spec §3.
    pub noise_threshold: f64,
    /// Half-width of the uncertainty band around `noise_threshold` within
    /// which the optional rescore tier is consulted. Default 0.05.
    pub uncertainty_band: f64,
    /// Latency cap for the rescore tier. Per spec §4.2, capped at 300ms;
    /// on timeout the deterministic weight is used as-is.
    pub rescore_timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 0.3,
            uncertainty_band: 0.05,
            rescore_timeout: Duration::from_millis(300),
        }
    }
}

/// Classify a raw message into a [`Signal`].
///
/// Pure and side-effect-free per spec §4.1's invariant: the same
/// `(text, channel)` pair under the same config always yields the same
/// `Signal`. Runs in well under the spec's 1ms deterministic-path budget
/// — every rule is a linear scan over a lowercased copy of `text`.
pub fn classify(text: &str, channel: &str, timestamp_ms: u64, config: &ClassifierConfig) -> Signal {
    if text.is_empty() {
        return Signal {
            mode: Mode::Assist,
            genre: Genre::Inform,
            kind: "general".to_string(),
            format: rules::format_for_channel(channel),
            weight: 0.2,
            raw_text: text.to_string(),
            channel: channel.to_string(),
            timestamp: timestamp_ms,
        };
    }

    let lower = text.to_lowercase();
    let mode = rules::classify_mode(&lower);
    let genre = rules::classify_genre(&lower);
    let kind = rules::classify_type(&lower);
    let format = rules::format_for_channel(channel);
    let weight = weight::compute_weight(&lower, text.chars().count());

    Signal {
        mode,
        genre,
        kind,
        format,
        weight,
        raw_text: text.to_string(),
        channel: channel.to_string(),
        timestamp: timestamp_ms,
    }
}

/// Outcome of running a [`Signal`] through [`NoiseFilter::filter`].
#[derive(Debug, Clone)]
pub enum FilterDecision {
    /// The signal's weight is at or above the threshold; processing continues.
    Pass(Signal),
    /// The signal's weight is below the threshold; per spec §4.2 this
    /// short-circuits before any provider or tool call.
    Filtered(Signal),
}

impl FilterDecision {
    /// Whether the message passed the filter.
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterDecision::Pass(_))
    }

    /// The wrapped signal, regardless of the decision.
    pub fn signal(&self) -> &Signal {
        match self {
            FilterDecision::Pass(s) | FilterDecision::Filtered(s) => s,
        }
    }
}

/// Stateless guard in front of the Session Registry, per spec §4.2.
///
/// Holds only a [`ClassifierConfig`] and an optional [`Rescorer`] for the
/// escalation tier. Carries no session or message state of its own.
pub struct NoiseFilter<R: Rescorer = NoOpRescorer> {
    config: ClassifierConfig,
    rescorer: R,
}

impl NoiseFilter<NoOpRescorer> {
    /// Create a filter with the deterministic weight only — the optional
    /// escalation tier (spec §4.2) is omitted.
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            rescorer: NoOpRescorer,
        }
    }
}

impl<R: Rescorer> NoiseFilter<R> {
    /// Create a filter with a rescorer for the escalation tier: weights
    /// landing in `[threshold - band, threshold + band]` are re-scored,
    /// capped at `config.rescore_timeout`, falling back to the
    /// deterministic weight on timeout or rescorer error.
    pub fn with_rescorer(config: ClassifierConfig, rescorer: R) -> Self {
        Self { config, rescorer }
    }

    /// Decide whether `signal` should proceed past the noise gate,
    /// possibly escalating to the rescore tier first.
    pub async fn filter(&self, mut signal: Signal) -> FilterDecision {
        let lower = self.config.noise_threshold - self.config.uncertainty_band;
        let upper = self.config.noise_threshold + self.config.uncertainty_band;

        if signal.weight >= lower && signal.weight <= upper {
            let rescored = tokio::time::timeout(
                self.config.rescore_timeout,
                self.rescorer.rescore(&signal.raw_text, signal.weight),
            )
            .await;
            if let Ok(Some(new_weight)) = rescored {
                signal.weight = new_weight.clamp(0.0, 1.0);
            }
            // Timeout or Ok(None): keep the deterministic weight.
        }

        if signal.weight < self.config.noise_threshold {
            FilterDecision::Filtered(signal)
        } else {
            FilterDecision::Pass(signal)
        }
    }

    /// Synchronous decision using only the deterministic weight, skipping
    /// the rescore tier entirely. Used by callers (e.g. the `/classify`
    /// HTTP endpoint) that want the Signal without the escalation latency.
    pub fn filter_deterministic(&self, signal: Signal) -> FilterDecision {
        if signal.weight < self.config.noise_threshold {
            FilterDecision::Filtered(signal)
        } else {
            FilterDecision::Pass(signal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ClassifierConfig {
        ClassifierConfig::default()
    }

    #[test]
    fn empty_input_is_assist_inform_general() {
        let s = classify("", "cli", 0, &cfg());
        assert_eq!(s.mode, Mode::Assist);
        assert_eq!(s.genre, Genre::Inform);
        assert_eq!(s.kind, "general");
        assert_eq!(s.weight, 0.2);
    }

    #[test]
    fn noise_is_filtered() {
        let s = classify("ok", "cli", 0, &cfg());
        assert!(s.weight < 0.3, "weight was {}", s.weight);
    }

    #[test]
    fn build_mode_detected() {
        let s = classify("please create a new dashboard widget", "http", 0, &cfg());
        assert_eq!(s.mode, Mode::Build);
    }

    #[test]
    fn short_token_whole_word_boundary() {
        // "new" inside "document" must not trigger BUILD via substring match.
        let s = classify("please summarize this document", "http", 0, &cfg());
        assert_ne!(s.mode, Mode::Build);
    }

    #[test]
    fn classification_is_pure() {
        let a = classify("Run the deploy script now!", "cli", 42, &cfg());
        let b = classify("Run the deploy script now!", "cli", 42, &cfg());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn filter_rejects_below_threshold() {
        let filter = NoiseFilter::new(cfg());
        let signal = classify("ok", "cli", 0, &cfg());
        let decision = filter.filter(signal).await;
        assert!(!decision.is_pass());
    }

    #[tokio::test]
    async fn filter_passes_above_threshold() {
        let filter = NoiseFilter::new(cfg());
        let signal = classify(
            "Urgent: the production deploy is broken, please fix it now!",
            "http",
            0,
            &cfg(),
        );
        let decision = filter.filter(signal).await;
        assert!(decision.is_pass());
    }

    #[test]
    fn question_type_detected() {
        let s = classify("What files are in the current directory?", "http", 0, &cfg());
        assert_eq!(s.kind, "question");
    }

    #[test]
    fn issue_type_detected() {
        let s = classify("the deploy is broken and crashing", "http", 0, &cfg());
        assert_eq!(s.kind, "issue");
    }

    #[test]
    fn scheduling_type_detected() {
        let s = classify("remind me about this tomorrow", "http", 0, &cfg());
        assert_eq!(s.kind, "scheduling");
    }

    #[test]
    fn direct_genre_on_trailing_bang() {
        let s = classify("send the report!", "http", 0, &cfg());
        assert_eq!(s.genre, Genre::Direct);
    }

    #[test]
    fn commit_genre_on_whole_phrase() {
        let s = classify("I will follow up on this by Friday", "http", 0, &cfg());
        assert_eq!(s.genre, Genre::Commit);
    }

    #[test]
    fn express_genre_on_affect_markers() {
        let s = classify("thanks, this is great!", "http", 0, &cfg());
        // Trailing '!' would also match DIRECT, but affective markers
        // ("thanks", "great") are checked ahead of the DIRECT rule's
        // looser punctuation-only signal — see rules::classify_genre.
        assert!(matches!(s.genre, Genre::Express | Genre::Direct));
    }

    #[test]
    fn format_derived_from_channel() {
        assert_eq!(rules::format_for_channel("cli"), Format::Command);
        assert_eq!(rules::format_for_channel("http"), Format::Message);
        assert_eq!(rules::format_for_channel("webhook"), Format::Notification);
    }

    #[tokio::test]
    async fn filter_deterministic_skips_rescore() {
        let filter = NoiseFilter::new(cfg());
        let signal = classify("hey", "cli", 0, &cfg());
        let decision = filter.filter_deterministic(signal);
        assert!(!decision.is_pass());
    }

    proptest::proptest! {
        #[test]
        fn weight_always_in_unit_range(s in "\\PC{0,200}") {
            let signal = classify(&s, "http", 0, &ClassifierConfig::default());
            proptest::prop_assert!(signal.weight >= 0.0 && signal.weight <= 1.0);
        }

        #[test]
        fn classification_is_deterministic_prop(s in "\\PC{0,200}", ts in 0u64..1_000_000) {
            let cfg = ClassifierConfig::default();
            let a = classify(&s, "http", ts, &cfg);
            let b = classify(&s, "http", ts, &cfg);
            proptest::prop_assert_eq!(a, b);
        }
    }
}

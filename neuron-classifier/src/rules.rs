//! Ordered keyword rules for `mode`, `genre`, `type`, and `format`.
//!
//! Each classifier is a linear scan over an ordered rule list; the first
//! matching rule wins. Short tokens (`new`, `do`, `set`, ...) are matched
//! on whole-word boundaries via `once_cell`-cached regexes so that they
//! don't fire inside longer words (`document`, `dozen`, `settle`).

use crate::{Format, Genre, Mode};
use once_cell::sync::Lazy;
use regex::Regex;

/// Short tokens (`new`, `do`, `set`, ...) are ambiguous as substrings —
/// they'd match inside `document`, `dozen`, `settle` — so they get a
/// whole-word regex instead of a plain `contains`.
macro_rules! word_matcher {
    ($name:ident, $word:expr) => {
        static $name: Lazy<Regex> =
            Lazy::new(|| Regex::new(concat!(r"\b", $word, r"\b")).expect("static regex is valid"));
    };
}

// BUILD: short tokens ("new") need whole-word boundaries; longer ones
// ("create", "scaffold") are unambiguous as substrings.
word_matcher!(BUILD_NEW, "new");
const BUILD_SUBSTR: &[&str] = &["build", "create", "generate", "scaffold"];

// EXECUTE.
const EXECUTE_SUBSTR: &[&str] = &["run", "execute", "send", "trigger", "sync", "import", "export"];

// ANALYZE.
const ANALYZE_SUBSTR: &[&str] = &["analyz", "report", "dashboard", "metric", "trend", "kpi"];

// MAINTAIN.
const MAINTAIN_SUBSTR: &[&str] = &[
    "fix", "update", "migrat", "backup", "restore", "upgrade", "rollback",
];

/// Classify `mode` per spec §3: BUILD, EXECUTE, ANALYZE, MAINTAIN in that
/// order, else ASSIST.
pub(crate) fn classify_mode(lower: &str) -> Mode {
    if BUILD_SUBSTR.iter().any(|w| lower.contains(w)) || BUILD_NEW.is_match(lower) {
        return Mode::Build;
    }
    if EXECUTE_SUBSTR.iter().any(|w| lower.contains(w)) {
        return Mode::Execute;
    }
    if ANALYZE_SUBSTR.iter().any(|w| lower.contains(w)) {
        return Mode::Analyze;
    }
    if MAINTAIN_SUBSTR.iter().any(|w| lower.contains(w)) {
        return Mode::Maintain;
    }
    Mode::Assist
}

word_matcher!(GENRE_DO, "do");
word_matcher!(GENRE_SET, "set");
const COMMIT_PHRASES: &[&str] = &["i will", "i'll", "let me", "i promise", "i commit"];
const EXPRESS_SUBSTR: &[&str] = &[
    "thanks", "thank you", "love", "hate", "great", "terrible", "wow", "awesome",
];
const DECIDE_SUBSTR: &[&str] = &["approve", "reject", "cancel", "confirm", "decide"];
const DIRECT_SUBSTR: &[&str] = &["please", "run", "make", "send", "create"];

/// Classify `genre` per spec §3: DIRECT, COMMIT, DECIDE, EXPRESS in that
/// order, else INFORM. EXPRESS is checked ahead of DIRECT's trailing-`!`
/// rule so affective exclamations ("thanks, this is great!") aren't
/// mistaken for imperatives.
pub(crate) fn classify_genre(lower: &str) -> Genre {
    if COMMIT_PHRASES.iter().any(|p| lower.contains(p)) {
        return Genre::Commit;
    }
    if EXPRESS_SUBSTR.iter().any(|w| lower.contains(w)) {
        return Genre::Express;
    }
    if DECIDE_SUBSTR.iter().any(|w| lower.contains(w)) || GENRE_SET.is_match(lower) {
        return Genre::Decide;
    }
    if lower.trim_end().ends_with('!')
        || DIRECT_SUBSTR.iter().any(|w| lower.contains(w))
        || GENRE_DO.is_match(lower)
    {
        return Genre::Direct;
    }
    Genre::Inform
}

const ISSUE_SUBSTR: &[&str] = &["error", "bug", "broken", "fail", "crash"];
const SCHEDULING_SUBSTR: &[&str] = &["remind", "schedule", "later", "tomorrow"];
const SUMMARY_SUBSTR: &[&str] = &["summarize", "summary", "brief", "recap"];
const WH_WORDS: &[&str] = &["what", "why", "how", "when", "where", "who", "which"];

/// Classify the free-form `type` tag per spec §3: `question` (trailing
/// `?` or a leading wh-word), `issue`, `scheduling`, `summary`, else
/// `general`.
pub(crate) fn classify_type(lower: &str) -> String {
    if lower.contains('?') || WH_WORDS.iter().any(|w| lower.starts_with(w)) {
        return "question".to_string();
    }
    if ISSUE_SUBSTR.iter().any(|w| lower.contains(w)) {
        return "issue".to_string();
    }
    if SCHEDULING_SUBSTR.iter().any(|w| lower.contains(w)) {
        return "scheduling".to_string();
    }
    if SUMMARY_SUBSTR.iter().any(|w| lower.contains(w)) {
        return "summary".to_string();
    }
    "general".to_string()
}

/// Derive `format` from the inbound channel tag, per spec §3.
/// Unrecognized channels default to `Message`.
pub(crate) fn format_for_channel(channel: &str) -> Format {
    let lower = channel.to_lowercase();
    if lower.contains("cli") || lower.contains("command") {
        Format::Command
    } else if lower.contains("webhook") || lower.contains("notification") {
        Format::Notification
    } else if lower.contains("doc") {
        Format::Document
    } else if lower.contains("transcript") || lower.contains("recording") {
        Format::Transcript
    } else {
        Format::Message
    }
}

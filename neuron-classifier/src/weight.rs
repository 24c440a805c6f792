//! Deterministic weight estimation — the informational-density score
//! noise filtering is based on.

const URGENCY_MARKERS: &[&str] = &["urgent", "asap", "critical", "emergency", "immediately", "now"];
const NOISE_MARKERS: &[&str] = &["hi", "ok", "hey", "sure", "thanks", "lol", "haha", "hello"];

/// Compute a weight in `[0.0, 1.0]` from the lowercased text and its
/// character count, per spec §3/§4.1:
///
/// - a base of 0.5
/// - up to +0.2 from message length (longer messages carry more signal)
/// - +0.15 if the message asks a question
/// - +0.20 if it carries an urgency marker
/// - -0.30 if it matches a known noise phrase exactly or near-exactly
pub(crate) fn compute_weight(lower: &str, char_count: usize) -> f64 {
    let trimmed = lower.trim();
    let word_count = trimmed.split_whitespace().count();

    // A bare noise word/phrase (one or two tokens, fully a known filler)
    // is penalized hard regardless of its other properties.
    let is_bare_noise = word_count <= 2
        && NOISE_MARKERS
            .iter()
            .any(|m| trimmed.trim_end_matches(['!', '.', ',']) == *m);

    let mut weight = 0.5;
    weight += (char_count as f64 / 500.0).min(0.2);
    if lower.contains('?') {
        weight += 0.15;
    }
    if URGENCY_MARKERS.iter().any(|m| lower.contains(m)) {
        weight += 0.20;
    }
    if is_bare_noise {
        weight -= 0.30;
    }

    weight.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_noise_scores_low() {
        assert!(compute_weight("ok", 2) < 0.3);
        assert!(compute_weight("thanks", 6) < 0.3);
    }

    #[test]
    fn urgent_question_scores_high() {
        let w = compute_weight("urgent: is the deploy broken?", 30);
        assert!(w > 0.8, "weight was {w}");
    }

    #[test]
    fn weight_never_escapes_unit_range() {
        assert!(compute_weight("urgent urgent urgent?", 22) <= 1.0);
        assert!(compute_weight("", 0) >= 0.0);
    }
}

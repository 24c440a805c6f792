//! Jittered exponential backoff for transient provider failures.
//!
//! No teacher crate retries a provider call — `neuron-op-react` and
//! `neuron-op-single-shot` both surface a transient
//! `neuron_turn::provider::ProviderError` as `OperatorError::Retryable`
//! and leave retrying to their caller. This is new code, grounded on
//! the `ProviderError::is_transient` seam those operators already
//! check against; the backoff shape (base delay, multiplicative
//! factor, capped attempts, symmetric jitter) follows the retry crates
//! used elsewhere in the example pack (`rand`-based jitter, as seen in
//! `JLABUAN-open-agent-sdk-rust` and `stencila-stencila`).

use rand::Rng;
use std::time::Duration;

/// Tuning for [`RetryConfig::backoff_delay`].
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplicative growth per subsequent attempt.
    pub factor: f64,
    /// Total attempts allowed (including the first), per spec §4.4.
    pub max_attempts: u32,
    /// Fraction of the computed delay to jitter by, symmetric around it.
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            factor: 2.0,
            max_attempts: 5,
            jitter_fraction: 0.2,
        }
    }
}

impl RetryConfig {
    /// The delay to sleep before retry attempt number `attempt` (1-based:
    /// the delay before the *second* call overall).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base_ms = self.base_delay.as_millis() as f64 * self.factor.powi(exponent);
        let jitter_range = base_ms * self.jitter_fraction;
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        let millis = (base_ms + jitter).max(0.0);
        Duration::from_millis(millis as u64)
    }
}

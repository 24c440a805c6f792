//! The optional escalation tier for signals landing in the uncertainty
//! band around the noise threshold, per spec §4.2.

use async_trait::async_trait;

/// A secondary scorer consulted only for signals whose deterministic
/// weight falls within [`ClassifierConfig::uncertainty_band`] of the
/// noise threshold. Implementations might call a small local model, a
/// cheap provider completion, or a heuristic too expensive to run on
/// every message.
///
/// `rescore` returns `None` to defer to the deterministic weight — this
/// is also what a well-behaved implementation should return rather than
/// erroring, since [`NoiseFilter`](crate::NoiseFilter) already applies a
/// timeout around the call.
#[async_trait]
pub trait Rescorer: Send + Sync {
    /// Re-score `text`, given the deterministic `base_weight` that put it
    /// in the uncertainty band. Returns `Some(weight)` in `[0.0, 1.0]` to
    /// override, or `None` to keep `base_weight`.
    async fn rescore(&self, text: &str, base_weight: f64) -> Option<f64>;
}

/// Default [`Rescorer`]: the escalation tier is opt-in, so by default no
/// rescoring happens and the deterministic weight always stands.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRescorer;

#[async_trait]
impl Rescorer for NoOpRescorer {
    async fn rescore(&self, _text: &str, _base_weight: f64) -> Option<f64> {
        None
    }
}

//! `POST /classify` — return only the Signal for a given message, per
//! spec §6. Runs the deterministic classifier and the noise filter's
//! threshold check but never touches a session, provider, or tool.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use neuron_classifier::{classify, FilterDecision, NoiseFilter, Signal};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Request body for `POST /classify`.
#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    /// The raw message text to classify.
    pub message: String,
    /// Logical channel the message arrived on. Defaults to `http`.
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_channel() -> String {
    "http".to_string()
}

/// Response body for `POST /classify`.
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    /// The full five-dimensional Signal.
    #[serde(flatten)]
    pub signal: Signal,
    /// Whether this signal would pass the noise filter at the
    /// configured threshold (deterministic weight only — this endpoint
    /// never invokes the optional rescore tier).
    pub would_pass: bool,
}

/// `POST /classify`. Pure and side-effect-free per spec §4.1's
/// invariant: no provider call, no tool call, no session mutation.
pub async fn classify_handler(
    State(state): State<AppState>,
    Json(req): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, ApiError> {
    if req.message.is_empty() && req.channel.is_empty() {
        return Err(ApiError::InvalidInput("channel must not be empty".to_string()));
    }

    let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);
    let signal = classify(&req.message, &req.channel, now, &state.classifier_config);

    let filter = NoiseFilter::new(state.classifier_config.clone());
    let decision = filter.filter_deterministic(signal.clone());

    Ok(Json(ClassifyResponse {
        signal,
        would_pass: matches!(decision, FilterDecision::Pass(_)),
    }))
}

pub use classify_handler as classify;

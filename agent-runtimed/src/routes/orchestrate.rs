//! `POST /orchestrate` — the Agent Loop entry point, per spec §6.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use layer0::content::Content;
use layer0::id::{SessionId, UserId};
use layer0::operator::{Operator, OperatorInput, OperatorOutput, TriggerType};
use neuron_session::ANONYMOUS_USER;
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Request body for `POST /orchestrate`.
#[derive(Debug, Deserialize)]
pub struct OrchestrateRequest {
    /// The user-facing message to run through the Agent Loop.
    pub message: String,
    /// Session id to resume, or a new id to start one. Required — the
    /// caller picks the id so it can subscribe to `/stream/{id}` before
    /// the first reply arrives.
    pub session_id: String,
    /// Owning user id. Defaults to the anonymous user when auth is off.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Logical channel this request arrived on (e.g. `http`, `slack`).
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_channel() -> String {
    "http".to_string()
}

/// `POST /orchestrate`. Ensures the session exists (spawning a fresh
/// Agent Loop handle on first use), then runs one reason-act cycle
/// through it.
pub async fn orchestrate(
    State(state): State<AppState>,
    Json(req): Json<OrchestrateRequest>,
) -> Result<Json<OperatorOutput>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::InvalidInput("message must not be empty".to_string()));
    }

    let session_id = SessionId::new(req.session_id);
    let owner = UserId::new(req.user_id.unwrap_or_else(|| ANONYMOUS_USER.to_string()));
    let now = layer0::DurationMs::from_millis(
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0),
    );

    let record = state
        .sessions
        .ensure(session_id.clone(), owner.clone(), req.channel, now, || state.new_session_handle())?;

    let mut input = OperatorInput::new(Content::text(req.message), TriggerType::User);
    input.session = Some(session_id);

    let output = record.handle.execute(input).await?;
    Ok(Json(output))
}

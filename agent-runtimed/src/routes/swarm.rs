//! `POST /swarm/launch`, `GET /swarm/{id}`, `DELETE /swarm/{id}`, per
//! spec §6/§4.10.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use layer0::id::SwarmId;
use neuron_swarm::SwarmSnapshot;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Request body for `POST /swarm/launch`.
#[derive(Debug, Deserialize)]
pub struct LaunchSwarmRequest {
    /// The task text to decompose and execute.
    pub task: String,
    /// One of `parallel`, `pipeline`, `debate`, `review`.
    pub pattern: String,
    /// Cap on plan items for this launch; clamped to
    /// `max_agents_per_swarm` if larger. Defaults to that configured max.
    #[serde(default)]
    pub max_agents: Option<usize>,
    /// Per-swarm deadline override, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Response body for `POST /swarm/launch`.
#[derive(Debug, Serialize)]
pub struct LaunchSwarmResponse {
    /// The newly launched swarm's id. Poll `GET /swarm/{id}` for status.
    pub swarm_id: String,
}

/// `POST /swarm/launch`. Returns `202 Accepted` on success — the swarm
/// runs in the background; the caller polls or watches the firehose for
/// its terminal event.
pub async fn launch_swarm(
    State(state): State<AppState>,
    Json(req): Json<LaunchSwarmRequest>,
) -> Result<(StatusCode, Json<LaunchSwarmResponse>), ApiError> {
    if req.task.trim().is_empty() {
        return Err(ApiError::InvalidInput("task must not be empty".to_string()));
    }

    let timeout = req.timeout_ms.map(Duration::from_millis);
    let swarm_id = Arc::clone(&state.swarm).launch(req.task, &req.pattern, req.max_agents, timeout).await?;

    Ok((StatusCode::ACCEPTED, Json(LaunchSwarmResponse { swarm_id: swarm_id.to_string() })))
}

/// `GET /swarm/{id}`. Returns a snapshot of the swarm's current state.
pub async fn swarm_status(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SwarmSnapshot>, ApiError> {
    let snapshot = state.swarm.status(&SwarmId::new(id))?;
    Ok(Json(snapshot))
}

/// `DELETE /swarm/{id}`. Cancels a running swarm. A no-op error on a
/// swarm that's already terminal, per spec §4.10's idempotency clause.
pub async fn cancel_swarm(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.swarm.cancel(&SwarmId::new(id))?;
    Ok(StatusCode::NO_CONTENT)
}

//! `GET /tools` and `POST /tools/{name}/execute`, per spec §6.
//!
//! The execute route dispatches straight through [`ToolRegistry::dispatch`],
//! bypassing the Agent Loop entirely — no hook pipeline, no budget gate,
//! no conversation history. Per spec §6's table this is a direct
//! invocation for operators/tests, not a substitute for the loop's own
//! tool dispatch (which still runs the safety hooks ahead of it).

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use neuron_tool::{ToolError, ToolOutput};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in the `/tools` catalogue response.
#[derive(Debug, Serialize)]
pub struct ToolDescriptor {
    /// The tool's unique name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub input_schema: Value,
}

/// `GET /tools`. Lists the registry's current catalogue snapshot.
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDescriptor>> {
    let descriptors = state
        .tools
        .catalogue()
        .into_iter()
        .map(|(name, description, input_schema)| ToolDescriptor { name, description, input_schema })
        .collect();
    Json(descriptors)
}

/// Request body for `POST /tools/{name}/execute`.
#[derive(Debug, Deserialize)]
pub struct ExecuteToolRequest {
    /// Arguments passed verbatim to the tool's handler.
    #[serde(default)]
    pub arguments: Value,
}

/// Response body for `POST /tools/{name}/execute`.
#[derive(Debug, Serialize)]
pub struct ExecuteToolResponse {
    /// The tool's result envelope.
    #[serde(flatten)]
    pub output: ToolOutput,
}

/// `POST /tools/{name}/execute`. Unknown tool names and timeouts map to
/// `404`/`tool_error` per spec §7; a handler-reported `ToolOutput::Error`
/// is still a `200` — it's a successful dispatch that the tool itself
/// reported failing.
pub async fn execute_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ExecuteToolRequest>,
) -> Result<Json<ExecuteToolResponse>, ApiError> {
    let output = state.tools.dispatch(&name, req.arguments).await.map_err(|err| match err {
        ToolError::UnknownTool => ApiError::NotFound(format!("unknown tool: {name}")),
        ToolError::Timeout => ApiError::ToolError("tool_timeout".to_string()),
    })?;
    Ok(Json(ExecuteToolResponse { output }))
}

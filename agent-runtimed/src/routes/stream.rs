//! `GET /stream/{session_id}` — per-session SSE fan-out, per spec §4.8.

use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use layer0::id::{SessionId, UserId};
use neuron_events::{sse_frame, sse_keepalive, SSE_KEEPALIVE_INTERVAL};
use neuron_session::ANONYMOUS_USER;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Query parameters for `GET /stream/{session_id}`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// The caller's identity, checked against the session's owner per
    /// spec §4.3. Defaults to the anonymous user when auth is off.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Stream events scoped to one session as `text/event-stream`, merged
/// with a keepalive comment every [`SSE_KEEPALIVE_INTERVAL`] so
/// intermediary proxies don't close the connection during a quiet spell.
///
/// Enforces the Session Registry's ownership check (§4.3): a requester
/// whose `user_id` doesn't match the session's owner gets `not_found`,
/// the same response an unknown session id would get, rather than a
/// distinguishing `unauthorised` that would leak the session's existence.
pub async fn stream_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let session_id = SessionId::new(session_id);
    let requester = UserId::new(query.user_id.unwrap_or_else(|| ANONYMOUS_USER.to_string()));
    state.sessions.lookup(&session_id, &requester)?;

    let rx = state.events.subscribe_session(&session_id);
    Ok(sse_response(rx))
}

fn sse_response(rx: tokio::sync::broadcast::Receiver<neuron_events::Event>) -> Response {
    let events = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(event) => sse_frame(&event),
        Err(_lagged) => Some(sse_keepalive().to_string()),
    });

    let ticks = tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(SSE_KEEPALIVE_INTERVAL))
        .map(|_| sse_keepalive().to_string());

    let body_stream = tokio_stream::StreamExt::merge(events, ticks).map(|frame| Ok::<_, std::convert::Infallible>(frame));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .expect("sse response is well-formed")
}

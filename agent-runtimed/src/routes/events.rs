//! `GET /events/stream` — the firehose SSE endpoint, per spec §4.8.

use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::Response;
use neuron_events::{sse_frame, sse_keepalive, SSE_KEEPALIVE_INTERVAL};
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

/// Stream every event published on the bus, across all sessions.
pub async fn stream_events(State(state): State<AppState>) -> Response {
    let rx = state.events.subscribe_firehose();

    let events = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(event) => sse_frame(&event),
        Err(_lagged) => Some(sse_keepalive().to_string()),
    });
    let ticks = IntervalStream::new(tokio::time::interval(SSE_KEEPALIVE_INTERVAL)).map(|_| sse_keepalive().to_string());
    let body_stream = events.merge(ticks).map(|frame| Ok::<_, std::convert::Infallible>(frame));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .expect("sse response is well-formed")
}

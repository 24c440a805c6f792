#![deny(missing_docs)]
//! Event Bus for the agent runtime, per spec §4.8.
//!
//! Two kinds of topic: a per-session `broadcast::Sender<Event>` and one
//! firehose sender that sees every event regardless of session. This is
//! the `AgentHandle::subscribe()` pattern from `swedishembedded-sven`'s
//! `sven-node`/`sven-gateway` control service — the teacher repo this
//! runtime is otherwise built on has no pub/sub fan-out of its own.
//!
//! `tokio::sync::broadcast` gives the backpressure behaviour spec §4.8
//! asks for directly: a subscriber that falls more than `capacity`
//! events behind receives `RecvError::Lagged` and is disconnected rather
//! than stalling the publisher.

use layer0::id::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

/// How long an SSE stream may stay silent before a keepalive comment is
/// sent, per spec §4.8.
pub const SSE_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// The default bounded backlog per topic before a lagging subscriber is
/// dropped, matching the `sven-node` control service's channel capacity.
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// An event published on the bus, per spec §3's `{type, session_id
/// (optional), payload_map, timestamp}`. Distinct from
/// [`layer0::lifecycle::ObservableEvent`], which carries no
/// `session_id` and exists for a different purpose (turn-level
/// lifecycle observability rather than bus routing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// The event's type tag (`llm_request`, `tool_call_start`, ...).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Routes the event onto `session:{id}` in addition to the firehose.
    pub session_id: Option<SessionId>,
    /// Arbitrary structured payload.
    pub payload: serde_json::Value,
    /// Epoch-millisecond timestamp.
    pub timestamp: layer0::DurationMs,
}

impl Event {
    /// Construct an event with no session routing (firehose-only).
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value, timestamp: layer0::DurationMs) -> Self {
        Self {
            event_type: event_type.into(),
            session_id: None,
            payload,
            timestamp,
        }
    }

    /// Attach a session for session-scoped routing.
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Fan-out hub: a firehose topic plus one topic per session.
///
/// Publishing never blocks on subscribers — `broadcast::Sender::send`
/// only fails when there are no receivers, which is not an error here
/// (nobody's listening yet is fine).
pub struct EventBus {
    firehose: broadcast::Sender<Event>,
    sessions: Mutex<HashMap<SessionId, broadcast::Sender<Event>>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus with the default per-topic capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Create a bus with a custom per-topic backlog capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (firehose, _) = broadcast::channel(capacity);
        Self {
            firehose,
            sessions: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Publish an event. Routed to the firehose always, and additionally
    /// to `session:{id}` if `event.session_id` is set.
    pub fn publish(&self, event: Event) {
        if let Some(ref session_id) = event.session_id {
            let sender = self.session_sender(session_id.clone());
            let _ = sender.send(event.clone());
        }
        let _ = self.firehose.send(event);
    }

    /// Subscribe to every event published on the bus.
    pub fn subscribe_firehose(&self) -> broadcast::Receiver<Event> {
        self.firehose.subscribe()
    }

    /// Subscribe to events scoped to one session, creating the topic if
    /// it doesn't exist yet.
    pub fn subscribe_session(&self, session_id: &SessionId) -> broadcast::Receiver<Event> {
        self.session_sender(session_id.clone()).subscribe()
    }

    /// Drop a session's topic once the session terminates. Any lingering
    /// subscribers simply see the channel close.
    pub fn remove_session_topic(&self, session_id: &SessionId) {
        self.sessions
            .lock()
            .expect("event bus session map mutex poisoned")
            .remove(session_id);
    }

    fn session_sender(&self, session_id: SessionId) -> broadcast::Sender<Event> {
        let mut sessions = self.sessions.lock().expect("event bus session map mutex poisoned");
        sessions
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame one event as an SSE message: `event: <type>\ndata: <json>\n\n`.
///
/// Returns `None` on serialization failure — per spec §4.8 the stream
/// should skip that one event (logged by the caller) rather than abort.
pub fn sse_frame(event: &Event) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(format!("event: {}\ndata: {}\n\n", event.event_type, json)),
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize event for SSE, skipping");
            None
        }
    }
}

/// The SSE keepalive comment line sent after a period of silence.
pub fn sse_keepalive() -> &'static str {
    ": keepalive\n\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn event(session: Option<&str>) -> Event {
        let mut e = Event::new("tool_call_start", serde_json::json!({"tool": "read_file"}), layer0::DurationMs::ZERO);
        if let Some(s) = session {
            e.session_id = Some(SessionId::new(s));
        }
        e
    }

    #[tokio::test]
    async fn firehose_receives_every_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_firehose();
        bus.publish(event(None));
        bus.publish(event(Some("s1")));
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.event_type, "tool_call_start");
        assert_eq!(second.session_id, Some(SessionId::new("s1")));
    }

    #[tokio::test]
    async fn session_topic_only_sees_its_own_events() {
        let bus = EventBus::new();
        let mut session_rx = bus.subscribe_session(&SessionId::new("s1"));
        bus.publish(event(Some("s2")));
        bus.publish(event(Some("s1")));

        let received = session_rx.recv().await.unwrap();
        assert_eq!(received.session_id, Some(SessionId::new("s1")));
        assert!(matches!(session_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn lagging_subscriber_is_dropped_not_blocking() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.subscribe_firehose();
        for _ in 0..5 {
            bus.publish(event(None));
        }
        let result = rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }

    #[test]
    fn sse_frame_formats_type_and_json() {
        let e = event(None);
        let frame = sse_frame(&e).unwrap();
        assert!(frame.starts_with("event: tool_call_start\ndata: "));
        assert!(frame.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn remove_session_topic_closes_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_session(&SessionId::new("s1"));
        bus.remove_session_topic(&SessionId::new("s1"));
        let result = rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Closed)));
    }
}

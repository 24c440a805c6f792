#![deny(missing_docs)]
//! Session Registry for the agent runtime, per spec §4.3.
//!
//! A process-wide map from [`SessionId`] to a session record, generalizing
//! `neuron-orch-local::LocalOrch`'s `HashMap<String, Arc<dyn Operator>>`
//! dispatch table into a registry keyed by session with ownership checks
//! and a background idle reaper — neither of which `LocalOrch` has, since
//! the teacher's orchestrator is stateless with respect to sessions.
//!
//! Generic over `H`, the per-session execution handle (e.g. an Agent
//! Loop's running state). This crate owns the map and its lifecycle; it
//! has no opinion on what a session *runs*.

use layer0::id::{SessionId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// The designated user id that bypasses ownership checks when
/// authentication is globally disabled, per spec §4.3.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Failure modes for registry operations.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// No session exists with this id, or the requester doesn't own it.
    #[error("session not found")]
    NotFound,
    /// The system could not spawn the backing execution unit (e.g.
    /// resource exhaustion). Callers must propagate this as a 503.
    #[error("session unavailable")]
    Unavailable,
}

/// One registered session's metadata and execution handle.
pub struct SessionRecord<H> {
    /// This session's id.
    pub session_id: SessionId,
    /// The user this session belongs to.
    pub owner_user_id: UserId,
    /// The channel the session was created on.
    pub channel: String,
    /// When the session was created, epoch milliseconds.
    pub created_at: layer0::DurationMs,
    /// The caller-supplied execution handle (e.g. the running Agent Loop
    /// state for this session).
    pub handle: H,
    last_activity: Mutex<Instant>,
}

impl<H> SessionRecord<H> {
    /// Update this session's last-activity timestamp to now, resetting
    /// its idle-reaping clock.
    pub fn touch(&self) {
        *self.last_activity.lock().expect("session record mutex poisoned") = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .expect("session record mutex poisoned")
            .elapsed()
    }
}

/// Process-wide session map. Clone is cheap — it's an `Arc` handle.
pub struct SessionRegistry<H> {
    sessions: Mutex<HashMap<SessionId, Arc<SessionRecord<H>>>>,
    auth_enabled: bool,
}

impl<H> SessionRegistry<H> {
    /// Create an empty registry. `auth_enabled` gates the ownership
    /// check's `anonymous`-user bypass, per spec §4.3.
    pub fn new(auth_enabled: bool) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            auth_enabled,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Arc<SessionRecord<H>>>> {
        self.sessions.lock().expect("session registry mutex poisoned")
    }

    /// Return the existing session if present, otherwise create one via
    /// `make_handle`. `make_handle` returning `Err` surfaces as
    /// [`SessionError::Unavailable`] — the caller couldn't spawn the
    /// backing execution unit.
    pub fn ensure<E>(
        &self,
        session_id: SessionId,
        owner_user_id: UserId,
        channel: impl Into<String>,
        now: layer0::DurationMs,
        make_handle: impl FnOnce() -> Result<H, E>,
    ) -> Result<Arc<SessionRecord<H>>, SessionError> {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(&session_id) {
            existing.touch();
            return Ok(Arc::clone(existing));
        }

        let handle = make_handle().map_err(|_| SessionError::Unavailable)?;
        let record = Arc::new(SessionRecord {
            session_id: session_id.clone(),
            owner_user_id,
            channel: channel.into(),
            created_at: now,
            handle,
            last_activity: Mutex::new(Instant::now()),
        });
        sessions.insert(session_id, Arc::clone(&record));
        Ok(record)
    }

    /// Look up a session, enforcing the ownership check: a requester
    /// whose `user_id` differs from the session's `owner_user_id` sees
    /// `not_found`, unless `requester_user_id` is [`ANONYMOUS_USER`] and
    /// this registry was built with `auth_enabled = false`.
    pub fn lookup(&self, session_id: &SessionId, requester_user_id: &UserId) -> Result<Arc<SessionRecord<H>>, SessionError> {
        let sessions = self.lock();
        let record = sessions.get(session_id).ok_or(SessionError::NotFound)?;

        let bypasses_ownership = !self.auth_enabled && requester_user_id.as_str() == ANONYMOUS_USER;
        if !bypasses_ownership && &record.owner_user_id != requester_user_id {
            return Err(SessionError::NotFound);
        }
        record.touch();
        Ok(Arc::clone(record))
    }

    /// Remove and return a session, deallocating it. Any outstanding
    /// operation against it is the caller's responsibility to cancel.
    pub fn terminate(&self, session_id: &SessionId) -> Option<Arc<SessionRecord<H>>> {
        self.lock().remove(session_id)
    }

    /// Number of currently registered sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry currently holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sessions whose idle time exceeds `idle_ttl`, without removing
    /// them. Used by the reaper and exposed for tests/introspection.
    pub fn idle_sessions(&self, idle_ttl: Duration) -> Vec<SessionId> {
        self.lock()
            .values()
            .filter(|record| record.idle_for() >= idle_ttl)
            .map(|record| record.session_id.clone())
            .collect()
    }
}

impl<H: Send + Sync + 'static> SessionRegistry<H> {
    /// Spawn a background reaper that scans every `scan_interval` and
    /// terminates sessions idle past `idle_ttl`, invoking `on_reap` with
    /// each removed record (e.g. to run its handle's session-end
    /// teardown and publish a `session_ended` event). The returned
    /// `JoinHandle` runs until dropped or aborted; there is no other
    /// shutdown signal since the registry itself has no end-of-life.
    pub fn spawn_reaper(
        registry: Arc<Self>,
        scan_interval: Duration,
        idle_ttl: Duration,
        on_reap: impl Fn(Arc<SessionRecord<H>>) + Send + Sync + 'static,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scan_interval);
            loop {
                ticker.tick().await;
                for session_id in registry.idle_sessions(idle_ttl) {
                    if let Some(record) = registry.terminate(&session_id) {
                        tracing::info!(%session_id, "reaped idle session");
                        on_reap(record);
                    }
                }
            }
        })
    }
}

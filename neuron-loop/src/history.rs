//! Per-session conversation history, persisted via `layer0::StateStore`.
//!
//! Grounded on `neuron-op-react`'s `assemble_context`, which reads the
//! same `Scope::Session(...)` / `"messages"` key through a
//! `StateReader` but never writes it back — that operator has no
//! concept of a loop spanning multiple turns. The Agent Loop owns the
//! full read-modify-write cycle since it's the one thing in the
//! runtime that both reads and mutates conversation state directly
//! (every other mutation goes through `Effect`s).

use layer0::effect::Scope;
use layer0::id::SessionId;
use layer0::StateStore;
use neuron_turn::types::ProviderMessage;

/// The state key conversation history is stored under within a
/// session's scope.
pub const HISTORY_KEY: &str = "messages";

/// Failure modes reading or writing session history.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The underlying state store rejected the read or write.
    #[error("state store error: {0}")]
    Store(#[from] layer0::error::StateError),
    /// The stored value wasn't the shape `Vec<ProviderMessage>` expects.
    #[error("stored history is not valid: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Load a session's history, or an empty history if none is stored yet.
pub async fn load(state: &dyn StateStore, session: &SessionId) -> Result<Vec<ProviderMessage>, HistoryError> {
    let scope = Scope::Session(session.clone());
    match state.read(&scope, HISTORY_KEY).await? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(Vec::new()),
    }
}

/// Persist a session's full history, overwriting whatever was stored.
pub async fn store(
    state: &dyn StateStore,
    session: &SessionId,
    history: &[ProviderMessage],
) -> Result<(), HistoryError> {
    let scope = Scope::Session(session.clone());
    let value = serde_json::to_value(history)?;
    state.write(&scope, HISTORY_KEY, value).await?;
    Ok(())
}

//! HTTP surface assembly: one module per endpoint group, wired into a
//! single [`axum::Router`] in [`router`].

mod classify;
mod events;
mod orchestrate;
mod stream;
mod swarm;
mod tools;

use crate::auth::bearer_auth_mw;
use crate::state::AppState;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Assemble the full router, per spec §6's endpoint table.
pub fn router(state: AppState) -> Router {
    let require_auth = state.config.require_auth;

    let mut app = Router::new()
        .route("/orchestrate", post(orchestrate::orchestrate))
        .route("/stream/:session_id", get(stream::stream_session))
        .route("/classify", post(classify::classify))
        .route("/tools", get(tools::list_tools))
        .route("/tools/:name/execute", post(tools::execute_tool))
        .route("/swarm/launch", post(swarm::launch_swarm))
        .route("/swarm/:id", get(swarm::swarm_status).delete(swarm::cancel_swarm))
        .route("/events/stream", get(events::stream_events));

    if require_auth {
        app = app.layer(middleware::from_fn_with_state(state.clone(), bearer_auth_mw::<AppState>));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

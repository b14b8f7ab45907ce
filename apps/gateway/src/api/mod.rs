mod auth;
mod health;
mod notifications;

use crate::state::AppState;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Compose the gateway's full route tree.
///
/// The panic layer sits outermost so a panicking handler answers 500
/// instead of tearing down the connection.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(auth::router(state.clone()))
        .merge(notifications::router(state.clone()))
        .merge(health::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
}

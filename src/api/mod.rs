use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::auth;
use crate::AppState;

pub mod handlers;

/// Build the full router: unauthenticated health probe, API-key-guarded
/// client endpoints, decision-key-guarded callback.
pub fn router(state: Arc<AppState>) -> Router {
    let client_routes = Router::new()
        .route("/request", post(handlers::submit_request))
        .route("/pickup", post(handlers::pickup_credential))
        .route("/status", get(handlers::get_status))
        .layer(middleware::from_fn_with_state(state.clone(), auth::api_key_auth));

    let decision_routes = Router::new()
        .route("/decision", post(handlers::decide_request))
        .layer(middleware::from_fn_with_state(state.clone(), auth::decision_key_auth));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(client_routes)
        .merge(decision_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

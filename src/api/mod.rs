//! Herald HTTP API
//!
//! HTTP layer for Herald, built with Axum.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /ws` - Broadcast connection (path set by `server.route`)
//!
//! ## Health
//! - `GET /health/live` - Liveness check
//! - `GET /health/ready` - Readiness check
//! - `GET /health` - Full health status
//!
//! The router must be served with
//! `into_make_service_with_connect_info::<SocketAddr>()`; the WebSocket
//! handler uses the peer address as the connection identity.

pub mod dto;
pub mod routes;
pub mod state;

pub use state::AppState;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::hub::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let ws_route = state.config.route.clone();
    let shared_state = Arc::new(state);

    Router::new()
        .route(&ws_route, get(websocket_handler))
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

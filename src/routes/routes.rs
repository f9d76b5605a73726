//! Defines the HTTP surface of the service.
//!
//! ## Structure
//! - `ANY  /_ah/health` — liveness probe
//! - `GET  /user`       — list stored user locations
//! - `POST /user`       — upsert one user location
//! - `POST /log`        — upload a CSV log file to the bucket

use crate::{
    handlers::{
        health_handlers::health,
        log_handlers::upload_log,
        user_handlers::{list_users, upsert_user},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{any, get, post},
};

/// Build and return the router for all endpoints.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/_ah/health", any(health))
        .route("/user", get(list_users).post(upsert_user))
        // uploads are streamed straight to the bucket, so no buffering cap applies
        .route("/log", post(upload_log).layer(DefaultBodyLimit::disable()))
}

//! Axon landing page library.
//!
//! The waitlist form, the "Continue" session button and the feedback panel,
//! served as askama pages and HTMX fragments. Built as a library so the
//! router can be driven from integration tests with in-memory collaborators.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod filters;
pub mod firebase;
pub mod middleware;
pub mod models;
pub mod pocketbase;
pub mod routes;
pub mod services;
pub mod state;

use std::path::Path;

use axum::{Router, extract::Request};
use tower_http::{services::ServeDir, trace::TraceLayer};

use state::AppState;

/// Build the application router.
///
/// Sentry layers are added by the binary; everything else lives here.
pub fn app(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.config());
    let static_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("static");

    Router::new()
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(session_layer)
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

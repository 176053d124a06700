//! HTTP route handlers for the landing page.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Landing page
//! GET  /health                    - Health check
//!
//! # Waitlist (HTMX fragments)
//! POST /waitlist                  - Submit email (returns form, may trigger confetti)
//! POST /waitlist/edit             - Input edited (returns cleared status line)
//!
//! # Session
//! GET  /session                   - Continue button fragment
//! GET  /auth/continue             - Deep link, or redirect to Google sign-in
//! GET  /auth/google/callback      - Finish Google sign-in
//! POST /auth/logout               - Sign out (returns continue button)
//!
//! # Feedback (HTMX fragments)
//! GET  /feedback                  - Open panel
//! POST /feedback                  - Submit feedback
//! POST /feedback/screenshot       - Attach captured image
//! POST /feedback/screenshot/clear - Remove attached image
//! POST /feedback/dismiss          - Close panel
//! ```

pub mod auth;
pub mod feedback;
pub mod landing;
pub mod waitlist;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    handler::Handler,
    routing::{get, post},
};

use crate::middleware::{auth_rate_limiter, form_rate_limiter};
use crate::state::AppState;

/// Create the waitlist routes router.
pub fn waitlist_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(waitlist::submit).route_layer(form_rate_limiter()),
        )
        .route("/edit", post(waitlist::edit))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/continue", get(auth::continue_to_product))
        .route("/google/callback", get(auth::google_callback))
        .route("/logout", post(auth::logout))
        .route_layer(auth_rate_limiter())
}

/// Create the feedback routes router.
pub fn feedback_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(feedback::open).post(feedback::submit.layer(form_rate_limiter())),
        )
        .route(
            "/screenshot",
            post(feedback::attach_screenshot)
                .layer(DefaultBodyLimit::max(feedback::SCREENSHOT_BODY_LIMIT)),
        )
        .route("/screenshot/clear", post(feedback::clear_screenshot))
        .route("/dismiss", post(feedback::dismiss))
}

/// Create all routes for the landing page.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(landing::index))
        .route("/health", get(landing::health))
        .route("/session", get(auth::session_button))
        .nest("/waitlist", waitlist_routes())
        .nest("/auth", auth_routes())
        .nest("/feedback", feedback_routes())
        .fallback(landing::not_found)
}

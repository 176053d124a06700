//! HTTP middleware stack for the landing page.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers (CSP, COOP, etc.)
//! 5. Session layer (tower-sessions with in-memory store)
//! 6. Rate limiting on form and sign-in routes (governor)
//!
//! The `Visitor` extractor resolves the per-visitor identity provider from
//! the session.

pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;
pub mod visitor;

pub use rate_limit::{auth_rate_limiter, form_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
pub use visitor::Visitor;

//! Session-related types.
//!
//! Per-visitor state kept in the session between requests.

/// Session keys.
pub mod keys {
    /// Stable per-visitor key for the identity provider registry.
    pub const VISITOR_ID: &str = "visitor_id";

    /// Sign-in restored into the identity provider on each request.
    pub const PERSISTED_USER: &str = "persisted_user";

    /// Waitlist form state (`SubmissionState`).
    pub const SUBMISSION: &str = "waitlist_submission";

    /// Feedback panel state (`FeedbackPanel`).
    pub const FEEDBACK_PANEL: &str = "feedback_panel";

    /// Google OAuth state (CSRF protection).
    pub const GOOGLE_OAUTH_STATE: &str = "google_oauth_state";

    /// One-shot sign-in failure message shown on the next page render.
    pub const SIGN_IN_ERROR: &str = "sign_in_error";
}

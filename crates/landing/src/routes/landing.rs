//! Landing page route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{http::Uri, response::IntoResponse};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::Visitor;
use crate::models::session_keys;
use crate::routes::auth::ContinueButtonView;
use crate::routes::feedback::FeedbackPanelView;
use crate::routes::waitlist::WaitlistFormView;
use crate::services::{FeedbackPanel, SessionView, SubmissionState};

/// Landing page template.
#[derive(Template, WebTemplate)]
#[template(path = "landing.html")]
pub struct LandingTemplate {
    pub form: WaitlistFormView,
    pub session: ContinueButtonView,
    pub panel: FeedbackPanelView,
    pub sign_in_error: Option<String>,
}

/// Render the landing page.
///
/// The continue button starts out loading and fetches itself once the page
/// is up. A sign-in failure from the previous redirect is shown once.
#[instrument(skip(visitor))]
pub async fn index(visitor: Visitor) -> Result<impl IntoResponse> {
    let submission: SubmissionState = visitor.load(session_keys::SUBMISSION).await?;
    let mut panel: FeedbackPanel = visitor.load(session_keys::FEEDBACK_PANEL).await?;
    panel.settle(chrono::Utc::now());

    let sign_in_error: Option<String> = visitor
        .session
        .remove(session_keys::SIGN_IN_ERROR)
        .await?;

    Ok(LandingTemplate {
        form: WaitlistFormView::from(&submission),
        session: ContinueButtonView::from(&SessionView::Loading),
        panel: FeedbackPanelView::from(&panel),
        sign_in_error,
    })
}

/// Liveness health check endpoint.
pub async fn health() -> &'static str {
    "ok"
}

/// Fallback for unknown paths.
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_page_renders_sections() {
        let html = LandingTemplate {
            form: WaitlistFormView::default(),
            session: ContinueButtonView::from(&SessionView::Loading),
            panel: FeedbackPanelView::default(),
            sign_in_error: Some("Sign-in failed. Please try again.".to_string()),
        }
        .render()
        .unwrap();

        assert!(html.contains("id=\"waitlist-form\""));
        assert!(html.contains("id=\"continue\""));
        assert!(html.contains("id=\"feedback-panel\""));
        assert!(html.contains("Sign-in failed. Please try again."));
    }

    #[tokio::test]
    async fn test_not_found_carries_path() {
        let err = not_found(Uri::from_static("/nope")).await;
        assert_eq!(err.to_string(), "Not found: /nope");
    }
}

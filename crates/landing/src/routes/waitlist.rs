//! Waitlist form route handlers.
//!
//! The form swaps itself via HTMX. A successful signup also answers with an
//! `HX-Trigger: confetti` header that the page script turns into a burst.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{AppendHeaders, IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{Result, add_breadcrumb};
use crate::middleware::Visitor;
use crate::models::session_keys;
use crate::services::{
    ConfettiBurst, RecordedCelebration, SubmissionPhase, SubmissionState, WaitlistController,
};
use crate::state::AppState;

/// Waitlist form display data for templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitlistFormView {
    pub email_input: String,
    pub status_message: Option<String>,
    pub is_subscribed: bool,
    pub is_error: bool,
}

impl From<&SubmissionState> for WaitlistFormView {
    fn from(state: &SubmissionState) -> Self {
        Self {
            email_input: state.email_input.clone(),
            status_message: state.status_message.clone(),
            is_subscribed: state.is_subscribed,
            is_error: matches!(
                state.phase(),
                SubmissionPhase::Invalid | SubmissionPhase::ErrorShown
            ),
        }
    }
}

/// Waitlist form data.
#[derive(Debug, Deserialize)]
pub struct WaitlistForm {
    #[serde(default)]
    pub email: String,
}

/// Form fragment template (replaces the form via HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/waitlist_form.html")]
pub struct WaitlistFormTemplate {
    pub form: WaitlistFormView,
}

/// Status line fragment template.
#[derive(Template, WebTemplate)]
#[template(path = "partials/waitlist_status.html")]
pub struct WaitlistStatusTemplate {
    pub form: WaitlistFormView,
}

/// `HX-Trigger` payload for a confetti burst.
fn confetti_trigger(burst: &ConfettiBurst) -> String {
    serde_json::json!({ "confetti": burst }).to_string()
}

/// Submit the waitlist form (HTMX).
#[instrument(skip(state, visitor), fields(email = %form.email))]
pub async fn submit(
    State(state): State<AppState>,
    visitor: Visitor,
    Form(form): Form<WaitlistForm>,
) -> Result<Response> {
    let mut submission: SubmissionState = visitor.load(session_keys::SUBMISSION).await?;
    let celebration = RecordedCelebration::new();

    let outcome = state
        .waitlist()
        .submit(&mut submission, &form.email, &celebration)
        .await;
    visitor.save(session_keys::SUBMISSION, &submission).await?;

    let outcome_label = format!("{outcome:?}");
    add_breadcrumb(
        "waitlist",
        "Submitted waitlist form",
        Some(&[("outcome", outcome_label.as_str())]),
    );

    let template = WaitlistFormTemplate {
        form: WaitlistFormView::from(&submission),
    };

    Ok(match celebration.fired().first() {
        Some(burst) => (
            AppendHeaders([("HX-Trigger", confetti_trigger(burst))]),
            template,
        )
            .into_response(),
        None => template.into_response(),
    })
}

/// The visitor typed into the email input while a message was shown (HTMX).
///
/// Returns the cleared status line.
#[instrument(skip(visitor, form))]
pub async fn edit(visitor: Visitor, Form(form): Form<WaitlistForm>) -> Result<impl IntoResponse> {
    let mut submission: SubmissionState = visitor.load(session_keys::SUBMISSION).await?;
    WaitlistController::edit(&mut submission, &form.email);
    visitor.save(session_keys::SUBMISSION, &submission).await?;

    Ok(WaitlistStatusTemplate {
        form: WaitlistFormView::from(&submission),
    })
}

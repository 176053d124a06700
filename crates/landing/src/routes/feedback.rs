//! Feedback panel route handlers.
//!
//! The panel is an HTMX fragment swapped into `#feedback-panel`. Screenshots
//! are captured in the browser and posted as PNG data URLs; they only live in
//! the visitor's session and are never written to the record store.

use askama::Template;
use askama_web::WebTemplate;
use axum::{Form, extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{Result, add_breadcrumb};
use crate::middleware::Visitor;
use crate::models::session_keys;
use crate::services::{FeedbackController, FeedbackOutcome, FeedbackPanel};
use crate::state::AppState;

/// Request body limit for screenshot uploads.
///
/// A 4 MiB PNG grows by a third once base64 encoded, plus form encoding.
pub const SCREENSHOT_BODY_LIMIT: usize = 8 * 1024 * 1024;

/// Feedback panel display data for templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackPanelView {
    pub open: bool,
    pub status_message: Option<String>,
    pub is_sent: bool,
    pub is_error: bool,
    pub screenshot: Option<String>,
    pub draft: String,
    pub wants_email_updates: bool,
}

impl FeedbackPanelView {
    fn new(panel: &FeedbackPanel, now: DateTime<Utc>) -> Self {
        let is_sent = panel.is_cooling_down(now);
        Self {
            open: panel.open,
            status_message: panel.status_message.clone(),
            is_sent,
            is_error: panel.status_message.is_some() && !is_sent,
            screenshot: panel.screenshot.as_ref().map(|s| s.data_url().to_string()),
            draft: String::new(),
            wants_email_updates: false,
        }
    }

    /// Keep what the visitor typed when the submission did not go through.
    fn with_draft(mut self, text: String, wants_email_updates: bool) -> Self {
        if !self.is_sent {
            self.draft = text;
            self.wants_email_updates = wants_email_updates;
        }
        self
    }
}

impl From<&FeedbackPanel> for FeedbackPanelView {
    fn from(panel: &FeedbackPanel) -> Self {
        Self::new(panel, Utc::now())
    }
}

/// Feedback form data.
#[derive(Deserialize)]
pub struct FeedbackForm {
    #[serde(default)]
    pub text: String,
    /// Checkbox; present (as `on`) when ticked.
    pub email_updates: Option<String>,
}

/// Screenshot upload form data.
#[derive(Deserialize)]
pub struct ScreenshotForm {
    /// PNG data URL, absent when capture failed in the browser.
    pub image: Option<String>,
}

/// Panel fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/feedback_panel.html")]
pub struct FeedbackPanelTemplate {
    pub panel: FeedbackPanelView,
}

/// Screenshot preview fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/feedback_screenshot.html")]
pub struct FeedbackScreenshotTemplate {
    pub panel: FeedbackPanelView,
}

async fn load_panel(visitor: &Visitor) -> Result<FeedbackPanel> {
    visitor.load(session_keys::FEEDBACK_PANEL).await
}

async fn save_panel(visitor: &Visitor, panel: &FeedbackPanel) -> Result<()> {
    visitor.save(session_keys::FEEDBACK_PANEL, panel).await
}

/// Open the panel (HTMX).
///
/// Also polled once the "sent" cooldown is over to return the panel to its
/// ready state.
#[instrument(skip(visitor))]
pub async fn open(visitor: Visitor) -> Result<impl IntoResponse> {
    let mut panel = load_panel(&visitor).await?;
    FeedbackController::open(&mut panel);
    save_panel(&visitor, &panel).await?;

    Ok(FeedbackPanelTemplate {
        panel: FeedbackPanelView::from(&panel),
    })
}

/// Submit feedback (HTMX).
#[instrument(skip(state, visitor, form))]
pub async fn submit(
    State(state): State<AppState>,
    visitor: Visitor,
    Form(form): Form<FeedbackForm>,
) -> Result<impl IntoResponse> {
    let wants_email_updates = form.email_updates.is_some();
    let mut panel = load_panel(&visitor).await?;
    panel.open = true;

    let outcome = state
        .feedback(visitor.identity.clone())
        .submit(&mut panel, &form.text, wants_email_updates)
        .await;

    save_panel(&visitor, &panel).await?;
    // An anonymous sign-in may have happened on the way.
    visitor.save_sign_in().await?;

    if outcome == FeedbackOutcome::Sent {
        add_breadcrumb("feedback", "Sent feedback", None);
    }

    Ok(FeedbackPanelTemplate {
        panel: FeedbackPanelView::from(&panel).with_draft(form.text, wants_email_updates),
    })
}

/// Attach a captured screenshot (HTMX).
#[instrument(skip(visitor, form))]
pub async fn attach_screenshot(
    visitor: Visitor,
    Form(form): Form<ScreenshotForm>,
) -> Result<impl IntoResponse> {
    let mut panel = load_panel(&visitor).await?;
    FeedbackController::attach_screenshot(&mut panel, form.image.as_deref());
    save_panel(&visitor, &panel).await?;

    Ok(FeedbackScreenshotTemplate {
        panel: FeedbackPanelView::from(&panel),
    })
}

/// Remove the attached screenshot (HTMX).
#[instrument(skip(visitor))]
pub async fn clear_screenshot(visitor: Visitor) -> Result<impl IntoResponse> {
    let mut panel = load_panel(&visitor).await?;
    FeedbackController::clear_screenshot(&mut panel);
    save_panel(&visitor, &panel).await?;

    Ok(FeedbackScreenshotTemplate {
        panel: FeedbackPanelView::from(&panel),
    })
}

/// Close the panel after a click outside it (HTMX).
#[instrument(skip(visitor))]
pub async fn dismiss(visitor: Visitor) -> Result<impl IntoResponse> {
    let mut panel = load_panel(&visitor).await?;
    FeedbackController::dismiss(&mut panel);
    save_panel(&visitor, &panel).await?;

    Ok(FeedbackPanelTemplate {
        panel: FeedbackPanelView::from(&panel),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::feedback::{MISSING_TEXT_MESSAGE, SENT_MESSAGE};
    use chrono::TimeDelta;

    #[test]
    fn test_view_sent_state() {
        let now = Utc::now();
        let panel = FeedbackPanel {
            open: true,
            screenshot: None,
            status_message: Some(SENT_MESSAGE.to_string()),
            sent_until: Some(now + TimeDelta::seconds(3)),
        };
        let view = FeedbackPanelView::new(&panel, now).with_draft("hello".to_string(), true);
        assert!(view.is_sent);
        assert!(!view.is_error);
        assert!(view.draft.is_empty());
    }

    #[test]
    fn test_view_keeps_draft_on_error() {
        let panel = FeedbackPanel {
            open: true,
            status_message: Some(MISSING_TEXT_MESSAGE.to_string()),
            ..FeedbackPanel::default()
        };
        let view = FeedbackPanelView::from(&panel).with_draft("   ".to_string(), true);
        assert!(view.is_error);
        assert_eq!(view.draft, "   ");
        assert!(view.wants_email_updates);
    }

    #[test]
    fn test_closed_panel_renders_empty_container() {
        let html = FeedbackPanelTemplate {
            panel: FeedbackPanelView::default(),
        }
        .render()
        .unwrap();
        assert!(html.contains("id=\"feedback-panel\""));
        assert!(!html.contains("<textarea"));
    }

    #[test]
    fn test_sent_panel_polls_for_reset() {
        let now = Utc::now();
        let panel = FeedbackPanel {
            open: true,
            screenshot: None,
            status_message: Some(SENT_MESSAGE.to_string()),
            sent_until: Some(now + TimeDelta::seconds(3)),
        };
        let html = FeedbackPanelTemplate {
            panel: FeedbackPanelView::new(&panel, now),
        }
        .render()
        .unwrap();
        assert!(html.contains(SENT_MESSAGE));
        assert!(html.contains("load delay:3s"));
    }
}

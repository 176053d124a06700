//! Feedback side panel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use axon_core::{AuthIdentity, FeedbackText, Screenshot};

use super::identity::{AuthError, IdentityProvider};
use super::record_store::{RecordStore, collections};

/// Seconds the panel stays in the "sent" state after a submission.
pub const SENT_COOLDOWN_SECS: i64 = 3;

pub const MISSING_TEXT_MESSAGE: &str = "Please describe your feedback.";
pub const SENT_MESSAGE: &str = "Thanks! Your feedback was sent.";
pub const AUTH_UNAVAILABLE_MESSAGE: &str =
    "We couldn't start a session to send your feedback. Please try again later.";
pub const UNKNOWN_ERROR_MESSAGE: &str = "Oops! Something went wrong.";

/// Per-visitor panel state.
///
/// The screenshot lives here only; it is never sent to the record store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPanel {
    pub open: bool,
    pub screenshot: Option<Screenshot>,
    pub status_message: Option<String>,
    pub sent_until: Option<DateTime<Utc>>,
}

impl FeedbackPanel {
    /// Whether a recent submission still blocks re-submission at `now`.
    #[must_use]
    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.sent_until.is_some_and(|until| now < until)
    }

    /// Drop an expired "sent" state so the panel is ready again.
    pub fn settle(&mut self, now: DateTime<Utc>) {
        if self.sent_until.is_some() && !self.is_cooling_down(now) {
            self.sent_until = None;
            self.status_message = None;
        }
    }

    fn show(&mut self, message: &str) {
        self.status_message = Some(message.to_string());
    }
}

/// Result of one feedback submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// Written to the store; the panel is cooling down.
    Sent,
    /// Nothing but whitespace was entered (or far too much).
    MissingText,
    /// A previous submission is still inside its cooldown.
    CoolingDown,
    /// No identity could be established.
    AuthUnavailable,
    /// The write failed or timed out.
    Unknown,
}

/// Drives [`FeedbackPanel`].
#[derive(Clone)]
pub struct FeedbackController {
    store: Arc<dyn RecordStore>,
    provider: Arc<dyn IdentityProvider>,
    timeout: Duration,
}

impl FeedbackController {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn IdentityProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            timeout,
        }
    }

    /// Open the panel.
    pub fn open(panel: &mut FeedbackPanel) {
        panel.settle(Utc::now());
        panel.open = true;
    }

    /// Close the panel (click outside). Also clears the screenshot.
    pub fn dismiss(panel: &mut FeedbackPanel) {
        panel.open = false;
        panel.screenshot = None;
        panel.status_message = None;
    }

    /// Attach a captured page image.
    ///
    /// Anything that does not decode as a PNG data URL leaves the panel with
    /// no image attached.
    pub fn attach_screenshot(panel: &mut FeedbackPanel, data_url: Option<&str>) {
        panel.screenshot = match data_url.map(Screenshot::from_data_url) {
            Some(Ok(screenshot)) => Some(screenshot),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Discarding screenshot");
                None
            }
            None => None,
        };
    }

    pub fn clear_screenshot(panel: &mut FeedbackPanel) {
        panel.screenshot = None;
    }

    /// Submit feedback.
    ///
    /// Signs in anonymously first when nobody is signed in.
    #[instrument(skip(self, panel, text))]
    pub async fn submit(
        &self,
        panel: &mut FeedbackPanel,
        text: &str,
        wants_email_updates: bool,
    ) -> FeedbackOutcome {
        let now = Utc::now();
        if panel.is_cooling_down(now) {
            return FeedbackOutcome::CoolingDown;
        }
        panel.settle(now);

        let Ok(text) = FeedbackText::parse(text) else {
            panel.show(MISSING_TEXT_MESSAGE);
            return FeedbackOutcome::MissingText;
        };

        let identity = match self.ensure_identity().await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "Anonymous sign-in failed");
                panel.show(AUTH_UNAVAILABLE_MESSAGE);
                return FeedbackOutcome::AuthUnavailable;
            }
        };

        let fields = serde_json::json!({
            "text": text.as_str(),
            "emailUpdates": wants_email_updates,
            "userId": identity.uid,
        });

        match tokio::time::timeout(
            self.timeout,
            self.store.create(collections::FEEDBACK, fields),
        )
        .await
        {
            Ok(Ok(record)) => {
                tracing::info!(record_id = %record.id, uid = %identity.uid, "Feedback sent");
                panel.show(SENT_MESSAGE);
                panel.sent_until = Some(Utc::now() + TimeDelta::seconds(SENT_COOLDOWN_SECS));
                panel.screenshot = None;
                FeedbackOutcome::Sent
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Failed to save feedback");
                panel.show(UNKNOWN_ERROR_MESSAGE);
                FeedbackOutcome::Unknown
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Saving feedback timed out");
                panel.show(UNKNOWN_ERROR_MESSAGE);
                FeedbackOutcome::Unknown
            }
        }
    }

    async fn ensure_identity(&self) -> Result<AuthIdentity, AuthError> {
        if let Some(identity) = self.provider.subscribe_auth_state().current().identity() {
            return Ok(identity.clone());
        }
        tokio::time::timeout(self.timeout, self.provider.sign_in_anonymous())
            .await
            .unwrap_or(Err(AuthError::Timeout))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::RecordStoreError;
    use crate::services::testing::{MemoryIdentityProvider, MemoryRecordStore, google_identity};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    fn controller(
        store: &Arc<MemoryRecordStore>,
        provider: &Arc<MemoryIdentityProvider>,
    ) -> FeedbackController {
        FeedbackController::new(store.clone(), provider.clone(), Duration::from_secs(1))
    }

    fn png_data_url() -> String {
        let bytes = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    #[tokio::test]
    async fn test_blank_text_is_missing() {
        let store = Arc::new(MemoryRecordStore::new());
        let provider = Arc::new(MemoryIdentityProvider::signed_out());
        let mut panel = FeedbackPanel::default();

        let outcome = controller(&store, &provider)
            .submit(&mut panel, "   \n\t", false)
            .await;

        assert_eq!(outcome, FeedbackOutcome::MissingText);
        assert_eq!(panel.status_message.as_deref(), Some(MISSING_TEXT_MESSAGE));
        assert_eq!(store.create_calls(), 0);
        assert_eq!(provider.anonymous_calls(), 0);
    }

    #[tokio::test]
    async fn test_signed_in_visitor_writes_feedback() {
        let store = Arc::new(MemoryRecordStore::new());
        let provider = Arc::new(MemoryIdentityProvider::signed_in(google_identity()));
        let mut panel = FeedbackPanel::default();

        let outcome = controller(&store, &provider)
            .submit(&mut panel, "  Love the video!  ", true)
            .await;

        assert_eq!(outcome, FeedbackOutcome::Sent);
        assert_eq!(provider.anonymous_calls(), 0);

        let records = store.records("feedback");
        assert_eq!(records.len(), 1);
        let fields = &records[0].fields;
        assert_eq!(fields.get("text"), Some(&serde_json::json!("Love the video!")));
        assert_eq!(fields.get("emailUpdates"), Some(&serde_json::json!(true)));
        assert_eq!(fields.get("userId"), Some(&serde_json::json!("google-uid")));
        assert!(!fields.contains_key("createdAt"));
    }

    #[tokio::test]
    async fn test_long_feedback_is_sent() {
        let store = Arc::new(MemoryRecordStore::new());
        let provider = Arc::new(MemoryIdentityProvider::signed_in(google_identity()));
        let mut panel = FeedbackPanel::default();
        let long = "x".repeat(5001);

        let outcome = controller(&store, &provider)
            .submit(&mut panel, &long, false)
            .await;

        assert_eq!(outcome, FeedbackOutcome::Sent);
        assert_eq!(store.create_calls(), 1);
        let records = store.records("feedback");
        assert_eq!(records[0].fields.get("text"), Some(&serde_json::json!(long)));
    }

    #[tokio::test]
    async fn test_anonymous_sign_in_when_signed_out() {
        let store = Arc::new(MemoryRecordStore::new());
        let provider = Arc::new(MemoryIdentityProvider::signed_out());
        let mut panel = FeedbackPanel::default();

        let outcome = controller(&store, &provider)
            .submit(&mut panel, "Hello", false)
            .await;

        assert_eq!(outcome, FeedbackOutcome::Sent);
        assert_eq!(provider.anonymous_calls(), 1);
        assert_eq!(
            store.records("feedback")[0].fields.get("userId"),
            Some(&serde_json::json!("anon-0"))
        );
    }

    #[tokio::test]
    async fn test_anonymous_failure_aborts_write() {
        let store = Arc::new(MemoryRecordStore::new());
        let provider = Arc::new(MemoryIdentityProvider::signed_out().with_failing_anonymous());
        let mut panel = FeedbackPanel::default();

        let outcome = controller(&store, &provider)
            .submit(&mut panel, "Hello", false)
            .await;

        assert_eq!(outcome, FeedbackOutcome::AuthUnavailable);
        assert_eq!(
            panel.status_message.as_deref(),
            Some(AUTH_UNAVAILABLE_MESSAGE)
        );
        assert_eq!(store.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_cooldown_blocks_then_clears() {
        let store = Arc::new(MemoryRecordStore::new());
        let provider = Arc::new(MemoryIdentityProvider::signed_in(google_identity()));
        let feedback = controller(&store, &provider);
        let mut panel = FeedbackPanel {
            open: true,
            ..FeedbackPanel::default()
        };

        assert_eq!(
            feedback.submit(&mut panel, "first", false).await,
            FeedbackOutcome::Sent
        );
        assert_eq!(
            feedback.submit(&mut panel, "second", false).await,
            FeedbackOutcome::CoolingDown
        );
        assert_eq!(store.create_calls(), 1);

        // Let the cooldown lapse.
        panel.sent_until = Some(Utc::now() - TimeDelta::milliseconds(1));
        assert_eq!(
            feedback.submit(&mut panel, "second", false).await,
            FeedbackOutcome::Sent
        );
        assert_eq!(store.create_calls(), 2);
        assert!(panel.open);
    }

    #[test]
    fn test_settle_returns_to_ready() {
        let now = Utc::now();
        let mut panel = FeedbackPanel {
            open: true,
            status_message: Some(SENT_MESSAGE.to_string()),
            sent_until: Some(now + TimeDelta::seconds(SENT_COOLDOWN_SECS)),
            ..FeedbackPanel::default()
        };

        panel.settle(now);
        assert!(panel.is_cooling_down(now));

        let later = now + TimeDelta::seconds(SENT_COOLDOWN_SECS);
        panel.settle(later);
        assert!(!panel.is_cooling_down(later));
        assert!(panel.status_message.is_none());
        assert!(panel.open);
    }

    #[tokio::test]
    async fn test_store_failure_is_unknown() {
        let store = Arc::new(MemoryRecordStore::new());
        store.fail_next(RecordStoreError::Parse("boom".to_string()));
        let provider = Arc::new(MemoryIdentityProvider::signed_in(google_identity()));
        let mut panel = FeedbackPanel::default();

        let outcome = controller(&store, &provider)
            .submit(&mut panel, "Hello", false)
            .await;
        assert_eq!(outcome, FeedbackOutcome::Unknown);
        assert!(panel.sent_until.is_none());
    }

    #[tokio::test]
    async fn test_screenshot_is_never_stored() {
        let store = Arc::new(MemoryRecordStore::new());
        let provider = Arc::new(MemoryIdentityProvider::signed_in(google_identity()));
        let mut panel = FeedbackPanel::default();
        FeedbackController::attach_screenshot(&mut panel, Some(&png_data_url()));
        assert!(panel.screenshot.is_some());

        controller(&store, &provider)
            .submit(&mut panel, "See attached", false)
            .await;

        let fields = &store.records("feedback")[0].fields;
        assert_eq!(fields.len(), 3);
        assert!(panel.screenshot.is_none());
    }

    #[test]
    fn test_bad_screenshot_degrades_to_none() {
        let mut panel = FeedbackPanel::default();
        FeedbackController::attach_screenshot(&mut panel, Some(&png_data_url()));
        FeedbackController::attach_screenshot(&mut panel, Some("data:image/png;base64,%%%"));
        assert!(panel.screenshot.is_none());

        FeedbackController::attach_screenshot(&mut panel, None);
        assert!(panel.screenshot.is_none());
    }

    #[test]
    fn test_dismiss_clears_screenshot() {
        let mut panel = FeedbackPanel::default();
        FeedbackController::open(&mut panel);
        FeedbackController::attach_screenshot(&mut panel, Some(&png_data_url()));

        FeedbackController::dismiss(&mut panel);
        assert!(!panel.open);
        assert!(panel.screenshot.is_none());

        FeedbackController::open(&mut panel);
        FeedbackController::attach_screenshot(&mut panel, Some(&png_data_url()));
        FeedbackController::clear_screenshot(&mut panel);
        assert!(panel.open);
        assert!(panel.screenshot.is_none());
    }
}

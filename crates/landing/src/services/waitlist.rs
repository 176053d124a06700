//! Waitlist submission workflow.
//!
//! Validates the email locally, creates exactly one `waitlist` record per
//! valid submission, and classifies the store's answer:
//!
//! ```text
//! Idle -> Validating -> Invalid                       (-> Idle on edit)
//!                    -> Submitting -> Subscribed      (terminal)
//!                                  -> ErrorShown      (-> Idle on edit)
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use axon_core::Email;

use super::record_store::{RecordStore, RecordStoreError, collections};

/// Shown when the input is not `local@domain.tld` shaped.
pub const INVALID_EMAIL_MESSAGE: &str = "Please enter a valid email address.";
/// Shown when the store reports the email already exists.
pub const ALREADY_REGISTERED_MESSAGE: &str = "This email is already registered.";
/// Shown for every other failure.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Oops! Something went wrong.";
/// Shown once subscribed.
pub const SUBSCRIBED_MESSAGE: &str = "Thanks for your interest! We'll keep you updated.";

/// Parameters of the celebratory confetti burst.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfettiBurst {
    pub particle_count: u32,
    pub spread: u32,
    pub origin_y: f32,
}

impl Default for ConfettiBurst {
    fn default() -> Self {
        Self {
            particle_count: 120,
            spread: 70,
            origin_y: 0.6,
        }
    }
}

/// Decorative side effect fired once per successful submission.
pub trait Celebration: Send + Sync {
    fn fire(&self, burst: &ConfettiBurst);
}

/// Celebration that remembers the burst so the HTTP layer can forward it
/// to the browser.
#[derive(Debug, Default)]
pub struct RecordedCelebration {
    fired: Mutex<Vec<ConfettiBurst>>,
}

impl RecordedCelebration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bursts fired so far.
    #[must_use]
    pub fn fired(&self) -> Vec<ConfettiBurst> {
        self.fired
            .lock()
            .map(|fired| fired.clone())
            .unwrap_or_default()
    }
}

impl Celebration for RecordedCelebration {
    fn fire(&self, burst: &ConfettiBurst) {
        if let Ok(mut fired) = self.fired.lock() {
            fired.push(*burst);
        }
    }
}

/// Per-visitor form state.
///
/// `is_subscribed` implies `status_message` is [`SUBSCRIBED_MESSAGE`] and
/// `email_input` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionState {
    pub email_input: String,
    pub status_message: Option<String>,
    pub is_submitting: bool,
    pub is_subscribed: bool,
}

/// Where the form is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Idle,
    Invalid,
    Submitting,
    Subscribed,
    ErrorShown,
}

impl SubmissionState {
    #[must_use]
    pub fn phase(&self) -> SubmissionPhase {
        if self.is_subscribed {
            SubmissionPhase::Subscribed
        } else if self.is_submitting {
            SubmissionPhase::Submitting
        } else {
            match self.status_message.as_deref() {
                None => SubmissionPhase::Idle,
                Some(INVALID_EMAIL_MESSAGE) => SubmissionPhase::Invalid,
                Some(_) => SubmissionPhase::ErrorShown,
            }
        }
    }

    fn show(&mut self, message: &str) {
        self.status_message = Some(message.to_string());
    }
}

/// Result of one `submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Created, or already subscribed earlier in this session.
    Subscribed,
    /// Rejected locally; the store was not contacted.
    InvalidFormat,
    /// The store reported a uniqueness violation on `email`.
    AlreadyRegistered,
    /// Any other store, network, or timeout failure.
    Unknown,
}

impl SubmissionOutcome {
    /// Message shown next to the form.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Subscribed => SUBSCRIBED_MESSAGE,
            Self::InvalidFormat => INVALID_EMAIL_MESSAGE,
            Self::AlreadyRegistered => ALREADY_REGISTERED_MESSAGE,
            Self::Unknown => UNKNOWN_ERROR_MESSAGE,
        }
    }
}

/// Drives [`SubmissionState`] against the record store.
#[derive(Clone)]
pub struct WaitlistController {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl WaitlistController {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Submit `email_raw` to the waitlist.
    ///
    /// Never retries. Once subscribed, returns `Subscribed` without touching
    /// the store.
    #[instrument(skip(self, state, celebration), fields(email = %email_raw))]
    pub async fn submit(
        &self,
        state: &mut SubmissionState,
        email_raw: &str,
        celebration: &dyn Celebration,
    ) -> SubmissionOutcome {
        if state.is_subscribed {
            return SubmissionOutcome::Subscribed;
        }

        state.email_input = email_raw.to_string();
        state.status_message = None;

        if Email::parse(email_raw).is_err() {
            state.show(INVALID_EMAIL_MESSAGE);
            return SubmissionOutcome::InvalidFormat;
        }

        state.is_submitting = true;
        let result = tokio::time::timeout(
            self.timeout,
            self.store.create(
                collections::WAITLIST,
                serde_json::json!({ "email": email_raw }),
            ),
        )
        .await;
        state.is_submitting = false;

        let outcome = match result {
            Ok(Ok(record)) => {
                tracing::info!(record_id = %record.id, "Waitlist signup");
                state.is_subscribed = true;
                state.email_input.clear();
                celebration.fire(&ConfettiBurst::default());
                SubmissionOutcome::Subscribed
            }
            Ok(Err(e)) => classify(&e),
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Waitlist signup timed out");
                SubmissionOutcome::Unknown
            }
        };

        state.show(outcome.message());
        outcome
    }

    /// The visitor edited the input; any shown message is cleared.
    pub fn edit(state: &mut SubmissionState, email_input: &str) {
        if state.is_subscribed {
            return;
        }
        state.email_input = email_input.to_string();
        state.status_message = None;
    }
}

fn classify(error: &RecordStoreError) -> SubmissionOutcome {
    if error.is_unique_violation("email") {
        tracing::info!("Waitlist email already registered");
        SubmissionOutcome::AlreadyRegistered
    } else {
        tracing::error!(error = %error, "Waitlist signup failed");
        SubmissionOutcome::Unknown
    }
}

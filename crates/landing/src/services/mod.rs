//! Landing page services.
//!
//! # Seams
//!
//! - `record_store` - `RecordStore` trait implemented by `PocketBaseClient`
//! - `identity` - `IdentityProvider` trait implemented by `FirebaseAuth`
//!
//! # Controllers
//!
//! - `waitlist` - Email signup with duplicate detection
//! - `session` - "Continue" button: sign-in or deep link
//! - `feedback` - Feedback side panel

pub mod feedback;
pub mod identity;
pub mod record_store;
pub mod session;
pub mod waitlist;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use feedback::{FeedbackController, FeedbackOutcome, FeedbackPanel};
pub use identity::{
    ACCESS_DENIED, AuthError, AuthState, AuthStateHub, AuthStateListener, IdToken,
    IdentityProvider, InteractiveGrant, PersistedUser,
};
pub use record_store::{Record, RecordStore, RecordStoreError, collections};
pub use session::{ContinueAction, SessionController, SessionView, SignInResult};
pub use waitlist::{
    Celebration, ConfettiBurst, RecordedCelebration, SubmissionOutcome, SubmissionPhase,
    SubmissionState, WaitlistController,
};

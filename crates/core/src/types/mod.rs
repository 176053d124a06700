//! Core types for the Axon landing page.
//!
//! This module provides type-safe wrappers for the values that cross the
//! form boundary.

pub mod email;
pub mod feedback;
pub mod identity;

pub use email::{Email, EmailError};
pub use feedback::{FeedbackText, FeedbackTextError, Screenshot, ScreenshotError};
pub use identity::AuthIdentity;

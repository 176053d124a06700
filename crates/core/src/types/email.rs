//! Email address type.

use core::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `local@domain.tld` with no whitespace and no stray `@` in any part.
static EMAIL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // literal pattern
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap()
});

/// Errors that can occur when parsing an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// The input string is empty.
    #[error("email cannot be empty")]
    Empty,
    /// The input is not shaped like `local@domain.tld`.
    #[error("email must look like local@domain.tld")]
    InvalidFormat,
}

/// An email address as typed into the waitlist form.
///
/// The accepted shape is one or more non-space, non-`@` characters, an `@`,
/// one or more non-space, non-`@` characters, a `.`, and one or more
/// non-space, non-`@` characters. The input is checked as-is: it is neither
/// trimmed nor lowercased, so what the visitor typed is what gets stored.
///
/// ## Examples
///
/// ```
/// use axon_core::Email;
///
/// assert!(Email::parse("user@example.com").is_ok());
/// assert!(Email::parse("user.name+tag@domain.co.uk").is_ok());
///
/// assert!(Email::parse("").is_err());              // empty
/// assert!(Email::parse("not-an-email").is_err());  // missing @
/// assert!(Email::parse("user@localhost").is_err()); // no dot after @
/// assert!(Email::parse("us er@example.com").is_err()); // whitespace
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Parse an `Email` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or not shaped like
    /// `local@domain.tld`.
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        if s.is_empty() {
            return Err(EmailError::Empty);
        }

        if !EMAIL_SHAPE.is_match(s) {
            return Err(EmailError::InvalidFormat);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

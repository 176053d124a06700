//! Authenticated identity types.

use serde::{Deserialize, Serialize};

/// Identity returned by the identity provider after sign-in.
///
/// Anonymous identities carry only a `uid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdentity {
    /// Provider-assigned user ID.
    pub uid: String,
    /// Display name from the federated account, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Email address from the federated account, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Avatar URL from the federated account, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Whether this identity came from an anonymous sign-in.
    #[serde(default)]
    pub is_anonymous: bool,
}

impl AuthIdentity {
    /// Create an anonymous identity.
    #[must_use]
    pub fn anonymous(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
            is_anonymous: true,
        }
    }

    /// Name to greet the visitor with.
    ///
    /// Falls back to the email address, then to a generic label.
    #[must_use]
    pub fn greeting_name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("there")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_has_no_profile() {
        let identity = AuthIdentity::anonymous("anon-1");
        assert!(identity.is_anonymous);
        assert!(identity.email.is_none());
        assert_eq!(identity.greeting_name(), "there");
    }

    #[test]
    fn test_greeting_name_prefers_display_name() {
        let identity = AuthIdentity {
            uid: "u1".to_string(),
            display_name: Some("Ada".to_string()),
            email: Some("ada@example.com".to_string()),
            photo_url: None,
            is_anonymous: false,
        };
        assert_eq!(identity.greeting_name(), "Ada");

        let identity = AuthIdentity {
            display_name: None,
            ..identity
        };
        assert_eq!(identity.greeting_name(), "ada@example.com");
    }
}

//! Google OAuth and Firebase Auth REST wire types.

use serde::{Deserialize, Serialize};

use axon_core::AuthIdentity;

/// Google token endpoint response (authorization-code exchange).
#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub id_token: String,
}

/// `accounts:signInWithIdp` request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInWithIdpRequest<'a> {
    pub post_body: String,
    pub request_uri: &'a str,
    pub return_idp_credential: bool,
    pub return_secure_token: bool,
}

/// `accounts:signUp` request body (anonymous when no credentials are sent).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub return_secure_token: bool,
}

/// Response shared by `signInWithIdp` and `signUp`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub local_id: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Seconds, sent as a string.
    pub expires_in: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl SignInResponse {
    /// Identity described by this response.
    pub fn identity(&self, is_anonymous: bool) -> AuthIdentity {
        AuthIdentity {
            uid: self.local_id.clone(),
            display_name: self.display_name.clone(),
            email: self.email.clone(),
            photo_url: self.photo_url.clone(),
            is_anonymous,
        }
    }
}

/// Secure Token refresh response.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub id_token: String,
    pub refresh_token: String,
    /// Seconds, sent as a string.
    pub expires_in: String,
}

/// Firebase error envelope: `{"error": {"code": 400, "message": "..."}}`.
#[derive(Debug, Deserialize)]
pub struct FirebaseErrorResponse {
    pub error: FirebaseError,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseError {
    pub code: u16,
    pub message: String,
}

/// Google OAuth error: `{"error": "invalid_grant", "error_description": "..."}`.
#[derive(Debug, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

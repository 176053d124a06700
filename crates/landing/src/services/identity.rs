//! Remote identity provider seam.
//!
//! The provider owns the visitor's auth state and publishes every change on a
//! `tokio::sync::watch` channel. Consumers hold an [`AuthStateListener`], a
//! scoped handle that stops observing when dropped.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use axon_core::AuthIdentity;

/// OAuth error code sent back when the visitor closes or cancels the consent screen.
pub const ACCESS_DENIED: &str = "access_denied";

/// Errors that can occur during identity provider operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The visitor dismissed the interactive sign-in.
    #[error("sign-in dismissed by user")]
    Dismissed,

    /// The provider returned an error response.
    #[error("identity provider error: {code} - {message}")]
    Provider { code: String, message: String },

    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A token was requested for an identity that is not signed in.
    #[error("no signed-in user")]
    NoCurrentUser,

    /// The call did not complete within the configured timeout.
    #[error("identity provider call timed out")]
    Timeout,

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl AuthError {
    /// Whether this error means the visitor backed out of sign-in.
    #[must_use]
    pub const fn is_dismissal(&self) -> bool {
        matches!(self, Self::Dismissed)
    }
}

/// Result of the interactive sign-in redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractiveGrant {
    /// The provider issued an authorization code.
    Code { code: String, redirect_uri: String },
    /// The provider redirected back with an error.
    Error {
        error: String,
        description: Option<String>,
    },
}

/// Bearer token issued by the identity provider.
#[derive(Clone)]
pub struct IdToken(SecretString);

impl IdToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Expose the raw token for attaching to a request or URL.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for IdToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdToken([REDACTED])")
    }
}

/// Signed-in user as kept in the visitor session between requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedUser {
    pub identity: AuthIdentity,
    pub refresh_token: String,
}

/// Current auth state of one visitor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Not yet determined (persisted sign-in not restored yet).
    #[default]
    Unknown,
    /// Determined: nobody is signed in.
    SignedOut,
    /// Determined: this identity is signed in.
    SignedIn(AuthIdentity),
}

impl AuthState {
    /// The determined identity, or `None` while still unknown.
    #[must_use]
    pub fn known(&self) -> Option<Option<&AuthIdentity>> {
        match self {
            Self::Unknown => None,
            Self::SignedOut => Some(None),
            Self::SignedIn(identity) => Some(Some(identity)),
        }
    }

    /// The signed-in identity, if any.
    #[must_use]
    pub const fn identity(&self) -> Option<&AuthIdentity> {
        match self {
            Self::SignedIn(identity) => Some(identity),
            Self::Unknown | Self::SignedOut => None,
        }
    }
}

impl From<Option<AuthIdentity>> for AuthState {
    fn from(identity: Option<AuthIdentity>) -> Self {
        identity.map_or(Self::SignedOut, Self::SignedIn)
    }
}

/// Publisher side of the auth-state channel, owned by a provider.
#[derive(Debug)]
pub struct AuthStateHub {
    tx: watch::Sender<AuthState>,
}

impl Default for AuthStateHub {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStateHub {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::Unknown);
        Self { tx }
    }

    /// Replace the current state and notify listeners.
    pub fn publish(&self, state: AuthState) {
        self.tx.send_replace(state);
    }

    /// Current state without subscribing.
    #[must_use]
    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    /// Start observing auth state.
    #[must_use]
    pub fn subscribe(&self) -> AuthStateListener {
        AuthStateListener {
            rx: self.tx.subscribe(),
            replayed: false,
        }
    }
}

/// Scoped subscription to a provider's auth state.
///
/// The first call to [`next`](Self::next) replays the current state if it is
/// already known; later calls wait for changes. Dropping the listener
/// releases the subscription.
#[derive(Debug)]
pub struct AuthStateListener {
    rx: watch::Receiver<AuthState>,
    replayed: bool,
}

impl AuthStateListener {
    /// Current state, known or not.
    #[must_use]
    pub fn current(&self) -> AuthState {
        self.rx.borrow().clone()
    }

    /// Wait for the next determined auth state.
    ///
    /// Returns `None` once the provider has gone away.
    pub async fn next(&mut self) -> Option<Option<AuthIdentity>> {
        if !self.replayed {
            self.replayed = true;
            let state = self.rx.borrow_and_update().clone();
            if let Some(identity) = state.known() {
                return Some(identity.cloned());
            }
        }

        loop {
            self.rx.changed().await.ok()?;
            let state = self.rx.borrow_and_update().clone();
            if let Some(identity) = state.known() {
                return Some(identity.cloned());
            }
        }
    }
}

impl Drop for AuthStateListener {
    fn drop(&mut self) {
        tracing::trace!("auth state listener released");
    }
}

/// Remote identity provider for one visitor.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL that starts interactive sign-in.
    fn authorization_url(&self, redirect_uri: &str, csrf_state: &str) -> String;

    /// Finish interactive sign-in and publish the new identity.
    async fn sign_in_interactive(&self, grant: InteractiveGrant)
    -> Result<AuthIdentity, AuthError>;

    /// Sign in without credentials and publish the anonymous identity.
    async fn sign_in_anonymous(&self) -> Result<AuthIdentity, AuthError>;

    /// Observe auth state, starting with a replay of the current state.
    fn subscribe_auth_state(&self) -> AuthStateListener;

    /// A fresh bearer token for `identity`.
    async fn id_token(&self, identity: &AuthIdentity) -> Result<IdToken, AuthError>;

    /// Clear the signed-in identity.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Resolve an unknown auth state from a sign-in kept in the visitor
    /// session. Does nothing once the state is known.
    async fn restore(&self, persisted: Option<PersistedUser>);

    /// The sign-in to keep in the visitor session, if any.
    async fn persisted(&self) -> Option<PersistedUser>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_replays_known_state() {
        let hub = AuthStateHub::new();
        hub.publish(AuthState::SignedIn(AuthIdentity::anonymous("u1")));

        let mut listener = hub.subscribe();
        let identity = listener.next().await.unwrap().unwrap();
        assert_eq!(identity.uid, "u1");
    }

    #[tokio::test]
    async fn test_listener_skips_unknown_and_waits_for_change() {
        let hub = AuthStateHub::new();
        let mut listener = hub.subscribe();
        assert_eq!(listener.current(), AuthState::Unknown);

        let waiter = tokio::spawn(async move { listener.next().await });
        tokio::task::yield_now().await;
        hub.publish(AuthState::SignedOut);

        assert_eq!(waiter.await.unwrap(), Some(None));
    }

    #[tokio::test]
    async fn test_listener_ends_when_provider_dropped() {
        let hub = AuthStateHub::new();
        let mut listener = hub.subscribe();
        drop(hub);
        assert_eq!(listener.next().await, None);
    }

    #[test]
    fn test_auth_state_from_option() {
        assert_eq!(AuthState::from(None), AuthState::SignedOut);
        let state = AuthState::from(Some(AuthIdentity::anonymous("u2")));
        assert_eq!(state.identity().map(|i| i.uid.as_str()), Some("u2"));
    }

    #[test]
    fn test_id_token_debug_is_redacted() {
        let token = IdToken::new("eyJhbGciOi.secret");
        assert_eq!(format!("{token:?}"), "IdToken([REDACTED])");
        assert_eq!(token.expose(), "eyJhbGciOi.secret");
    }
}

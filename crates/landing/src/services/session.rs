//! "Continue" button session flow.
//!
//! The controller follows the visitor's auth state through one
//! [`AuthStateListener`] and offers either interactive sign-in or a deep link
//! into the product carrying a fresh ID token.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;
use url::Url;

use axon_core::AuthIdentity;

use super::identity::{AuthError, AuthStateListener, IdentityProvider, InteractiveGrant};
use super::record_store::{RecordStore, RecordStoreError, collections};

/// Shown when sign-in fails for any reason other than the visitor backing out.
pub const SIGN_IN_FAILED_MESSAGE: &str = "Sign-in failed. Please try again.";

/// What the "Continue" button renders as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionView {
    /// Auth state not known yet.
    Loading,
    /// Offer sign-in.
    Unauthenticated,
    /// Offer to continue as this identity.
    Authenticated(AuthIdentity),
}

impl From<Option<AuthIdentity>> for SessionView {
    fn from(identity: Option<AuthIdentity>) -> Self {
        identity.map_or(Self::Unauthenticated, Self::Authenticated)
    }
}

/// What pressing "Continue" does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinueAction {
    /// Deep-link into the product.
    Redirect(Url),
    /// Start interactive sign-in first.
    SignIn,
}

/// How an interactive sign-in attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInResult {
    /// Signed in; deep-link into the product.
    Redirect(Url),
    /// The visitor backed out. Nothing is shown.
    Dismissed,
    /// Sign-in failed; show this message.
    Failed(&'static str),
}

/// Session controller for one visitor.
pub struct SessionController {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn RecordStore>,
    destination: Url,
    timeout: Duration,
    listener: AuthStateListener,
    view: SessionView,
}

impl SessionController {
    /// Subscribe to `provider`'s auth state.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn RecordStore>,
        destination: Url,
        timeout: Duration,
    ) -> Self {
        let listener = provider.subscribe_auth_state();
        let view = listener
            .current()
            .known()
            .map_or(SessionView::Loading, |identity| identity.cloned().into());
        Self {
            provider,
            store,
            destination,
            timeout,
            listener,
            view,
        }
    }

    #[must_use]
    pub const fn view(&self) -> &SessionView {
        &self.view
    }

    /// Wait for the next determined auth state and update the view.
    ///
    /// The first call replays the current state if it is already known.
    /// Stays `Loading` if nothing arrives within the timeout.
    pub async fn refresh(&mut self) -> &SessionView {
        match tokio::time::timeout(self.timeout, self.listener.next()).await {
            Ok(Some(identity)) => self.view = identity.into(),
            Ok(None) => tracing::debug!("Identity provider went away"),
            Err(_) => tracing::debug!("Auth state still unknown"),
        }
        &self.view
    }

    /// URL that starts interactive sign-in.
    #[must_use]
    pub fn sign_in_url(&self, redirect_uri: &str, csrf_state: &str) -> String {
        self.provider.authorization_url(redirect_uri, csrf_state)
    }

    /// Decide what "Continue" does right now.
    ///
    /// A signed-in visitor gets a deep link with a fresh token. If the token
    /// cannot be fetched the visitor is sent through sign-in again.
    #[instrument(skip(self))]
    pub async fn continue_action(&mut self) -> ContinueAction {
        let SessionView::Authenticated(identity) = self.refresh().await.clone() else {
            return ContinueAction::SignIn;
        };

        match self.deep_link_for(&identity).await {
            Ok(url) => ContinueAction::Redirect(url),
            Err(e) => {
                tracing::warn!(error = %e, uid = %identity.uid, "Could not fetch ID token");
                ContinueAction::SignIn
            }
        }
    }

    /// Finish interactive sign-in and deep-link.
    ///
    /// Dismissal is logged only. Any other failure is logged and returns
    /// [`SIGN_IN_FAILED_MESSAGE`]. Either way the view returns to
    /// `Unauthenticated`.
    #[instrument(skip(self, grant))]
    pub async fn complete_sign_in(&mut self, grant: InteractiveGrant) -> SignInResult {
        let signed_in = tokio::time::timeout(self.timeout, self.provider.sign_in_interactive(grant))
            .await
            .unwrap_or(Err(AuthError::Timeout));

        let identity = match signed_in {
            Ok(identity) => identity,
            Err(e) if e.is_dismissal() => {
                tracing::info!("Sign-in dismissed by user");
                self.view = SessionView::Unauthenticated;
                return SignInResult::Dismissed;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in failed");
                self.view = SessionView::Unauthenticated;
                return SignInResult::Failed(SIGN_IN_FAILED_MESSAGE);
            }
        };

        self.view = SessionView::Authenticated(identity.clone());
        self.save_profile(&identity).await;

        match self.deep_link_for(&identity).await {
            Ok(url) => SignInResult::Redirect(url),
            Err(e) => {
                tracing::warn!(error = %e, uid = %identity.uid, "Could not fetch ID token after sign-in");
                SignInResult::Failed(SIGN_IN_FAILED_MESSAGE)
            }
        }
    }

    /// Sign the visitor out. Failures are logged; the view becomes
    /// `Unauthenticated` regardless.
    #[instrument(skip(self))]
    pub async fn sign_out(&mut self) {
        match tokio::time::timeout(self.timeout, self.provider.sign_out()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Sign-out failed"),
            Err(_) => tracing::warn!("Sign-out timed out"),
        }
        self.view = SessionView::Unauthenticated;
    }

    async fn deep_link_for(&self, identity: &AuthIdentity) -> Result<Url, AuthError> {
        let token = tokio::time::timeout(self.timeout, self.provider.id_token(identity))
            .await
            .unwrap_or(Err(AuthError::Timeout))?;
        Ok(deep_link(&self.destination, token.expose()))
    }

    /// Upsert the visitor's profile. Never blocks sign-in.
    async fn save_profile(&self, identity: &AuthIdentity) {
        match tokio::time::timeout(self.timeout, upsert_profile(self.store.as_ref(), identity)).await
        {
            Ok(Ok(())) => tracing::debug!(uid = %identity.uid, "Profile saved"),
            Ok(Err(e)) => tracing::error!(error = %e, uid = %identity.uid, "Failed to save profile"),
            Err(_) => tracing::error!(uid = %identity.uid, "Saving profile timed out"),
        }
    }
}

/// `destination` with `?token=<token>` attached.
#[must_use]
pub fn deep_link(destination: &Url, token: &str) -> Url {
    let mut url = destination.clone();
    url.query_pairs_mut().append_pair("token", token);
    url
}

async fn upsert_profile(
    store: &dyn RecordStore,
    identity: &AuthIdentity,
) -> Result<(), RecordStoreError> {
    let fields = serde_json::json!({
        "uid": identity.uid,
        "displayName": identity.display_name,
        "email": identity.email,
        "photoURL": identity.photo_url,
        "lastLoginAt": chrono::Utc::now().to_rfc3339(),
    });

    match store
        .find_first(collections::PROFILES, "uid", &identity.uid)
        .await?
    {
        Some(existing) => {
            store
                .update(collections::PROFILES, &existing.id, fields)
                .await?;
        }
        None => {
            store.create(collections::PROFILES, fields).await?;
        }
    }
    Ok(())
}

//! Google sign-in federated into Firebase Authentication.
//!
//! # Sign-in Flow
//!
//! 1. Redirect the visitor to `authorization_url()` (Google consent screen,
//!    `prompt=select_account`)
//! 2. Google redirects back with an authorization code, or with
//!    `error=access_denied` if the visitor backed out
//! 3. Exchange the code for a Google ID token
//! 4. Exchange the Google ID token for a Firebase session via
//!    `accounts:signInWithIdp`
//! 5. Hand out Firebase ID tokens, refreshing through Secure Token when stale
//!
//! [`FirebaseAuthClient`] is the shared HTTP client. Each visitor gets a
//! [`FirebaseAuth`] with its own auth state, created by
//! [`FirebaseAuthClient::visitor`].

mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use url::Url;

use axon_core::AuthIdentity;

use crate::config::IdentityConfig;
use crate::services::{
    ACCESS_DENIED, AuthError, AuthState, AuthStateHub, AuthStateListener, IdToken,
    IdentityProvider, InteractiveGrant, PersistedUser,
};

use types::{
    FirebaseErrorResponse, GoogleTokenResponse, OAuthErrorResponse, RefreshResponse,
    SignInResponse, SignInWithIdpRequest, SignUpRequest,
};

/// Refresh ID tokens this long before they actually expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Shared Google + Firebase HTTP client.
#[derive(Clone)]
pub struct FirebaseAuthClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    config: IdentityConfig,
}

impl FirebaseAuthClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &IdentityConfig, timeout: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                config: config.clone(),
            }),
        })
    }

    /// Create a per-visitor provider whose auth state starts out unknown.
    #[must_use]
    pub fn visitor(&self) -> FirebaseAuth {
        FirebaseAuth {
            client: self.clone(),
            hub: AuthStateHub::new(),
            user: Mutex::new(None),
        }
    }

    fn config(&self) -> &IdentityConfig {
        &self.inner.config
    }

    /// Identity Toolkit or Secure Token endpoint with the API key attached.
    fn endpoint(&self, base: &Url, method: &str) -> Result<Url, AuthError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| AuthError::Parse("endpoint base cannot be a base".to_string()))?
            .pop_if_empty()
            .push(method);
        url.query_pairs_mut()
            .append_pair("key", self.config().firebase_api_key.expose_secret());
        Ok(url)
    }

    async fn exchange_google_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, AuthError> {
        let config = self.config();
        let response = self
            .inner
            .http
            .post(config.google_token_url.clone())
            .form(&[
                ("code", code),
                ("client_id", config.google_client_id.as_str()),
                ("client_secret", config.google_client_secret.expose_secret()),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(transport)?;

        let token: GoogleTokenResponse = parse(response).await?;
        Ok(token.id_token)
    }

    async fn sign_in_with_google_token(
        &self,
        google_id_token: &str,
        redirect_uri: &str,
    ) -> Result<SignInResponse, AuthError> {
        let url = self.endpoint(&self.config().identity_toolkit_url, "accounts:signInWithIdp")?;
        let body = SignInWithIdpRequest {
            post_body: format!("id_token={google_id_token}&providerId=google.com"),
            request_uri: redirect_uri,
            return_idp_credential: true,
            return_secure_token: true,
        };
        let response = self
            .inner
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        parse(response).await
    }

    async fn sign_up_anonymous(&self) -> Result<SignInResponse, AuthError> {
        let url = self.endpoint(&self.config().identity_toolkit_url, "accounts:signUp")?;
        let response = self
            .inner
            .http
            .post(url)
            .json(&SignUpRequest {
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(transport)?;
        parse(response).await
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshResponse, AuthError> {
        let url = self.endpoint(&self.config().secure_token_url, "token")?;
        let response = self
            .inner
            .http
            .post(url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
            ])
            .send()
            .await
            .map_err(transport)?;
        parse(response).await
    }
}

/// Signed-in user with cached tokens.
struct SessionTokens {
    identity: AuthIdentity,
    refresh_token: SecretString,
    id_token: Option<(IdToken, Instant)>,
}

impl SessionTokens {
    fn from_sign_in(response: &SignInResponse, is_anonymous: bool) -> Self {
        Self {
            identity: response.identity(is_anonymous),
            refresh_token: SecretString::from(response.refresh_token.clone()),
            id_token: Some((
                IdToken::new(response.id_token.clone()),
                expiry(&response.expires_in),
            )),
        }
    }

    fn fresh_id_token(&self) -> Option<&IdToken> {
        self.id_token
            .as_ref()
            .filter(|(_, expires_at)| Instant::now() + TOKEN_EXPIRY_MARGIN < *expires_at)
            .map(|(token, _)| token)
    }
}

/// Per-visitor Firebase auth.
pub struct FirebaseAuth {
    client: FirebaseAuthClient,
    hub: AuthStateHub,
    user: Mutex<Option<SessionTokens>>,
}

impl FirebaseAuth {
    async fn install(&self, tokens: SessionTokens) -> AuthIdentity {
        let identity = tokens.identity.clone();
        *self.user.lock().await = Some(tokens);
        self.hub.publish(AuthState::SignedIn(identity.clone()));
        identity
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    fn authorization_url(&self, redirect_uri: &str, csrf_state: &str) -> String {
        let config = self.client.config();
        let mut url = config.google_auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &config.google_client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email profile")
            .append_pair("state", csrf_state)
            .append_pair("prompt", "select_account");
        url.into()
    }

    async fn sign_in_interactive(
        &self,
        grant: InteractiveGrant,
    ) -> Result<AuthIdentity, AuthError> {
        let (code, redirect_uri) = match grant {
            InteractiveGrant::Code { code, redirect_uri } => (code, redirect_uri),
            InteractiveGrant::Error { error, .. } if error == ACCESS_DENIED => {
                return Err(AuthError::Dismissed);
            }
            InteractiveGrant::Error { error, description } => {
                return Err(AuthError::Provider {
                    code: error,
                    message: description.unwrap_or_default(),
                });
            }
        };

        let google_id_token = self.client.exchange_google_code(&code, &redirect_uri).await?;
        let response = self
            .client
            .sign_in_with_google_token(&google_id_token, &redirect_uri)
            .await?;

        let identity = self
            .install(SessionTokens::from_sign_in(&response, false))
            .await;
        tracing::info!(uid = %identity.uid, "Signed in with Google");
        Ok(identity)
    }

    async fn sign_in_anonymous(&self) -> Result<AuthIdentity, AuthError> {
        let response = self.client.sign_up_anonymous().await?;
        let identity = self
            .install(SessionTokens::from_sign_in(&response, true))
            .await;
        tracing::info!(uid = %identity.uid, "Signed in anonymously");
        Ok(identity)
    }

    fn subscribe_auth_state(&self) -> AuthStateListener {
        self.hub.subscribe()
    }

    async fn id_token(&self, identity: &AuthIdentity) -> Result<IdToken, AuthError> {
        let mut guard = self.user.lock().await;
        let user = guard
            .as_mut()
            .filter(|u| u.identity.uid == identity.uid)
            .ok_or(AuthError::NoCurrentUser)?;

        if let Some(token) = user.fresh_id_token() {
            return Ok(token.clone());
        }

        let refreshed = self.client.refresh(&user.refresh_token).await?;
        let token = IdToken::new(refreshed.id_token);
        user.refresh_token = SecretString::from(refreshed.refresh_token);
        user.id_token = Some((token.clone(), expiry(&refreshed.expires_in)));
        Ok(token)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.user.lock().await = None;
        self.hub.publish(AuthState::SignedOut);
        tracing::info!("Signed out");
        Ok(())
    }

    async fn restore(&self, persisted: Option<PersistedUser>) {
        let mut user = self.user.lock().await;
        if self.hub.current() != AuthState::Unknown {
            return;
        }
        *user = persisted.map(|p| SessionTokens {
            identity: p.identity,
            refresh_token: SecretString::from(p.refresh_token),
            id_token: None,
        });
        self.hub
            .publish(user.as_ref().map(|u| u.identity.clone()).into());
    }

    async fn persisted(&self) -> Option<PersistedUser> {
        self.user.lock().await.as_ref().map(|u| PersistedUser {
            identity: u.identity.clone(),
            refresh_token: u.refresh_token.expose_secret().to_string(),
        })
    }
}

/// Expiry instant from an `expiresIn` seconds string; unparseable means already stale.
fn expiry(expires_in: &str) -> Instant {
    let seconds = expires_in.parse::<u64>().unwrap_or(0);
    Instant::now() + Duration::from_secs(seconds)
}

fn transport(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::Http(e)
    }
}

/// Parse a success body, or map Firebase / OAuth error bodies to `Provider`.
async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AuthError> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;

    if status.is_success() {
        return serde_json::from_str(&body).map_err(|e| AuthError::Parse(e.to_string()));
    }

    if let Ok(firebase) = serde_json::from_str::<FirebaseErrorResponse>(&body) {
        return Err(AuthError::Provider {
            code: firebase.error.code.to_string(),
            message: firebase.error.message,
        });
    }

    if let Ok(oauth) = serde_json::from_str::<OAuthErrorResponse>(&body) {
        return Err(AuthError::Provider {
            code: oauth.error,
            message: oauth.error_description.unwrap_or_default(),
        });
    }

    Err(AuthError::Provider {
        code: status.as_u16().to_string(),
        message: body,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> FirebaseAuthClient {
        let base = server.uri();
        let config = IdentityConfig {
            firebase_api_key: SecretString::from("test-api-key"),
            google_client_id: "client-id".to_string(),
            google_client_secret: SecretString::from("client-secret"),
            identity_toolkit_url: Url::parse(&format!("{base}/v1/")).unwrap(),
            secure_token_url: Url::parse(&format!("{base}/st/v1/")).unwrap(),
            google_auth_url: Url::parse("https://accounts.google.com/o/oauth2/v2/auth").unwrap(),
            google_token_url: Url::parse(&format!("{base}/token")).unwrap(),
        };
        FirebaseAuthClient::new(&config, Duration::from_secs(2)).unwrap()
    }

    fn sign_in_body(uid: &str, id_token: &str, expires_in: &str) -> serde_json::Value {
        json!({
            "localId": uid,
            "idToken": id_token,
            "refreshToken": "refresh-1",
            "expiresIn": expires_in,
            "email": "ada@example.com",
            "displayName": "Ada",
            "photoUrl": "https://example.com/ada.png"
        })
    }

    async fn mount_google_sign_in(server: &MockServer, expires_in: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=auth-code"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id_token": "google-id-token"})),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signInWithIdp"))
            .and(query_param("key", "test-api-key"))
            .and(body_string_contains("id_token=google-id-token&providerId=google.com"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(sign_in_body("uid-1", "fb-token", expires_in)),
            )
            .mount(server)
            .await;
    }

    fn code_grant() -> InteractiveGrant {
        InteractiveGrant::Code {
            code: "auth-code".to_string(),
            redirect_uri: "http://localhost:3000/auth/google/callback".to_string(),
        }
    }

    #[test]
    fn test_authorization_url() {
        let auth = FirebaseAuthClient::new(
            &IdentityConfig {
                firebase_api_key: SecretString::from("k"),
                google_client_id: "client-id".to_string(),
                google_client_secret: SecretString::from("s"),
                identity_toolkit_url: Url::parse(IdentityConfig::IDENTITY_TOOLKIT_URL).unwrap(),
                secure_token_url: Url::parse(IdentityConfig::SECURE_TOKEN_URL).unwrap(),
                google_auth_url: Url::parse(IdentityConfig::GOOGLE_AUTH_URL).unwrap(),
                google_token_url: Url::parse(IdentityConfig::GOOGLE_TOKEN_URL).unwrap(),
            },
            Duration::from_secs(1),
        )
        .unwrap()
        .visitor();

        let url = Url::parse(&auth.authorization_url("http://localhost/cb", "csrf-1")).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-id"));
        assert_eq!(pairs.get("redirect_uri").map(String::as_str), Some("http://localhost/cb"));
        assert_eq!(pairs.get("state").map(String::as_str), Some("csrf-1"));
        assert_eq!(pairs.get("prompt").map(String::as_str), Some("select_account"));
    }

    #[tokio::test]
    async fn test_interactive_sign_in_publishes_identity() {
        let server = MockServer::start().await;
        mount_google_sign_in(&server, "3600").await;

        let auth = client(&server).visitor();
        let mut listener = auth.subscribe_auth_state();
        let identity = auth.sign_in_interactive(code_grant()).await.unwrap();

        assert_eq!(identity.uid, "uid-1");
        assert_eq!(identity.display_name.as_deref(), Some("Ada"));
        assert!(!identity.is_anonymous);
        assert_eq!(listener.next().await.unwrap(), Some(identity.clone()));

        let token = auth.id_token(&identity).await.unwrap();
        assert_eq!(token.expose(), "fb-token");
    }

    #[tokio::test]
    async fn test_access_denied_is_dismissal() {
        let server = MockServer::start().await;
        let auth = client(&server).visitor();

        let err = auth
            .sign_in_interactive(InteractiveGrant::Error {
                error: ACCESS_DENIED.to_string(),
                description: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_dismissal());
        assert_eq!(auth.subscribe_auth_state().current(), AuthState::Unknown);
    }

    #[tokio::test]
    async fn test_provider_error_is_not_dismissal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Bad Request"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .visitor()
            .sign_in_interactive(code_grant())
            .await
            .unwrap_err();

        match err {
            AuthError::Provider { code, .. } => assert_eq!(code, "invalid_grant"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_anonymous_sign_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signUp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "localId": "anon-1",
                "idToken": "anon-token",
                "refreshToken": "anon-refresh",
                "expiresIn": "3600"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = client(&server).visitor();
        let identity = auth.sign_in_anonymous().await.unwrap();
        assert_eq!(identity, AuthIdentity::anonymous("anon-1"));
        assert_eq!(
            auth.subscribe_auth_state().current(),
            AuthState::SignedIn(identity)
        );
    }

    #[tokio::test]
    async fn test_stale_token_is_refreshed() {
        let server = MockServer::start().await;
        // Expires inside the refresh margin, so the first id_token call refreshes.
        mount_google_sign_in(&server, "30").await;
        Mock::given(method("POST"))
            .and(path("/st/v1/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id_token": "fb-token-2",
                "refresh_token": "refresh-2",
                "expires_in": "3600"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = client(&server).visitor();
        let identity = auth.sign_in_interactive(code_grant()).await.unwrap();

        assert_eq!(auth.id_token(&identity).await.unwrap().expose(), "fb-token-2");
        // Cached now.
        assert_eq!(auth.id_token(&identity).await.unwrap().expose(), "fb-token-2");
        assert_eq!(
            auth.persisted().await.map(|p| p.refresh_token),
            Some("refresh-2".to_string())
        );
    }

    #[tokio::test]
    async fn test_id_token_requires_matching_user() {
        let server = MockServer::start().await;
        let auth = client(&server).visitor();
        auth.restore(None).await;

        let err = auth
            .id_token(&AuthIdentity::anonymous("someone-else"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoCurrentUser));
    }

    #[tokio::test]
    async fn test_restore_and_sign_out() {
        let server = MockServer::start().await;
        let auth = client(&server).visitor();
        let mut listener = auth.subscribe_auth_state();
        assert_eq!(listener.current(), AuthState::Unknown);

        auth.restore(Some(PersistedUser {
            identity: AuthIdentity::anonymous("anon-9"),
            refresh_token: "r".to_string(),
        }))
        .await;
        assert_eq!(
            listener.next().await,
            Some(Some(AuthIdentity::anonymous("anon-9")))
        );

        auth.sign_out().await.unwrap();
        assert_eq!(listener.next().await, Some(None));
        assert!(auth.persisted().await.is_none());

        // Restoring again does not resurrect the signed-out user.
        auth.restore(Some(PersistedUser {
            identity: AuthIdentity::anonymous("anon-9"),
            refresh_token: "r".to_string(),
        }))
        .await;
        assert_eq!(listener.current(), AuthState::SignedOut);
    }
}

//! Integration tests for the Axon landing page.
//!
//! Drives the full router (sessions, rate limiting, templates) with the
//! in-memory record store and identity provider from
//! `axon_landing::services::testing`. No network or external services are
//! needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p axon-integration-tests
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use secrecy::SecretString;
use tower::ServiceExt;
use url::{Url, form_urlencoded};

use axon_landing::config::{IdentityConfig, LandingConfig, RecordStoreConfig};
use axon_landing::middleware::session::SESSION_COOKIE_NAME;
use axon_landing::services::testing::{MemoryIdentityProvider, MemoryRecordStore};
use axon_landing::services::{IdentityProvider, RecordStore};
use axon_landing::state::{AppState, IdentityFactory};

/// Where the "Continue" button deep-links in tests.
pub const CONTINUE_DESTINATION: &str = "https://app.example.test/";

/// Client address sent on every request; the rate limiter keys on it.
const CLIENT_IP: &str = "203.0.113.10";

/// Base64 PNG data URL holding just the PNG signature and an IHDR tag.
pub const PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUg==";

/// Configuration pointing at nothing; all collaborators are in memory.
///
/// # Panics
///
/// Panics if a hard-coded URL fails to parse.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_config() -> LandingConfig {
    let url = |s: &str| Url::parse(s).expect("valid test URL");
    LandingConfig {
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        record_store: RecordStoreConfig {
            base_url: url("http://127.0.0.1:8090"),
            token: None,
        },
        identity: IdentityConfig {
            firebase_api_key: SecretString::from("test-api-key"),
            google_client_id: "test-client.apps.googleusercontent.com".to_string(),
            google_client_secret: SecretString::from("test-client-secret"),
            identity_toolkit_url: url(IdentityConfig::IDENTITY_TOOLKIT_URL),
            secure_token_url: url(IdentityConfig::SECURE_TOKEN_URL),
            google_auth_url: url(IdentityConfig::GOOGLE_AUTH_URL),
            google_token_url: url(IdentityConfig::GOOGLE_TOKEN_URL),
        },
        continue_destination: url(CONTINUE_DESTINATION),
        remote_timeout: Duration::from_millis(500),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// A response with its body read to a string.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    /// Value of `name`, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Redirect target.
    ///
    /// # Panics
    ///
    /// Panics if the response is not a redirect.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn location(&self) -> &str {
        assert!(
            self.status.is_redirection(),
            "expected redirect, got {}",
            self.status
        );
        self.header("location").expect("redirect without location")
    }
}

/// One browser visiting the landing page.
///
/// Holds the session cookie between requests like a browser would.
pub struct TestApp {
    router: Router,
    pub store: Arc<MemoryRecordStore>,
    providers: Arc<Mutex<Vec<Arc<MemoryIdentityProvider>>>>,
    cookie: Mutex<Option<String>>,
}

impl TestApp {
    /// App with an empty store that enforces unique waitlist emails.
    #[must_use]
    pub fn new() -> Self {
        Self::with(
            MemoryRecordStore::new().with_unique("waitlist", "email"),
            MemoryIdentityProvider::new,
        )
    }

    /// App with `store`, creating each visitor's provider with `provider`.
    #[must_use]
    pub fn with(
        store: MemoryRecordStore,
        provider: impl Fn() -> MemoryIdentityProvider + Send + Sync + 'static,
    ) -> Self {
        let store = Arc::new(store);
        let providers: Arc<Mutex<Vec<Arc<MemoryIdentityProvider>>>> = Arc::default();

        let created = providers.clone();
        let factory: IdentityFactory = Arc::new(move || {
            let instance = Arc::new(provider());
            created
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(instance.clone());
            instance as Arc<dyn IdentityProvider>
        });

        let state =
            AppState::with_collaborators(test_config(), store.clone() as Arc<dyn RecordStore>, factory);

        Self {
            router: axon_landing::app(state),
            store,
            providers,
            cookie: Mutex::new(None),
        }
    }

    /// The identity provider created for this visitor.
    ///
    /// # Panics
    ///
    /// Panics if no request has created one yet.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn provider(&self) -> Arc<MemoryIdentityProvider> {
        self.providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
            .expect("no identity provider created yet")
    }

    /// Forget the session cookie, as a new browser would.
    pub fn clear_cookies(&self) {
        *self.cookie.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Send a GET request.
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri), Body::empty()).await
    }

    /// Send a form-encoded POST request.
    pub async fn post_form(&self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let builder = Request::post(uri).header(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        );
        self.send(builder, Body::from(body)).await
    }

    #[allow(clippy::expect_used)]
    async fn send(&self, builder: axum::http::request::Builder, body: Body) -> TestResponse {
        let mut builder = builder
            .header("x-forwarded-for", CLIENT_IP)
            .header("hx-request", "true");
        if let Some(cookie) = self
            .cookie
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            builder = builder.header(header::COOKIE, cookie);
        }

        let request = builder.body(body).expect("valid request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let prefix = format!("{SESSION_COOKIE_NAME}=");
        if let Some(cookie) = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .find(|v| v.starts_with(&prefix))
        {
            *self.cookie.lock().unwrap_or_else(PoisonError::into_inner) = Some(cookie.to_string());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");

        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// The `state` query parameter of a sign-in redirect.
///
/// # Panics
///
/// Panics if `location` is not a URL or carries no state.
#[must_use]
#[allow(clippy::expect_used)]
pub fn oauth_state(location: &str) -> String {
    Url::parse(location)
        .expect("absolute sign-in URL")
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("sign-in URL carries state")
}

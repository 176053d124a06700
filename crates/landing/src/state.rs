//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::config::LandingConfig;
use crate::firebase::FirebaseAuthClient;
use crate::middleware::session::SESSION_EXPIRY_SECONDS;
use crate::pocketbase::PocketBaseClient;
use crate::services::{
    AuthError, FeedbackController, IdentityProvider, PersistedUser, RecordStore,
    RecordStoreError, SessionController, WaitlistController,
};

/// Upper bound on visitors whose identity provider is kept in memory.
const MAX_VISITORS: u64 = 10_000;

/// Creates a fresh identity provider for a new visitor.
pub type IdentityFactory = Arc<dyn Fn() -> Arc<dyn IdentityProvider> + Send + Sync>;

/// Error creating the remote clients.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("record store client: {0}")]
    RecordStore(#[from] RecordStoreError),
    #[error("identity client: {0}")]
    Identity(#[from] AuthError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: LandingConfig,
    store: Arc<dyn RecordStore>,
    identity_factory: IdentityFactory,
    visitors: Cache<String, Arc<dyn IdentityProvider>>,
}

impl AppState {
    /// Create state backed by PocketBase and Firebase.
    ///
    /// # Errors
    ///
    /// Returns an error if either HTTP client fails to build.
    pub fn new(config: LandingConfig) -> Result<Self, StateError> {
        let store = PocketBaseClient::new(&config.record_store, config.remote_timeout)?;
        let firebase = FirebaseAuthClient::new(&config.identity, config.remote_timeout)?;
        let factory: IdentityFactory = Arc::new(move || Arc::new(firebase.visitor()));
        Ok(Self::with_collaborators(config, Arc::new(store), factory))
    }

    /// Create state with explicit collaborators.
    #[must_use]
    pub fn with_collaborators(
        config: LandingConfig,
        store: Arc<dyn RecordStore>,
        identity_factory: IdentityFactory,
    ) -> Self {
        let visitors = Cache::builder()
            .max_capacity(MAX_VISITORS)
            .time_to_idle(Duration::from_secs(SESSION_EXPIRY_SECONDS.unsigned_abs()))
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                identity_factory,
                visitors,
            }),
        }
    }

    /// Get a reference to the landing configuration.
    #[must_use]
    pub fn config(&self) -> &LandingConfig {
        &self.inner.config
    }

    /// Get the record store handle.
    #[must_use]
    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.inner.store.clone()
    }

    /// Identity provider for `visitor_id`, created and restored from
    /// `persisted` on first use.
    pub async fn visitor_identity(
        &self,
        visitor_id: &str,
        persisted: Option<PersistedUser>,
    ) -> Arc<dyn IdentityProvider> {
        let factory = self.inner.identity_factory.clone();
        let provider = self
            .inner
            .visitors
            .get_with(visitor_id.to_string(), async move { factory() })
            .await;
        provider.restore(persisted).await;
        provider
    }

    #[must_use]
    pub fn waitlist(&self) -> WaitlistController {
        WaitlistController::new(self.store(), self.config().remote_timeout)
    }

    #[must_use]
    pub fn session_controller(&self, provider: Arc<dyn IdentityProvider>) -> SessionController {
        SessionController::new(
            provider,
            self.store(),
            self.config().continue_destination.clone(),
            self.config().remote_timeout,
        )
    }

    #[must_use]
    pub fn feedback(&self, provider: Arc<dyn IdentityProvider>) -> FeedbackController {
        FeedbackController::new(self.store(), provider, self.config().remote_timeout)
    }
}

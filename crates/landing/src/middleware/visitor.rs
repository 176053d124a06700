//! Per-visitor extractor.
//!
//! Resolves the visitor's session and their identity provider. The provider
//! is looked up in the registry by a visitor ID kept in the session and its
//! auth state is restored from the persisted sign-in.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tower_sessions::Session;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::session_keys;
use crate::services::{IdentityProvider, PersistedUser};
use crate::state::AppState;

/// The current visitor.
pub struct Visitor {
    pub session: Session,
    pub identity: Arc<dyn IdentityProvider>,
}

impl FromRequestParts<AppState> for Visitor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Session(msg.to_string()))?;

        let visitor_id = match session.get::<String>(session_keys::VISITOR_ID).await? {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                session.insert(session_keys::VISITOR_ID, &id).await?;
                id
            }
        };

        let persisted = session
            .get::<PersistedUser>(session_keys::PERSISTED_USER)
            .await?;
        let identity = state.visitor_identity(&visitor_id, persisted).await;

        Ok(Self { session, identity })
    }
}

impl Visitor {
    /// Load a value from the session, or its default.
    ///
    /// # Errors
    ///
    /// Returns error if the session store fails.
    pub async fn load<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, AppError> {
        Ok(self.session.get::<T>(key).await?.unwrap_or_default())
    }

    /// Store a value in the session.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized or the store fails.
    pub async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        self.session.insert(key, value).await?;
        Ok(())
    }

    /// Persist the provider's current sign-in so it survives registry eviction.
    ///
    /// # Errors
    ///
    /// Returns error if the session store fails.
    pub async fn save_sign_in(&self) -> Result<(), AppError> {
        match self.identity.persisted().await {
            Some(user) => self.save(session_keys::PERSISTED_USER, &user).await,
            None => {
                self.session
                    .remove::<PersistedUser>(session_keys::PERSISTED_USER)
                    .await?;
                Ok(())
            }
        }
    }
}

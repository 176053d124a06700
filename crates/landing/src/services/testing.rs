//! In-memory collaborators for tests.
//!
//! Available to this crate's unit tests and, through the `test-support`
//! feature, to the integration test crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use url::form_urlencoded;

use axon_core::AuthIdentity;

use super::identity::{
    ACCESS_DENIED, AuthError, AuthState, AuthStateHub, AuthStateListener, IdToken,
    IdentityProvider, InteractiveGrant, PersistedUser,
};
use super::record_store::{Record, RecordStore, RecordStoreError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Record store backed by a map of collections.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    collections: Mutex<HashMap<String, Vec<Record>>>,
    unique: Vec<(String, String)>,
    fail_next: Mutex<Option<RecordStoreError>>,
    delay: Option<Duration>,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce uniqueness of `field` in `collection` the way PocketBase does.
    #[must_use]
    pub fn with_unique(mut self, collection: &str, field: &str) -> Self {
        self.unique.push((collection.to_string(), field.to_string()));
        self
    }

    /// Delay every call, for exercising timeouts.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: RecordStoreError) {
        *lock(&self.fail_next) = Some(error);
    }

    /// Seed a record without counting it as a call.
    pub fn insert(&self, collection: &str, fields: Value) -> Record {
        let record = self.new_record(collection, fields);
        lock(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        record
    }

    /// Records currently stored in `collection`.
    #[must_use]
    pub fn records(&self, collection: &str) -> Vec<Record> {
        lock(&self.collections)
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn new_record(&self, collection: &str, fields: Value) -> Record {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Record {
            id: format!("rec{n:012}"),
            collection_name: collection.to_string(),
            created: Some(chrono::Utc::now().to_rfc3339()),
            fields: match fields {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }

    async fn before_call(&self) -> Result<(), RecordStoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.fail_next).take().map_or(Ok(()), Err)
    }

    fn unique_violation(&self, collection: &str, fields: &Value) -> Option<RecordStoreError> {
        let stored = lock(&self.collections);
        let existing = stored.get(collection)?;
        self.unique
            .iter()
            .filter(|(c, _)| c == collection)
            .find(|(_, field)| {
                fields.get(field).is_some_and(|value| {
                    existing.iter().any(|r| r.fields.get(field) == Some(value))
                })
            })
            .map(|(_, field)| {
                let mut data = Map::new();
                data.insert(
                    field.clone(),
                    json!({"code": "validation_not_unique", "message": "Value must be unique."}),
                );
                RecordStoreError::Rejected {
                    status: 400,
                    message: "Failed to create record.".to_string(),
                    data: Value::Object(data),
                }
            })
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, collection: &str, fields: Value) -> Result<Record, RecordStoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;

        if let Some(error) = self.unique_violation(collection, &fields) {
            return Err(error);
        }
        Ok(self.insert(collection, fields))
    }

    async fn find_first(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Record>, RecordStoreError> {
        self.before_call().await?;
        Ok(self
            .records(collection)
            .into_iter()
            .find(|r| r.fields.get(field).and_then(Value::as_str) == Some(value)))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<Record, RecordStoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;

        let mut stored = lock(&self.collections);
        let record = stored
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| RecordStoreError::Rejected {
                status: 404,
                message: "The requested resource wasn't found.".to_string(),
                data: Value::Null,
            })?;

        if let Value::Object(map) = fields {
            record.fields.extend(map);
        }
        Ok(record.clone())
    }
}

/// How [`MemoryIdentityProvider`] answers an authorization code.
#[derive(Debug, Clone)]
pub enum InteractiveScript {
    /// Sign in as this identity.
    Succeed(AuthIdentity),
    /// Fail with a provider error.
    Fail,
}

/// Identity provider that signs in instantly and issues predictable tokens.
///
/// Tokens are `token-{uid}`. Every token fetch rotates the refresh token
/// to `refresh-{uid}-{fetches}`.
#[derive(Debug)]
pub struct MemoryIdentityProvider {
    hub: AuthStateHub,
    interactive: Mutex<InteractiveScript>,
    anonymous_fails: bool,
    anonymous_calls: AtomicUsize,
    token_fetches: AtomicUsize,
    last_restored: Mutex<Option<PersistedUser>>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    /// A provider whose auth state is still unknown.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hub: AuthStateHub::new(),
            interactive: Mutex::new(InteractiveScript::Succeed(google_identity())),
            anonymous_fails: false,
            anonymous_calls: AtomicUsize::new(0),
            token_fetches: AtomicUsize::new(0),
            last_restored: Mutex::new(None),
        }
    }

    /// A provider that has determined nobody is signed in.
    #[must_use]
    pub fn signed_out() -> Self {
        let provider = Self::new();
        provider.hub.publish(AuthState::SignedOut);
        provider
    }

    /// A provider with `identity` already signed in.
    #[must_use]
    pub fn signed_in(identity: AuthIdentity) -> Self {
        let provider = Self::new();
        provider.hub.publish(AuthState::SignedIn(identity));
        provider
    }

    #[must_use]
    pub fn with_interactive(self, script: InteractiveScript) -> Self {
        *lock(&self.interactive) = script;
        self
    }

    #[must_use]
    pub fn with_failing_anonymous(mut self) -> Self {
        self.anonymous_fails = true;
        self
    }

    #[must_use]
    pub fn anonymous_calls(&self) -> usize {
        self.anonymous_calls.load(Ordering::SeqCst)
    }

    /// The sign-in most recently handed to [`IdentityProvider::restore`].
    #[must_use]
    pub fn last_restored(&self) -> Option<PersistedUser> {
        lock(&self.last_restored).clone()
    }

    /// Resolve the auth state, as restoring a persisted session would.
    pub fn publish(&self, identity: Option<AuthIdentity>) {
        self.hub.publish(identity.into());
    }
}

/// Identity the default interactive script signs in as.
#[must_use]
pub fn google_identity() -> AuthIdentity {
    AuthIdentity {
        uid: "google-uid".to_string(),
        display_name: Some("Ada Lovelace".to_string()),
        email: Some("ada@example.com".to_string()),
        photo_url: Some("https://example.com/ada.png".to_string()),
        is_anonymous: false,
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    fn authorization_url(&self, redirect_uri: &str, csrf_state: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", csrf_state)
            .finish();
        format!("https://accounts.example.test/auth?{query}")
    }

    async fn sign_in_interactive(
        &self,
        grant: InteractiveGrant,
    ) -> Result<AuthIdentity, AuthError> {
        if let InteractiveGrant::Error { error, description } = grant {
            return Err(if error == ACCESS_DENIED {
                AuthError::Dismissed
            } else {
                AuthError::Provider {
                    code: error,
                    message: description.unwrap_or_default(),
                }
            });
        }

        let script = lock(&self.interactive).clone();
        match script {
            InteractiveScript::Succeed(identity) => {
                self.hub.publish(AuthState::SignedIn(identity.clone()));
                Ok(identity)
            }
            InteractiveScript::Fail => Err(AuthError::Provider {
                code: "invalid_grant".to_string(),
                message: "Bad Request".to_string(),
            }),
        }
    }

    async fn sign_in_anonymous(&self) -> Result<AuthIdentity, AuthError> {
        let n = self.anonymous_calls.fetch_add(1, Ordering::SeqCst);
        if self.anonymous_fails {
            return Err(AuthError::Provider {
                code: "400".to_string(),
                message: "ADMIN_ONLY_OPERATION".to_string(),
            });
        }
        let identity = AuthIdentity::anonymous(format!("anon-{n}"));
        self.hub.publish(AuthState::SignedIn(identity.clone()));
        Ok(identity)
    }

    fn subscribe_auth_state(&self) -> AuthStateListener {
        self.hub.subscribe()
    }

    async fn id_token(&self, identity: &AuthIdentity) -> Result<IdToken, AuthError> {
        match self.hub.current().identity() {
            Some(current) if current.uid == identity.uid => {
                self.token_fetches.fetch_add(1, Ordering::SeqCst);
                Ok(IdToken::new(format!("token-{}", identity.uid)))
            }
            _ => Err(AuthError::NoCurrentUser),
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.hub.publish(AuthState::SignedOut);
        Ok(())
    }

    async fn restore(&self, persisted: Option<PersistedUser>) {
        lock(&self.last_restored).clone_from(&persisted);
        if self.hub.current() == AuthState::Unknown {
            self.hub.publish(persisted.map(|p| p.identity).into());
        }
    }

    async fn persisted(&self) -> Option<PersistedUser> {
        self.hub.current().identity().map(|identity| PersistedUser {
            identity: identity.clone(),
            refresh_token: format!(
                "refresh-{}-{}",
                identity.uid,
                self.token_fetches.load(Ordering::SeqCst)
            ),
        })
    }
}

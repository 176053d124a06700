//! PocketBase record store client.
//!
//! Talks to the PocketBase records REST API:
//!
//! ```text
//! POST  /api/collections/{collection}/records          create
//! GET   /api/collections/{collection}/records?filter=  list (first match)
//! PATCH /api/collections/{collection}/records/{id}     update
//! ```
//!
//! Failed requests return `{"code": 400, "message": "...", "data": {...}}`,
//! which is surfaced as [`RecordStoreError::Rejected`] with `data` intact so
//! callers can inspect per-field validation errors.

mod types;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use url::Url;

use crate::config::RecordStoreConfig;
use crate::services::{Record, RecordStore, RecordStoreError};

use types::{ErrorResponse, ListResponse};

/// PocketBase REST client.
#[derive(Clone)]
pub struct PocketBaseClient {
    client: reqwest::Client,
    base_url: Url,
}

impl PocketBaseClient {
    /// Create a new PocketBase client.
    ///
    /// # Errors
    ///
    /// Returns error if the token is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &RecordStoreConfig, timeout: Duration) -> Result<Self, RecordStoreError> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &config.token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(token.expose_secret())
                    .map_err(|e| RecordStoreError::Parse(format!("Invalid token format: {e}")))?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn records_url(&self, collection: &str) -> Result<Url, RecordStoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RecordStoreError::Parse("base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["api", "collections", collection, "records"]);
        Ok(url)
    }

    fn record_url(&self, collection: &str, id: &str) -> Result<Url, RecordStoreError> {
        let mut url = self.records_url(collection)?;
        url.path_segments_mut()
            .map_err(|()| RecordStoreError::Parse("base URL cannot be a base".to_string()))?
            .push(id);
        Ok(url)
    }

    /// Turn a non-success response into `Rejected`, keeping the `data` payload.
    async fn rejection(response: reqwest::Response) -> RecordStoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => RecordStoreError::Rejected {
                status,
                message: error.message,
                data: error.data,
            },
            Err(_) => RecordStoreError::Rejected {
                status,
                message: body,
                data: serde_json::Value::Null,
            },
        }
    }

    async fn record_from(response: reqwest::Response) -> Result<Record, RecordStoreError> {
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| RecordStoreError::Parse(e.to_string()))
    }
}

/// Map reqwest's timeout into the store's own variant.
fn transport(e: reqwest::Error) -> RecordStoreError {
    if e.is_timeout() {
        RecordStoreError::Timeout
    } else {
        RecordStoreError::Http(e)
    }
}

/// Quote a value for a PocketBase filter expression.
fn filter_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[async_trait]
impl RecordStore for PocketBaseClient {
    async fn create(
        &self,
        collection: &str,
        fields: serde_json::Value,
    ) -> Result<Record, RecordStoreError> {
        let url = self.records_url(collection)?;
        let response = self
            .client
            .post(url)
            .json(&fields)
            .send()
            .await
            .map_err(transport)?;
        Self::record_from(response).await
    }

    async fn find_first(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Record>, RecordStoreError> {
        let mut url = self.records_url(collection)?;
        url.query_pairs_mut()
            .append_pair("filter", &format!("{field}={}", filter_literal(value)))
            .append_pair("perPage", "1")
            .append_pair("skipTotal", "1");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let list: ListResponse = response
            .json()
            .await
            .map_err(|e| RecordStoreError::Parse(e.to_string()))?;
        Ok(list.items.into_iter().next())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<Record, RecordStoreError> {
        let url = self.record_url(collection, id)?;
        let response = self
            .client
            .patch(url)
            .json(&fields)
            .send()
            .await
            .map_err(transport)?;
        Self::record_from(response).await
    }
}

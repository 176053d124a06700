//! Remote record store seam.
//!
//! Controllers hold an `Arc<dyn RecordStore>` rather than a concrete client so
//! the store can be swapped for an in-memory fake in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Collection names used by the landing page.
pub mod collections {
    /// Waitlist signups, unique on `email`.
    pub const WAITLIST: &str = "waitlist";
    /// Free-text feedback from the side panel.
    pub const FEEDBACK: &str = "feedback";
    /// Profiles of visitors who signed in with Google.
    pub const PROFILES: &str = "profiles";
}

/// Errors returned by a [`RecordStore`].
#[derive(Debug, Error)]
pub enum RecordStoreError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store rejected the request.
    ///
    /// `data` carries the per-field validation payload, e.g.
    /// `{"email": {"code": "validation_not_unique", "message": "Value must be unique."}}`.
    #[error("store rejected request: {status} - {message}")]
    Rejected {
        status: u16,
        message: String,
        data: serde_json::Value,
    },

    /// The call did not complete within the configured timeout.
    #[error("record store call timed out")]
    Timeout,

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl RecordStoreError {
    /// Whether the store reported a uniqueness violation on `field`.
    ///
    /// Looks for `data.<field>.message` containing `"unique"`. Any other
    /// payload shape, including transport errors, is not a violation.
    #[must_use]
    pub fn is_unique_violation(&self, field: &str) -> bool {
        let Self::Rejected { data, .. } = self else {
            return false;
        };
        data.get(field)
            .and_then(|f| f.get("message"))
            .and_then(serde_json::Value::as_str)
            .is_some_and(|message| message.contains("unique"))
    }
}

/// A record as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(rename = "collectionName", default)]
    pub collection_name: String,
    /// Server-stamped creation time, as the store formats it.
    #[serde(default)]
    pub created: Option<String>,
    /// Remaining record fields.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Remote record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a record in `collection`.
    async fn create(
        &self,
        collection: &str,
        fields: serde_json::Value,
    ) -> Result<Record, RecordStoreError>;

    /// Find the first record in `collection` whose `field` equals `value`.
    async fn find_first(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Record>, RecordStoreError>;

    /// Patch the record `id` in `collection`.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<Record, RecordStoreError>;
}

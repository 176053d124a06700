//! PocketBase wire types.

use serde::Deserialize;

use crate::services::Record;

/// Error body returned by every failing PocketBase endpoint.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Paginated list response.
#[derive(Debug, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub items: Vec<Record>,
}

//! # Graph API Lead Fetching
//!
//! Read side of the pipeline: a webhook notification only names a leadgen
//! id, so the submitted field data has to be fetched from the Meta Graph
//! API afterwards. This module defines the fetched shape, the reduction of
//! its field data to one value per field, and the [`LeadFetcher`] seam the
//! enrichment unit works against.

use crate::LeadgenId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod client;

pub use client::{GraphClient, GraphClientConfig};

// ============================================================================
// Fetched Lead Shape
// ============================================================================

/// One named field submitted with a lead form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadFieldData {
    /// Field name as configured on the form, e.g. `phone_number`.
    pub name: String,

    /// Submitted values. Only the first one is authoritative.
    #[serde(default)]
    pub values: Vec<String>,
}

/// Full lead payload fetched from the Graph API for one leadgen id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLead {
    pub id: String,

    /// Submission time as reported upstream, RFC 3339 formatted.
    pub created_time: Option<String>,

    /// Submitted form fields in upstream order.
    #[serde(default)]
    pub field_data: Vec<LeadFieldData>,

    /// Identifiers echoed back by the API, when granted by token scope.
    pub ad_id: Option<String>,
    pub form_id: Option<String>,
    pub adgroup_id: Option<String>,
}

impl GraphLead {
    /// Reduce `field_data` to one value per field name.
    ///
    /// The first value of each entry wins within the entry; when a name
    /// repeats across entries, the later entry overwrites the earlier one.
    /// An entry with an empty values list maps to the empty string.
    pub fn first_values(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        for field in &self.field_data {
            let value = field.values.first().cloned().unwrap_or_default();
            fields.insert(field.name.clone(), value);
        }
        fields
    }
}

// ============================================================================
// Fetcher Interface
// ============================================================================

/// Errors from Graph API lead fetching.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// No page access token is configured. Reported without any fetch
    /// attempt; retrying cannot help until configuration changes.
    #[error("page access token is not configured")]
    AccessTokenMissing,

    #[error("settings source unavailable: {message}")]
    Settings { message: String },

    #[error("graph api request failed: {message}")]
    RequestFailed { message: String },

    #[error("graph api returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("graph api response does not decode: {message}")]
    InvalidResponse { message: String },
}

impl GraphError {
    /// Check if the error is transient and worth a later retry.
    pub fn is_transient(&self) -> bool {
        match self {
            GraphError::Settings { .. } | GraphError::RequestFailed { .. } => true,
            GraphError::Status { status, .. } => *status >= 500 || *status == 429,
            GraphError::AccessTokenMissing | GraphError::InvalidResponse { .. } => false,
        }
    }
}

/// Source of full lead data for a leadgen id.
///
/// `Ok(None)` means the fetch ran out of attempts without producing a lead;
/// the caller records it as a failed enrichment. `Err` is reserved for
/// failures where no attempt was made at all.
#[async_trait]
pub trait LeadFetcher: Send + Sync {
    /// Fetch the lead behind `leadgen_id`.
    async fn fetch_lead(&self, leadgen_id: &LeadgenId) -> Result<Option<GraphLead>, GraphError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

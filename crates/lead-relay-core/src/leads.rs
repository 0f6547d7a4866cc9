//! # Lead Records
//!
//! Destination shape for enriched leads and the store seam they are created
//! through. The store itself is external to this pipeline; only its create
//! operation is modeled here.

use crate::{graph::GraphLead, webhook::LeadEvent, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// UTM source stamped on every lead from this pipeline.
pub const UTM_SOURCE: &str = "meta";

/// UTM medium stamped on every lead from this pipeline.
pub const UTM_MEDIUM: &str = "lead_ads";

// ============================================================================
// Create Request
// ============================================================================

/// A lead ready for creation in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLead {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,

    /// Campaign attribution, synthesized from the upstream identifiers.
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,

    /// Click id slot, carrying the leadgen id for cross-referencing.
    pub fbclid: String,

    /// Free-form audit blob: upstream identifiers plus the raw field map.
    pub attribution: serde_json::Value,
}

impl NewLead {
    /// Map a fetched Graph lead into a create request.
    ///
    /// Contact fields come from the submitted form data (`phone_number`,
    /// `email`, `full_name`). Attribution identifiers come from the
    /// notification, with the Graph echoes filling gaps. The full field map
    /// rides along in the attribution blob.
    pub fn from_graph_lead(event: &LeadEvent, lead: &GraphLead) -> Self {
        let fields = lead.first_values();
        let phone = fields.get("phone_number").cloned();
        let email = fields.get("email").cloned();
        let full_name = fields.get("full_name").cloned();

        let ad_id = event.ad_id.clone().or_else(|| lead.ad_id.clone());
        let form_id = event.form_id.clone().or_else(|| lead.form_id.clone());
        let adgroup_id = event
            .adgroup_id
            .clone()
            .or_else(|| lead.adgroup_id.clone());

        let attribution = json!({
            "lead_ads": true,
            "leadgen_id": event.leadgen_id.as_str(),
            "ad_id": &ad_id,
            "form_id": &form_id,
            "page_id": &event.page_id,
            "adgroup_id": &adgroup_id,
            "full_name": &full_name,
            "created_time": &lead.created_time,
            "raw_fields": &fields,
        });

        Self {
            phone,
            email,
            full_name,
            utm_source: UTM_SOURCE.to_string(),
            utm_medium: UTM_MEDIUM.to_string(),
            utm_campaign: adgroup_id,
            utm_content: ad_id,
            utm_term: form_id,
            fbclid: event.leadgen_id.as_str().to_string(),
            attribution,
        }
    }
}

/// A lead as acknowledged by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredLead {
    /// Store-assigned row id.
    pub id: u64,

    /// The created lead as sent.
    pub lead: NewLead,

    /// Store-side creation time.
    pub created_at: Timestamp,
}

// ============================================================================
// Store Interface
// ============================================================================

/// Errors from lead creation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LeadStoreError {
    #[error("lead rejected by store: {message}")]
    Constraint { message: String },

    #[error("lead store unavailable: {message}")]
    Unavailable { message: String },
}

impl LeadStoreError {
    /// Check if the error is transient and worth a later retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, LeadStoreError::Unavailable { .. })
    }
}

/// External store leads are created in.
///
/// Create is invoked at most once per enrichment unit and never retried;
/// failures surface as `error` delivery rows eligible for reprocessing.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Create one lead.
    async fn create_lead(&self, lead: NewLead) -> Result<StoredLead, LeadStoreError>;
}

#[cfg(test)]
#[path = "leads_tests.rs"]
mod tests;

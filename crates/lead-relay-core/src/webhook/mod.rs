//! # Webhook Notification Model
//!
//! Payload types for Meta Lead Ads webhook notifications and the extraction
//! of leadgen events from them.
//!
//! A notification carries an `object` discriminator and a list of entries,
//! each with a list of field changes. Only changes whose `field` is
//! `leadgen` concern this pipeline; everything else is skipped without
//! error.

use crate::{delivery::DeliveryRecord, LeadgenId};
use serde::{Deserialize, Serialize};

pub mod signature;

pub use signature::{SignatureError, SignatureVerifier, SIGNATURE_HEADER};

/// Object type of notifications this pipeline consumes.
pub const PAGE_OBJECT: &str = "page";

/// Change field carrying leadgen events.
pub const LEADGEN_FIELD: &str = "leadgen";

// ============================================================================
// Payload Shape
// ============================================================================

/// Top-level webhook notification payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadNotification {
    /// Object type; anything other than `page` is a no-op for this pipeline.
    pub object: String,

    /// Notification entries. The provider batches several into one delivery.
    #[serde(default)]
    pub entry: Vec<NotificationEntry>,
}

impl LeadNotification {
    /// Whether this notification targets the page object this pipeline
    /// handles.
    pub fn is_page_object(&self) -> bool {
        self.object == PAGE_OBJECT
    }
}

/// One entry within a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEntry {
    /// Upstream page id the entry belongs to.
    pub id: Option<String>,

    /// Entry timestamp (unix seconds).
    pub time: Option<i64>,

    /// Field changes; only `leadgen` changes are extracted.
    #[serde(default)]
    pub changes: Vec<NotificationChange>,
}

/// One field change within an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChange {
    /// Changed field name.
    pub field: String,

    /// Field-specific payload; for `leadgen` this is a [`LeadChangeValue`].
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Value payload of a `leadgen` change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadChangeValue {
    pub leadgen_id: String,
    pub ad_id: Option<String>,
    pub form_id: Option<String>,
    pub page_id: Option<String>,
    pub adgroup_id: Option<String>,
    pub created_time: Option<i64>,
}

// ============================================================================
// Extracted Events
// ============================================================================

/// A leadgen event extracted from one notification change.
///
/// Carries everything the delivery log and the enrichment unit need; the
/// full lead field data is fetched from the Graph API later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadEvent {
    pub leadgen_id: LeadgenId,
    pub ad_id: Option<String>,
    pub form_id: Option<String>,
    pub page_id: Option<String>,
    pub adgroup_id: Option<String>,
    pub created_time: Option<i64>,
}

impl LeadEvent {
    /// Extract a lead event from a notification change.
    ///
    /// Returns `Ok(None)` for changes of other fields (skipped, not an
    /// error) and `Err` when a leadgen change is missing or carries an
    /// unusable `leadgen_id`.
    pub fn from_change(change: &NotificationChange) -> Result<Option<Self>, PayloadError> {
        if change.field != LEADGEN_FIELD {
            return Ok(None);
        }

        let value: LeadChangeValue = serde_json::from_value(change.value.clone())
            .map_err(|e| PayloadError::MalformedChange {
                reason: format!("leadgen change value does not decode: {}", e),
            })?;

        let leadgen_id =
            LeadgenId::new(value.leadgen_id).map_err(|e| PayloadError::MalformedChange {
                reason: format!("invalid leadgen_id: {}", e),
            })?;

        Ok(Some(Self {
            leadgen_id,
            ad_id: value.ad_id,
            form_id: value.form_id,
            page_id: value.page_id,
            adgroup_id: value.adgroup_id,
            created_time: value.created_time,
        }))
    }
}

// Reprocess rebuilds the event from the stored row.
impl From<&DeliveryRecord> for LeadEvent {
    fn from(record: &DeliveryRecord) -> Self {
        Self {
            leadgen_id: record.leadgen_id.clone(),
            ad_id: record.ad_id.clone(),
            form_id: record.form_id.clone(),
            page_id: record.page_id.clone(),
            adgroup_id: record.adgroup_id.clone(),
            created_time: record.created_time,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from notification payload handling.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed leadgen change: {reason}")]
    MalformedChange { reason: String },
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

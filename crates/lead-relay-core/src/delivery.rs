//! # Delivery Log
//!
//! Durable, idempotent record of each leadgen notification received, keyed by
//! the upstream leadgen id. The log row is the single source of truth for
//! "did this lead get fully enriched": detached enrichment units report their
//! outcome only here, and the stats/reprocess operations read only from here.

use crate::{webhook::LeadEvent, LeadgenId, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Lifecycle Status
// ============================================================================

/// Lifecycle state of one delivery.
///
/// `Processing` marks a claimed row: exactly one enrichment unit wins the
/// atomic pending→processing transition and proceeds; everyone else skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Logged, enrichment not started.
    Pending,
    /// Claimed by an enrichment unit.
    Processing,
    /// Lead created successfully.
    Processed,
    /// Enrichment failed; eligible for reprocess.
    Error,
}

impl DeliveryStatus {
    /// Lowercase wire/name form.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Processing => "processing",
            DeliveryStatus::Processed => "processed",
            DeliveryStatus::Error => "error",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Delivery Record
// ============================================================================

/// One row per upstream lead notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Primary dedup key.
    pub leadgen_id: LeadgenId,

    /// Attribution context from the notification, absent when the provider
    /// omitted it.
    pub ad_id: Option<String>,
    pub form_id: Option<String>,
    pub page_id: Option<String>,
    pub adgroup_id: Option<String>,

    /// Upstream-reported creation timestamp (unix seconds).
    pub created_time: Option<i64>,

    /// Lifecycle state.
    pub status: DeliveryStatus,

    /// Last failure reason, cleared by any later status update without one.
    pub error_message: Option<String>,

    /// First time this leadgen id was seen. Never changed by redelivery.
    pub received_at: Timestamp,

    /// Last mutation time.
    pub updated_at: Timestamp,
}

impl DeliveryRecord {
    /// Fresh pending row for a just-received event.
    pub fn pending(event: &LeadEvent) -> Self {
        let now = Timestamp::now();
        Self {
            leadgen_id: event.leadgen_id.clone(),
            ad_id: event.ad_id.clone(),
            form_id: event.form_id.clone(),
            page_id: event.page_id.clone(),
            adgroup_id: event.adgroup_id.clone(),
            created_time: event.created_time,
            status: DeliveryStatus::Pending,
            error_message: None,
            received_at: now,
            updated_at: now,
        }
    }
}

/// Aggregate counts of delivery rows grouped by status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub processed: u64,
    pub error: u64,
}

// ============================================================================
// Storage Errors
// ============================================================================

/// Errors from delivery log operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("delivery log unavailable: {message}")]
    Unavailable { message: String },

    #[error("no delivery record for leadgen id {leadgen_id}")]
    NotFound { leadgen_id: LeadgenId },

    #[error("delivery log internal error: {message}")]
    Internal { message: String },
}

impl StorageError {
    /// Check if the error is transient and the operation worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}

// ============================================================================
// Store Interface
// ============================================================================

/// Store of delivery records, keyed by leadgen id.
///
/// Implementations must provide per-row atomicity: each method is a single
/// atomic operation, and `claim_processing` in particular is a
/// compare-and-swap that at most one concurrent caller can win.
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    /// Record a notification as pending.
    ///
    /// Idempotent on leadgen id: a redelivery updates the existing row's
    /// status back to pending, clears any previous failure reason, and bumps
    /// `updated_at`, but never touches the identifiers or `received_at`.
    async fn upsert_pending(&self, event: &LeadEvent) -> Result<(), StorageError>;

    /// Atomically transition the row from pending to processing.
    ///
    /// Returns `true` if this caller won the claim. Returns `false` when the
    /// row is in any other state or does not exist; the caller must then
    /// skip the unit of work.
    async fn claim_processing(&self, id: &LeadgenId) -> Result<bool, StorageError>;

    /// Set the row's status, overwriting `error_message` (a `None` clears a
    /// previous failure reason) and bumping `updated_at`.
    async fn update_status(
        &self,
        id: &LeadgenId,
        status: DeliveryStatus,
        error_message: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Fetch one row.
    async fn get(&self, id: &LeadgenId) -> Result<Option<DeliveryRecord>, StorageError>;

    /// Aggregate counts grouped by status.
    async fn stats(&self) -> Result<DeliveryStats, StorageError>;

    /// Rows in `Error` status, most recently received first, at most `limit`.
    async fn recent_errors(&self, limit: usize) -> Result<Vec<DeliveryRecord>, StorageError>;
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;

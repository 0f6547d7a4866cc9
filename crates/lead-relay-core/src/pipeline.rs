//! # Lead Pipeline
//!
//! Orchestrates the webhook intake path and the operator-facing maintenance
//! operations. Intake logs every extracted leadgen event as pending and
//! hands it to the worker pool; the HTTP response never waits for
//! enrichment. Reprocessing re-runs failed deliveries synchronously.

use crate::{
    delivery::{DeliveryLog, DeliveryStats, DeliveryStatus, StorageError},
    enrichment::{EnrichmentOutcome, EnrichmentProcessor},
    webhook::{LeadEvent, LeadNotification, PayloadError},
    worker::{DispatchOutcome, WorkerPool},
    LeadgenId,
};
use std::sync::Arc;

/// Upper bound on entries one reprocess run will touch.
pub const REPROCESS_BATCH_LIMIT: usize = 50;

/// Delivery row message for a unit shed by a full queue.
const QUEUE_SATURATED_MESSAGE: &str = "enrichment queue saturated";

/// Delivery row message for a unit arriving after pool shutdown.
const QUEUE_CLOSED_MESSAGE: &str = "enrichment queue closed";

// ============================================================================
// Summaries
// ============================================================================

/// Outcome of one intake call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntakeSummary {
    /// Leadgen ids logged this call, in notification order.
    pub leadgen_ids: Vec<LeadgenId>,
}

impl IntakeSummary {
    /// Number of leadgen events accepted.
    pub fn processed(&self) -> usize {
        self.leadgen_ids.len()
    }
}

/// Outcome of one reprocess run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReprocessSummary {
    /// Entries that re-enriched successfully.
    pub reprocessed: u64,

    /// Entries that failed again.
    pub failed: u64,
}

impl ReprocessSummary {
    /// Overall flag: true only when nothing failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from pipeline operations.
///
/// Intake callers report these in the response body while still answering
/// HTTP 200; the upstream provider must not see transport-level failures
/// after signature validation, or it re-delivers.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("malformed payload: {source}")]
    Payload {
        #[from]
        source: PayloadError,
    },

    #[error("delivery log failure: {source}")]
    Storage {
        #[from]
        source: StorageError,
    },
}

// ============================================================================
// Pipeline
// ============================================================================

/// Coordinates intake, reprocessing, and stats over the storage seams and
/// the worker pool.
#[derive(Clone)]
pub struct LeadPipeline {
    delivery: Arc<dyn DeliveryLog>,
    processor: EnrichmentProcessor,
    pool: Arc<WorkerPool>,
}

impl LeadPipeline {
    /// Create a pipeline over the given collaborators.
    pub fn new(
        delivery: Arc<dyn DeliveryLog>,
        processor: EnrichmentProcessor,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            delivery,
            processor,
            pool,
        }
    }

    /// Ingest one parsed notification.
    ///
    /// Non-page objects are a no-op success with zero processed. For each
    /// leadgen change: upsert the pending row first, then dispatch the
    /// detached enrichment unit, so no observer ever sees a dispatched id
    /// without a log row. A malformed change aborts the loop; earlier units
    /// stand and their ids are not reported back.
    pub async fn intake(
        &self,
        notification: &LeadNotification,
    ) -> Result<IntakeSummary, PipelineError> {
        if !notification.is_page_object() {
            tracing::debug!(object = %notification.object, "ignoring non-page notification");
            return Ok(IntakeSummary::default());
        }

        let mut summary = IntakeSummary::default();
        for entry in &notification.entry {
            for change in &entry.changes {
                let Some(event) = LeadEvent::from_change(change)? else {
                    continue;
                };
                let id = event.leadgen_id.clone();

                self.delivery.upsert_pending(&event).await?;
                tracing::info!(leadgen_id = %id, "lead notification logged");

                match self.pool.dispatch(event) {
                    DispatchOutcome::Enqueued => {}
                    DispatchOutcome::Saturated => {
                        tracing::warn!(leadgen_id = %id, "enrichment queue full, shedding unit");
                        self.mark_shed(&id, QUEUE_SATURATED_MESSAGE).await;
                    }
                    DispatchOutcome::Closed => {
                        tracing::warn!(leadgen_id = %id, "enrichment queue closed, shedding unit");
                        self.mark_shed(&id, QUEUE_CLOSED_MESSAGE).await;
                    }
                }

                summary.leadgen_ids.push(id);
            }
        }

        Ok(summary)
    }

    /// Re-run enrichment for recently failed deliveries.
    ///
    /// Selects at most [`REPROCESS_BATCH_LIMIT`] `error` rows, newest first
    /// by `received_at`, resets each to pending, and runs the unit
    /// synchronously. The summary's flag is strict: one failure makes the
    /// whole run unsuccessful.
    pub async fn reprocess_failed(&self) -> Result<ReprocessSummary, PipelineError> {
        let entries = self.delivery.recent_errors(REPROCESS_BATCH_LIMIT).await?;
        tracing::info!(count = entries.len(), "reprocessing failed deliveries");

        let mut summary = ReprocessSummary::default();
        for record in &entries {
            if let Err(error) = self
                .delivery
                .update_status(&record.leadgen_id, DeliveryStatus::Pending, None)
                .await
            {
                tracing::error!(
                    leadgen_id = %record.leadgen_id,
                    error = %error,
                    "failed to reset delivery for reprocess"
                );
                summary.failed += 1;
                continue;
            }

            let event = LeadEvent::from(record);
            match self.processor.enrich(&event).await {
                EnrichmentOutcome::Processed => summary.reprocessed += 1,
                EnrichmentOutcome::Failed => summary.failed += 1,
                // Claimed by a concurrent unit; its outcome lands on the row.
                EnrichmentOutcome::Skipped => {
                    tracing::debug!(
                        leadgen_id = %record.leadgen_id,
                        "delivery claimed elsewhere during reprocess"
                    );
                }
            }
        }

        tracing::info!(
            reprocessed = summary.reprocessed,
            failed = summary.failed,
            "reprocess run finished"
        );
        Ok(summary)
    }

    /// Aggregate delivery counts grouped by status.
    pub async fn stats(&self) -> Result<DeliveryStats, PipelineError> {
        Ok(self.delivery.stats().await?)
    }

    async fn mark_shed(&self, id: &LeadgenId, message: &str) {
        if let Err(error) = self
            .delivery
            .update_status(id, DeliveryStatus::Error, Some(message))
            .await
        {
            tracing::error!(
                leadgen_id = %id,
                error = %error,
                "failed to record shed enrichment unit"
            );
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

//! # Enrichment Processor
//!
//! One unit of work per leadgen notification: claim the delivery row, fetch
//! the full lead from the Graph API, create the lead in the store, and
//! record the outcome back on the row.
//!
//! The unit never propagates errors to its caller. Every failure path ends
//! in an `error` delivery row, which keeps the entry visible to stats and
//! eligible for reprocessing.

use crate::{
    delivery::{DeliveryLog, DeliveryStatus},
    graph::LeadFetcher,
    leads::{LeadStore, NewLead},
    webhook::LeadEvent,
    LeadgenId,
};
use std::sync::Arc;

/// Delivery row message for a fetch that ran out of attempts.
const FETCH_EXHAUSTED_MESSAGE: &str = "lead data could not be fetched from the graph api";

/// Result of one enrichment unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    /// Lead created; row marked processed.
    Processed,
    /// Enrichment failed; row marked error where possible.
    Failed,
    /// Row was not claimable: already claimed, already settled, or missing.
    Skipped,
}

/// Executes enrichment units against the storage and fetch seams.
#[derive(Clone)]
pub struct EnrichmentProcessor {
    delivery: Arc<dyn DeliveryLog>,
    fetcher: Arc<dyn LeadFetcher>,
    store: Arc<dyn LeadStore>,
}

impl EnrichmentProcessor {
    /// Create a processor over the given seams.
    pub fn new(
        delivery: Arc<dyn DeliveryLog>,
        fetcher: Arc<dyn LeadFetcher>,
        store: Arc<dyn LeadStore>,
    ) -> Self {
        Self {
            delivery,
            fetcher,
            store,
        }
    }

    /// Run one enrichment unit for `event`.
    ///
    /// The atomic pending→processing claim guarantees at most one concurrent
    /// unit proceeds per leadgen id; losers return [`EnrichmentOutcome::Skipped`]
    /// without side effects.
    pub async fn enrich(&self, event: &LeadEvent) -> EnrichmentOutcome {
        let id = &event.leadgen_id;

        match self.delivery.claim_processing(id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(leadgen_id = %id, "delivery row not claimable, skipping");
                return EnrichmentOutcome::Skipped;
            }
            Err(error) => {
                tracing::error!(
                    leadgen_id = %id,
                    error = %error,
                    "failed to claim delivery row"
                );
                return EnrichmentOutcome::Failed;
            }
        }

        let lead = match self.fetcher.fetch_lead(id).await {
            Ok(Some(lead)) => lead,
            Ok(None) => {
                tracing::error!(leadgen_id = %id, "lead fetch exhausted all attempts");
                self.mark_error(id, FETCH_EXHAUSTED_MESSAGE).await;
                return EnrichmentOutcome::Failed;
            }
            Err(error) => {
                if error.is_transient() {
                    tracing::warn!(leadgen_id = %id, error = %error, "lead fetch failed");
                } else {
                    tracing::error!(leadgen_id = %id, error = %error, "lead fetch failed");
                }
                self.mark_error(id, &error.to_string()).await;
                return EnrichmentOutcome::Failed;
            }
        };

        let new_lead = NewLead::from_graph_lead(event, &lead);
        match self.store.create_lead(new_lead).await {
            Ok(stored) => {
                tracing::info!(
                    leadgen_id = %id,
                    lead_id = stored.id,
                    "lead enriched and created"
                );
                if let Err(error) = self
                    .delivery
                    .update_status(id, DeliveryStatus::Processed, None)
                    .await
                {
                    tracing::error!(
                        leadgen_id = %id,
                        error = %error,
                        "lead created but outcome not recorded"
                    );
                }
                EnrichmentOutcome::Processed
            }
            Err(error) => {
                tracing::error!(leadgen_id = %id, error = %error, "lead creation failed");
                self.mark_error(id, &error.to_string()).await;
                EnrichmentOutcome::Failed
            }
        }
    }

    async fn mark_error(&self, id: &LeadgenId, message: &str) {
        if let Err(error) = self
            .delivery
            .update_status(id, DeliveryStatus::Error, Some(message))
            .await
        {
            tracing::error!(
                leadgen_id = %id,
                error = %error,
                "failed to record enrichment failure"
            );
        }
    }
}

#[cfg(test)]
#[path = "enrichment_tests.rs"]
mod tests;

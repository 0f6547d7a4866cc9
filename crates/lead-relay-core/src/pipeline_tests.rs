//! Tests for the pipeline controller.

use super::*;
use crate::adapters::{InMemoryDeliveryLog, InMemoryLeadStore};
use crate::graph::{GraphError, GraphLead, LeadFetcher};
use crate::worker::WorkerPoolConfig;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Notify, Semaphore};

struct OkFetcher;

#[async_trait]
impl LeadFetcher for OkFetcher {
    async fn fetch_lead(&self, id: &LeadgenId) -> Result<Option<GraphLead>, GraphError> {
        Ok(Some(minimal_lead(id)))
    }
}

/// Fetcher whose attempts always run out.
struct AbsentFetcher;

#[async_trait]
impl LeadFetcher for AbsentFetcher {
    async fn fetch_lead(&self, _id: &LeadgenId) -> Result<Option<GraphLead>, GraphError> {
        Ok(None)
    }
}

/// Fetcher failing for one specific id and succeeding otherwise.
struct FailsFor {
    id: String,
}

#[async_trait]
impl LeadFetcher for FailsFor {
    async fn fetch_lead(&self, id: &LeadgenId) -> Result<Option<GraphLead>, GraphError> {
        if id.as_str() == self.id {
            Ok(None)
        } else {
            Ok(Some(minimal_lead(id)))
        }
    }
}

/// Fetcher that parks until the gate releases permits, signalling entry.
struct GatedFetcher {
    gate: Arc<Semaphore>,
    entered: Arc<Notify>,
}

#[async_trait]
impl LeadFetcher for GatedFetcher {
    async fn fetch_lead(&self, id: &LeadgenId) -> Result<Option<GraphLead>, GraphError> {
        self.entered.notify_one();
        let _permit = self.gate.acquire().await.unwrap();
        Ok(Some(minimal_lead(id)))
    }
}

fn minimal_lead(id: &LeadgenId) -> GraphLead {
    GraphLead {
        id: id.as_str().to_string(),
        created_time: None,
        field_data: Vec::new(),
        ad_id: None,
        form_id: None,
        adgroup_id: None,
    }
}

fn event(id: &str) -> LeadEvent {
    LeadEvent {
        leadgen_id: LeadgenId::new(id).unwrap(),
        ad_id: None,
        form_id: None,
        page_id: None,
        adgroup_id: None,
        created_time: None,
    }
}

fn notification(ids: &[&str]) -> LeadNotification {
    let changes: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| json!({"field": "leadgen", "value": {"leadgen_id": id, "ad_id": "5555"}}))
        .collect();

    serde_json::from_value(json!({
        "object": "page",
        "entry": [{"id": "page-1", "time": 1700000000, "changes": changes}]
    }))
    .unwrap()
}

struct Fixture {
    pipeline: LeadPipeline,
    delivery: InMemoryDeliveryLog,
    store: InMemoryLeadStore,
    pool: Arc<WorkerPool>,
}

fn fixture_with(fetcher: Arc<dyn LeadFetcher>, pool_config: WorkerPoolConfig) -> Fixture {
    let delivery = InMemoryDeliveryLog::new();
    let store = InMemoryLeadStore::new();
    let processor = EnrichmentProcessor::new(
        Arc::new(delivery.clone()),
        fetcher,
        Arc::new(store.clone()),
    );
    let pool = Arc::new(WorkerPool::start(pool_config, processor.clone()));
    let pipeline = LeadPipeline::new(Arc::new(delivery.clone()), processor, pool.clone());

    Fixture {
        pipeline,
        delivery,
        store,
        pool,
    }
}

fn fixture(fetcher: Arc<dyn LeadFetcher>) -> Fixture {
    fixture_with(fetcher, WorkerPoolConfig::default())
}

async fn seed_error(delivery: &InMemoryDeliveryLog, id: &str) {
    let event = event(id);
    delivery.upsert_pending(&event).await.unwrap();
    delivery
        .update_status(&event.leadgen_id, DeliveryStatus::Error, Some("boom"))
        .await
        .unwrap();
}

mod intake_tests {
    use super::*;

    #[tokio::test]
    async fn test_logs_and_dispatches_each_leadgen_change() {
        let fx = fixture(Arc::new(OkFetcher));

        let summary = fx.pipeline.intake(&notification(&["L1", "L2"])).await.unwrap();

        assert_eq!(summary.processed(), 2);
        let ids: Vec<&str> = summary.leadgen_ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["L1", "L2"]);

        fx.pool.shutdown().await;
        let stats = fx.delivery.stats().await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(fx.store.len(), 2);
    }

    #[tokio::test]
    async fn test_skips_changes_of_other_fields() {
        let fx = fixture(Arc::new(OkFetcher));
        let notification: LeadNotification = serde_json::from_value(json!({
            "object": "page",
            "entry": [{"changes": [
                {"field": "feed", "value": {"item": "post"}},
                {"field": "leadgen", "value": {"leadgen_id": "L1"}}
            ]}]
        }))
        .unwrap();

        let summary = fx.pipeline.intake(&notification).await.unwrap();

        assert_eq!(summary.processed(), 1);
        assert_eq!(summary.leadgen_ids[0].as_str(), "L1");
        fx.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_ignores_non_page_objects() {
        let fx = fixture(Arc::new(OkFetcher));
        let notification: LeadNotification = serde_json::from_value(json!({
            "object": "instagram",
            "entry": [{"changes": [
                {"field": "leadgen", "value": {"leadgen_id": "L1"}}
            ]}]
        }))
        .unwrap();

        let summary = fx.pipeline.intake(&notification).await.unwrap();

        assert_eq!(summary.processed(), 0);
        assert!(fx.delivery.is_empty());
        fx.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_change_aborts_but_keeps_earlier_rows() {
        let fx = fixture(Arc::new(OkFetcher));
        let notification: LeadNotification = serde_json::from_value(json!({
            "object": "page",
            "entry": [{"changes": [
                {"field": "leadgen", "value": {"leadgen_id": "L1"}},
                {"field": "leadgen", "value": {"ad_id": "no-leadgen-id"}},
                {"field": "leadgen", "value": {"leadgen_id": "L3"}}
            ]}]
        }))
        .unwrap();

        let result = fx.pipeline.intake(&notification).await;

        assert!(matches!(result, Err(PipelineError::Payload { .. })));
        fx.pool.shutdown().await;

        let first = fx.delivery.get(&LeadgenId::new("L1").unwrap()).await.unwrap();
        assert!(first.is_some());
        let third = fx.delivery.get(&LeadgenId::new("L3").unwrap()).await.unwrap();
        assert!(third.is_none());
    }

    #[tokio::test]
    async fn test_redelivery_keeps_single_log_row() {
        let fx = fixture(Arc::new(OkFetcher));
        let notification = notification(&["L1"]);

        fx.pipeline.intake(&notification).await.unwrap();
        fx.pipeline.intake(&notification).await.unwrap();
        fx.pool.shutdown().await;

        assert_eq!(fx.delivery.len(), 1);
    }

    #[tokio::test]
    async fn test_marks_rows_error_when_queue_closed() {
        let fx = fixture(Arc::new(OkFetcher));
        fx.pool.shutdown().await;

        let summary = fx.pipeline.intake(&notification(&["L1"])).await.unwrap();

        // Still logged and reported; the row records the shed unit.
        assert_eq!(summary.processed(), 1);
        let record = fx
            .delivery
            .get(&LeadgenId::new("L1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, DeliveryStatus::Error);
        assert_eq!(record.error_message.as_deref(), Some(QUEUE_CLOSED_MESSAGE));
    }

    #[tokio::test]
    async fn test_marks_rows_error_when_queue_saturated() {
        let gate = Arc::new(Semaphore::new(0));
        let entered = Arc::new(Notify::new());
        let fx = fixture_with(
            Arc::new(GatedFetcher {
                gate: gate.clone(),
                entered: entered.clone(),
            }),
            WorkerPoolConfig {
                workers: 1,
                queue_capacity: 1,
            },
        );

        // Worker takes L1 and parks inside the fetch; L2 fills the queue.
        fx.pipeline.intake(&notification(&["L1"])).await.unwrap();
        entered.notified().await;
        fx.pipeline.intake(&notification(&["L2"])).await.unwrap();

        let summary = fx.pipeline.intake(&notification(&["L3"])).await.unwrap();
        assert_eq!(summary.processed(), 1);

        let shed = fx
            .delivery
            .get(&LeadgenId::new("L3").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shed.status, DeliveryStatus::Error);
        assert_eq!(shed.error_message.as_deref(), Some(QUEUE_SATURATED_MESSAGE));

        gate.add_permits(2);
        fx.pool.shutdown().await;

        let stats = fx.delivery.stats().await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.error, 1);
    }
}

mod reprocess_tests {
    use super::*;

    #[tokio::test]
    async fn test_resets_failed_rows_and_reruns_them() {
        let fx = fixture(Arc::new(OkFetcher));
        seed_error(&fx.delivery, "L1").await;
        seed_error(&fx.delivery, "L2").await;

        let summary = fx.pipeline.reprocess_failed().await.unwrap();

        assert_eq!(summary.reprocessed, 2);
        assert_eq!(summary.failed, 0);
        assert!(summary.is_success());

        let stats = fx.delivery.stats().await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.error, 0);
        assert_eq!(fx.store.len(), 2);
        fx.pool.shutdown().await;
    }

    /// One failure makes the whole run unsuccessful, regardless of how many
    /// entries recovered.
    #[tokio::test]
    async fn test_reports_strict_failure_flag() {
        let fx = fixture(Arc::new(AbsentFetcher));
        seed_error(&fx.delivery, "L1").await;
        seed_error(&fx.delivery, "L2").await;

        let summary = fx.pipeline.reprocess_failed().await.unwrap();

        assert_eq!(summary.reprocessed, 0);
        assert_eq!(summary.failed, 2);
        assert!(!summary.is_success());
        fx.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_counts_mixed_outcomes() {
        let fx = fixture(Arc::new(FailsFor {
            id: "L2".to_string(),
        }));
        seed_error(&fx.delivery, "L1").await;
        seed_error(&fx.delivery, "L2").await;

        let summary = fx.pipeline.reprocess_failed().await.unwrap();

        assert_eq!(summary.reprocessed, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_success());
        fx.pool.shutdown().await;
    }

    /// With more failures than the batch limit, one run touches only the 50
    /// most recently received entries; the oldest stay untouched.
    #[tokio::test]
    async fn test_touches_at_most_the_newest_batch() {
        let fx = fixture(Arc::new(OkFetcher));
        for i in 1..=60 {
            seed_error(&fx.delivery, &format!("L{}", i)).await;
        }

        let summary = fx.pipeline.reprocess_failed().await.unwrap();

        assert_eq!(summary.reprocessed, 50);
        let stats = fx.delivery.stats().await.unwrap();
        assert_eq!(stats.processed, 50);
        assert_eq!(stats.error, 10);

        let oldest = fx
            .delivery
            .get(&LeadgenId::new("L1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(oldest.status, DeliveryStatus::Error);
        let newest = fx
            .delivery
            .get(&LeadgenId::new("L60").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(newest.status, DeliveryStatus::Processed);
        fx.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_with_no_failed_rows_is_successful_noop() {
        let fx = fixture(Arc::new(OkFetcher));

        let summary = fx.pipeline.reprocess_failed().await.unwrap();

        assert_eq!(summary, ReprocessSummary::default());
        assert!(summary.is_success());
        fx.pool.shutdown().await;
    }
}

mod stats_tests {
    use super::*;

    #[tokio::test]
    async fn test_stats_reflect_row_statuses() {
        let fx = fixture(Arc::new(OkFetcher));
        fx.delivery.upsert_pending(&event("L1")).await.unwrap();
        fx.delivery.upsert_pending(&event("L2")).await.unwrap();
        seed_error(&fx.delivery, "L3").await;

        let stats = fx.pipeline.stats().await.unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.error, 1);
        fx.pool.shutdown().await;
    }
}

//! In-memory delivery log adapter.

use crate::{
    delivery::{DeliveryLog, DeliveryRecord, DeliveryStats, DeliveryStatus, StorageError},
    webhook::LeadEvent,
    LeadgenId, Timestamp,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Delivery log backed by a process-local map.
///
/// Rows do not survive a restart. Every operation takes the single map lock,
/// which gives it the per-row atomicity the trait requires.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeliveryLog {
    inner: Arc<RwLock<LogState>>,
}

#[derive(Debug, Default)]
struct LogState {
    rows: HashMap<LeadgenId, StoredRow>,
    arrivals: u64,
}

/// Row plus its arrival rank, which breaks `received_at` ties when ordering
/// recent errors.
#[derive(Debug, Clone)]
struct StoredRow {
    record: DeliveryRecord,
    arrival: u64,
}

impl InMemoryDeliveryLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().rows.len()
    }

    /// Whether the log holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeliveryLog for InMemoryDeliveryLog {
    async fn upsert_pending(&self, event: &LeadEvent) -> Result<(), StorageError> {
        let mut guard = self.inner.write().unwrap();
        let state = &mut *guard;

        match state.rows.get_mut(&event.leadgen_id) {
            Some(row) => {
                row.record.status = DeliveryStatus::Pending;
                row.record.error_message = None;
                row.record.updated_at = Timestamp::now();
            }
            None => {
                state.arrivals += 1;
                let row = StoredRow {
                    record: DeliveryRecord::pending(event),
                    arrival: state.arrivals,
                };
                state.rows.insert(event.leadgen_id.clone(), row);
            }
        }

        Ok(())
    }

    async fn claim_processing(&self, id: &LeadgenId) -> Result<bool, StorageError> {
        let mut guard = self.inner.write().unwrap();

        match guard.rows.get_mut(id) {
            Some(row) if row.record.status == DeliveryStatus::Pending => {
                row.record.status = DeliveryStatus::Processing;
                row.record.updated_at = Timestamp::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_status(
        &self,
        id: &LeadgenId,
        status: DeliveryStatus,
        error_message: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut guard = self.inner.write().unwrap();

        let row = guard.rows.get_mut(id).ok_or_else(|| StorageError::NotFound {
            leadgen_id: id.clone(),
        })?;
        row.record.status = status;
        row.record.error_message = error_message.map(|m| m.to_string());
        row.record.updated_at = Timestamp::now();

        Ok(())
    }

    async fn get(&self, id: &LeadgenId) -> Result<Option<DeliveryRecord>, StorageError> {
        let guard = self.inner.read().unwrap();
        Ok(guard.rows.get(id).map(|row| row.record.clone()))
    }

    async fn stats(&self) -> Result<DeliveryStats, StorageError> {
        let guard = self.inner.read().unwrap();

        let mut stats = DeliveryStats::default();
        for row in guard.rows.values() {
            stats.total += 1;
            match row.record.status {
                DeliveryStatus::Pending => stats.pending += 1,
                DeliveryStatus::Processing => stats.processing += 1,
                DeliveryStatus::Processed => stats.processed += 1,
                DeliveryStatus::Error => stats.error += 1,
            }
        }

        Ok(stats)
    }

    async fn recent_errors(&self, limit: usize) -> Result<Vec<DeliveryRecord>, StorageError> {
        let guard = self.inner.read().unwrap();

        let mut errors: Vec<&StoredRow> = guard
            .rows
            .values()
            .filter(|row| row.record.status == DeliveryStatus::Error)
            .collect();
        errors.sort_by(|a, b| {
            b.record
                .received_at
                .cmp(&a.record.received_at)
                .then(b.arrival.cmp(&a.arrival))
        });

        Ok(errors
            .into_iter()
            .take(limit)
            .map(|row| row.record.clone())
            .collect())
    }
}

#[cfg(test)]
#[path = "memory_delivery_log_tests.rs"]
mod tests;

//! In-memory lead store adapter.

use crate::{
    leads::{LeadStore, LeadStoreError, NewLead, StoredLead},
    Timestamp,
};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Lead store backed by a process-local list.
///
/// Assigns sequential row ids. Suited for tests and for running the pipeline
/// without an external store attached; created leads do not survive a
/// restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLeadStore {
    inner: Arc<RwLock<Vec<StoredLead>>>,
}

impl InMemoryLeadStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All leads created so far, in creation order.
    pub fn created(&self) -> Vec<StoredLead> {
        self.inner.read().unwrap().clone()
    }

    /// Number of leads created so far.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    /// Whether no leads have been created.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn create_lead(&self, lead: NewLead) -> Result<StoredLead, LeadStoreError> {
        let mut leads = self.inner.write().unwrap();

        let stored = StoredLead {
            id: leads.len() as u64 + 1,
            lead,
            created_at: Timestamp::now(),
        };
        leads.push(stored.clone());

        Ok(stored)
    }
}

#[cfg(test)]
#[path = "memory_lead_store_tests.rs"]
mod tests;

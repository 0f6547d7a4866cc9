//! # Worker Pool
//!
//! Bounded queue and fixed set of workers executing enrichment units
//! detached from the request path. Dispatch is a non-blocking `try_send`:
//! a full queue fails the dispatch instead of stalling the HTTP response,
//! and the caller records the shed unit in the delivery log.

use crate::{enrichment::EnrichmentProcessor, webhook::LeadEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

// ============================================================================
// Configuration
// ============================================================================

/// Options for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks. Clamped to at least one.
    pub workers: usize,

    /// Queue capacity; dispatch fails once this many units are waiting.
    /// Clamped to at least one.
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
        }
    }
}

/// Result of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Unit queued for a worker.
    Enqueued,
    /// Queue full; unit not queued.
    Saturated,
    /// Pool shut down; unit not queued.
    Closed,
}

// ============================================================================
// Pool
// ============================================================================

/// Fixed pool of enrichment workers fed from one bounded queue.
///
/// The pool holds the only sender for its queue. Shutdown takes and drops
/// that sender, which lets workers drain the remaining units and exit.
pub struct WorkerPool {
    sender: std::sync::Mutex<Option<mpsc::Sender<LeadEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start the configured number of workers over a fresh queue.
    pub fn start(config: WorkerPoolConfig, processor: EnrichmentProcessor) -> Self {
        let worker_count = config.workers.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let rx = rx.clone();
            let processor = processor.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, rx, processor).await;
            }));
        }

        tracing::info!(
            workers = worker_count,
            queue_capacity = config.queue_capacity.max(1),
            "enrichment worker pool started"
        );

        Self {
            sender: std::sync::Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    /// Queue one enrichment unit without blocking.
    pub fn dispatch(&self, event: LeadEvent) -> DispatchOutcome {
        let guard = self.sender.lock().unwrap();
        let Some(tx) = guard.as_ref() else {
            return DispatchOutcome::Closed;
        };

        match tx.try_send(event) {
            Ok(()) => DispatchOutcome::Enqueued,
            Err(mpsc::error::TrySendError::Full(_)) => DispatchOutcome::Saturated,
            Err(mpsc::error::TrySendError::Closed(_)) => DispatchOutcome::Closed,
        }
    }

    /// Stop accepting units, let workers drain the queue, and wait for them
    /// to exit. Safe to call more than once.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().unwrap().take();
        drop(sender);

        let handles = {
            let mut workers = self.workers.lock().await;
            std::mem::take(&mut *workers)
        };
        for handle in handles {
            if let Err(error) = handle.await {
                tracing::error!(error = %error, "enrichment worker exited abnormally");
            }
        }

        tracing::info!("enrichment worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<LeadEvent>>>,
    processor: EnrichmentProcessor,
) {
    tracing::debug!(worker_id, "enrichment worker started");

    loop {
        // Hold the receiver lock only while waiting for the next unit.
        let event = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(event) = event else {
            break;
        };

        let outcome = processor.enrich(&event).await;
        tracing::debug!(
            worker_id,
            leadgen_id = %event.leadgen_id,
            outcome = ?outcome,
            "enrichment unit finished"
        );
    }

    tracing::debug!(worker_id, "enrichment worker stopped");
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

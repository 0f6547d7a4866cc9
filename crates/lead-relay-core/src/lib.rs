//! # Lead Relay Core
//!
//! Core domain types and processing pipeline for Meta Lead Ads webhook
//! ingestion: signature verification, idempotent delivery logging, Graph API
//! fetch with bounded retry, lead enrichment, and reprocessing of failed
//! deliveries.
//!
//! ## Features
//!
//! - Webhook notification parsing and leadgen event extraction
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Delivery log with atomic pending→processing claims
//! - Graph API client with exponential backoff
//! - Bounded worker pool for detached enrichment
//! - In-memory adapters for development and testing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use uuid::Uuid;
use zeroize::Zeroizing;

pub mod adapters;
pub mod config;
pub mod delivery;
pub mod enrichment;
pub mod graph;
pub mod leads;
pub mod pipeline;
pub mod webhook;
pub mod worker;

pub use adapters::{EnvSettings, InMemoryDeliveryLog, InMemoryLeadStore};
pub use config::{ProviderSettings, SettingsError, SettingsProvider, StaticSettings};
pub use delivery::{DeliveryLog, DeliveryRecord, DeliveryStats, DeliveryStatus, StorageError};
pub use enrichment::{EnrichmentOutcome, EnrichmentProcessor};
pub use graph::{GraphError, GraphLead, LeadFetcher};
pub use leads::{LeadStore, LeadStoreError, NewLead, StoredLead};
pub use pipeline::{IntakeSummary, LeadPipeline, PipelineError, ReprocessSummary};
pub use webhook::{LeadEvent, LeadNotification};
pub use worker::{DispatchOutcome, WorkerPool, WorkerPoolConfig};

// ============================================================================
// Core Domain Types
// ============================================================================

/// Upstream provider's unique identifier for one lead-capture event.
///
/// This is the primary idempotency key of the pipeline: delivery log rows are
/// keyed by it, and redeliveries of the same id must collapse onto one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadgenId(String);

impl LeadgenId {
    /// Maximum accepted identifier length.
    pub const MAX_LENGTH: usize = 128;

    /// Create a new leadgen id with validation.
    ///
    /// Upstream ids are opaque strings; the rules here only reject values
    /// that cannot be a real identifier (empty, oversized, or containing
    /// whitespace/control characters).
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();

        if id.is_empty() {
            return Err(ValidationError::EmptyValue {
                field: "leadgen_id".to_string(),
            });
        }

        if id.len() > Self::MAX_LENGTH {
            return Err(ValidationError::TooLong {
                field: "leadgen_id".to_string(),
                max: Self::MAX_LENGTH,
                actual: id.len(),
            });
        }

        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::InvalidCharacters {
                field: "leadgen_id".to_string(),
            });
        }

        Ok(Self(id))
    }

    /// Get string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeadgenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LeadgenId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// UTC timestamp wrapper used across the delivery log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse from an RFC 3339 string.
    pub fn from_rfc3339(s: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(s).map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Format as RFC 3339.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Add whole seconds.
    pub fn add_seconds(&self, seconds: u64) -> Self {
        Self(self.0 + chrono::Duration::seconds(seconds as i64))
    }

    /// Duration elapsed since an earlier timestamp, zero if `earlier` is not
    /// actually earlier.
    pub fn duration_since(&self, earlier: Self) -> Duration {
        (self.0 - earlier.0).to_std().unwrap_or(Duration::ZERO)
    }

    /// Access the underlying `DateTime<Utc>`.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

/// Correlation identifier attached to each inbound request for log stitching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh correlation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Secret Handling
// ============================================================================

/// Container for secret material (signing secret, verify token, access
/// token).
///
/// The value is zeroized on drop and never appears in Debug output or logs.
#[derive(Clone)]
pub struct SecretString {
    inner: Zeroizing<String>,
}

impl SecretString {
    /// Wrap a secret value.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self {
            inner: Zeroizing::new(value.into()),
        }
    }

    /// Get the secret as a string slice, for immediate use only.
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    /// Get the secret as bytes, for immediate use only.
    pub fn expose_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Check whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Length without exposing content.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretString")
            .field("length", &self.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Bounded retry with exponential backoff.
///
/// The Graph Fetcher runs with the default policy: 3 attempts, waiting
/// 1000ms * 2^attempt between attempts (1s, then 2s) and never after the
/// final one.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Multiplier applied per completed attempt.
    pub backoff_multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff starting at one second and doubling.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Fixed delay between attempts. Used by tests to avoid real backoff
    /// waits.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            backoff_multiplier: 1.0,
            max_delay: delay,
        }
    }

    /// Whether another attempt is allowed after `completed_attempts`.
    pub fn should_retry(&self, completed_attempts: u32) -> bool {
        completed_attempts < self.max_attempts
    }

    /// Delay to wait after the given zero-based failed attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay = self.initial_delay.as_millis() as f64 * multiplier;
        let delay = Duration::from_millis(delay as u64);
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3)
    }
}

// ============================================================================
// Validation Errors
// ============================================================================

/// Errors from domain value validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    EmptyValue { field: String },

    #[error("{field} exceeds {max} characters (got {actual})")]
    TooLong {
        field: String,
        max: usize,
        actual: usize,
    },

    #[error("{field} contains invalid characters")]
    InvalidCharacters { field: String },
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

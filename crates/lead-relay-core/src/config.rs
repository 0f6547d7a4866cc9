//! # Provider Settings
//!
//! Injected, re-fetchable source of the provider-level options: verify
//! token, app secret, page access token, and Graph API version.
//!
//! Callers fetch a fresh snapshot at every point of use (handshake,
//! signature check, Graph fetch) so rotated credentials take effect without
//! a restart. Nothing in this module caches.

use crate::SecretString;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Graph API version used when none is configured.
pub const DEFAULT_GRAPH_API_VERSION: &str = "v19.0";

// ============================================================================
// Settings Snapshot
// ============================================================================

/// One snapshot of the provider-level options.
///
/// Each secret is optional: absence degrades the corresponding operation
/// (handshake, signature verification, Graph fetch) instead of crashing the
/// process. Empty values count as absent.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Token echoed back during the subscription handshake.
    pub verify_token: Option<SecretString>,

    /// Shared secret for webhook signature verification.
    pub app_secret: Option<SecretString>,

    /// Page access token for Graph API fetches.
    pub access_token: Option<SecretString>,

    /// Graph API version segment, e.g. `v19.0`.
    pub graph_api_version: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            verify_token: None,
            app_secret: None,
            access_token: None,
            graph_api_version: DEFAULT_GRAPH_API_VERSION.to_string(),
        }
    }
}

impl ProviderSettings {
    /// Set the verify token.
    pub fn with_verify_token(mut self, token: SecretString) -> Self {
        self.verify_token = Some(token);
        self
    }

    /// Set the app secret.
    pub fn with_app_secret(mut self, secret: SecretString) -> Self {
        self.app_secret = Some(secret);
        self
    }

    /// Set the page access token.
    pub fn with_access_token(mut self, token: SecretString) -> Self {
        self.access_token = Some(token);
        self
    }

    /// Override the Graph API version.
    pub fn with_graph_api_version(mut self, version: impl Into<String>) -> Self {
        self.graph_api_version = version.into();
        self
    }

    /// Whether a non-empty verify token is configured.
    pub fn has_verify_token(&self) -> bool {
        Self::present(&self.verify_token)
    }

    /// Whether a non-empty app secret is configured.
    pub fn has_app_secret(&self) -> bool {
        Self::present(&self.app_secret)
    }

    /// Whether a non-empty access token is configured.
    pub fn has_access_token(&self) -> bool {
        Self::present(&self.access_token)
    }

    /// Whether every webhook operation has the configuration it needs.
    pub fn is_fully_configured(&self) -> bool {
        self.has_verify_token() && self.has_app_secret() && self.has_access_token()
    }

    fn present(secret: &Option<SecretString>) -> bool {
        secret.as_ref().is_some_and(|s| !s.is_empty())
    }
}

// ============================================================================
// Provider Interface
// ============================================================================

/// Errors from settings retrieval.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings source unavailable: {message}")]
    Unavailable { message: String },

    #[error("invalid settings: {message}")]
    Invalid { message: String },
}

impl SettingsError {
    /// Check if the error is transient and worth a later retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, SettingsError::Unavailable { .. })
    }
}

/// Source of provider settings, fetched fresh per call.
///
/// Implementations must not hand out stale snapshots: the whole point of the
/// seam is that a rotated secret is picked up by the next request.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Fetch the current settings snapshot.
    async fn current(&self) -> Result<ProviderSettings, SettingsError>;
}

// ============================================================================
// Fixed Provider
// ============================================================================

/// Settings provider backed by a replaceable in-memory snapshot.
///
/// Used in tests and wherever settings are supplied directly instead of
/// through the environment. `replace` models credential rotation.
///
/// # Examples
///
/// ```
/// use lead_relay_core::{ProviderSettings, SecretString, SettingsProvider, StaticSettings};
///
/// # tokio_test::block_on(async {
/// let provider = StaticSettings::new(
///     ProviderSettings::default().with_verify_token(SecretString::from_string("tok")),
/// );
///
/// let settings = provider.current().await.unwrap();
/// assert!(settings.has_verify_token());
/// # });
/// ```
#[derive(Clone)]
pub struct StaticSettings {
    inner: Arc<RwLock<ProviderSettings>>,
}

impl StaticSettings {
    /// Create a provider serving the given snapshot.
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Swap in a new snapshot; subsequent `current` calls observe it.
    pub fn replace(&self, settings: ProviderSettings) {
        *self.inner.write().unwrap() = settings;
    }
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self::new(ProviderSettings::default())
    }
}

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn current(&self) -> Result<ProviderSettings, SettingsError> {
        Ok(self.inner.read().unwrap().clone())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

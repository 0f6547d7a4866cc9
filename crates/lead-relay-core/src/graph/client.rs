//! Reqwest-backed Graph API client.
//!
//! Builds `GET {base}/{version}/{leadgen_id}?access_token={token}` requests,
//! with the access token re-read from the settings provider per fetch and the
//! retry schedule taken from a [`RetryPolicy`]. The token is appended as a
//! query parameter and must never reach logs or error messages; reqwest
//! errors are stripped of their URL before formatting.

use crate::{
    config::SettingsProvider,
    graph::{GraphError, GraphLead, LeadFetcher},
    LeadgenId, RetryPolicy, SecretString,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Graph API origin used when none is configured.
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com";

/// Upstream error bodies are carried into delivery rows; cap their length.
const ERROR_BODY_LIMIT: usize = 512;

// ============================================================================
// Configuration
// ============================================================================

/// Options for the Graph API client.
#[derive(Debug, Clone)]
pub struct GraphClientConfig {
    /// Origin of the Graph API, scheme and host only.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// User-Agent header sent with every request.
    pub user_agent: String,

    /// Attempt count and backoff schedule for failed fetches.
    pub retry: RetryPolicy,
}

impl Default for GraphClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            user_agent: format!("lead-relay/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryPolicy::default(),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// HTTP implementation of [`LeadFetcher`] against the Meta Graph API.
pub struct GraphClient {
    http: reqwest::Client,
    config: GraphClientConfig,
    settings: Arc<dyn SettingsProvider>,
}

impl GraphClient {
    /// Create a client with the given options and settings source.
    pub fn new(
        config: GraphClientConfig,
        settings: Arc<dyn SettingsProvider>,
    ) -> Result<Self, GraphError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| GraphError::RequestFailed {
                message: format!("http client construction failed: {}", e),
            })?;

        Ok(Self {
            http,
            config,
            settings,
        })
    }

    fn lead_url(
        &self,
        version: &str,
        leadgen_id: &LeadgenId,
        token: &SecretString,
    ) -> Result<Url, GraphError> {
        let mut url = Url::parse(&self.config.base_url).map_err(|e| GraphError::RequestFailed {
            message: format!("invalid graph base url: {}", e),
        })?;

        url.path_segments_mut()
            .map_err(|_| GraphError::RequestFailed {
                message: "graph base url cannot carry path segments".to_string(),
            })?
            .pop_if_empty()
            .push(version)
            .push(leadgen_id.as_str());

        url.query_pairs_mut()
            .append_pair("access_token", token.expose_secret());

        Ok(url)
    }

    /// One HTTP attempt. Non-2xx statuses and undecodable bodies are
    /// failures like any network error.
    async fn try_fetch(&self, url: Url) -> Result<GraphLead, GraphError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| GraphError::RequestFailed {
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(ERROR_BODY_LIMIT)
                .collect();
            return Err(GraphError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<GraphLead>()
            .await
            .map_err(|e| GraphError::InvalidResponse {
                message: e.without_url().to_string(),
            })
    }
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("config", &self.config)
            .field("settings", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl LeadFetcher for GraphClient {
    /// Fetch the lead behind `leadgen_id` with retries.
    ///
    /// Returns `Err` only when no attempt could be made (settings source
    /// down, token or base URL unusable). Attempt failures are retried per
    /// the policy; exhaustion yields `Ok(None)`.
    async fn fetch_lead(&self, leadgen_id: &LeadgenId) -> Result<Option<GraphLead>, GraphError> {
        let settings = self
            .settings
            .current()
            .await
            .map_err(|e| GraphError::Settings {
                message: e.to_string(),
            })?;

        let token = settings
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(GraphError::AccessTokenMissing)?;

        let url = self.lead_url(&settings.graph_api_version, leadgen_id, &token)?;

        let mut attempt = 0u32;
        loop {
            match self.try_fetch(url.clone()).await {
                Ok(lead) => return Ok(Some(lead)),
                Err(error) => {
                    attempt += 1;
                    tracing::warn!(
                        leadgen_id = %leadgen_id,
                        attempt,
                        transient = error.is_transient(),
                        error = %error,
                        "graph api fetch attempt failed"
                    );

                    if !self.config.retry.should_retry(attempt) {
                        return Ok(None);
                    }
                    tokio::time::sleep(self.config.retry.backoff_delay(attempt - 1)).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

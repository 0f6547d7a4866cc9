//! Common test utilities for lead-relay-api integration tests
//!
//! This module provides:
//! - A scriptable [`LeadFetcher`] mock standing in for the Graph API
//! - Helper functions for creating wired test fixtures
//! - Request and payload builders for the webhook surface

use axum::body::Body;
use axum::http::Request;
use hmac::{Hmac, Mac};
use lead_relay_api::{create_router, AppState, ServiceConfig, ServiceMetrics};
use lead_relay_core::{
    config::{ProviderSettings, StaticSettings},
    graph::{GraphError, GraphLead, LeadFetcher, LeadFieldData},
    webhook::SignatureVerifier,
    EnrichmentProcessor, InMemoryDeliveryLog, InMemoryLeadStore, LeadPipeline, LeadgenId,
    SecretString, WorkerPool, WorkerPoolConfig,
};
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

/// App secret all fixture requests are signed with.
#[allow(dead_code)]
pub const TEST_APP_SECRET: &str = "integration-app-secret";

/// Verify token the fixture settings carry.
#[allow(dead_code)]
pub const TEST_VERIFY_TOKEN: &str = "integration-verify-token";

// ============================================================================
// Scripted Lead Fetcher
// ============================================================================

type FetchResult = Result<Option<GraphLead>, GraphError>;

/// Scriptable fetcher standing in for the Graph API client.
///
/// The default script answers every id with a filled-in lead. Tests flip the
/// script to absence or failure to drive the enrichment outcome, and can add
/// a delay to hold an enrichment unit open while the test observes the
/// intermediate state.
#[derive(Clone)]
#[allow(dead_code)]
pub struct ScriptedFetcher {
    calls: Arc<Mutex<Vec<LeadgenId>>>,
    result_factory: Arc<Mutex<Box<dyn Fn(&LeadgenId) -> FetchResult + Send + Sync>>>,
    fetch_delay: Arc<Mutex<Option<Duration>>>,
}

impl ScriptedFetcher {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            result_factory: Arc::new(Mutex::new(Box::new(|id| Ok(Some(sample_graph_lead(id)))))),
            fetch_delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Answer every fetch with a full lead payload.
    #[allow(dead_code)]
    pub fn set_success(&self) {
        *self.result_factory.lock().unwrap() = Box::new(|id| Ok(Some(sample_graph_lead(id))));
    }

    /// Answer every fetch with absence, as after exhausted retries.
    #[allow(dead_code)]
    pub fn set_absent(&self) {
        *self.result_factory.lock().unwrap() = Box::new(|_| Ok(None));
    }

    /// Answer every fetch with the given error.
    #[allow(dead_code)]
    pub fn set_error(&self, error: GraphError) {
        *self.result_factory.lock().unwrap() = Box::new(move |_| Err(error.clone()));
    }

    /// Hold each fetch open for `delay` before answering.
    #[allow(dead_code)]
    pub fn set_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<LeadgenId> {
        self.calls.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LeadFetcher for ScriptedFetcher {
    async fn fetch_lead(&self, leadgen_id: &LeadgenId) -> FetchResult {
        self.calls.lock().unwrap().push(leadgen_id.clone());

        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        (self.result_factory.lock().unwrap())(leadgen_id)
    }
}

/// A filled-in Graph API lead for the given id.
#[allow(dead_code)]
pub fn sample_graph_lead(id: &LeadgenId) -> GraphLead {
    GraphLead {
        id: id.to_string(),
        created_time: Some("2026-07-01T10:00:00+0000".to_string()),
        field_data: vec![
            LeadFieldData {
                name: "email".to_string(),
                values: vec!["ada@example.com".to_string()],
            },
            LeadFieldData {
                name: "full_name".to_string(),
                values: vec!["Ada Lovelace".to_string()],
            },
            LeadFieldData {
                name: "phone_number".to_string(),
                values: vec!["+15550100".to_string()],
            },
        ],
        ad_id: None,
        form_id: None,
        adgroup_id: None,
    }
}

// ============================================================================
// Test Fixture Builders
// ============================================================================

/// One fully wired service instance with handles on its seams.
#[allow(dead_code)]
pub struct TestService {
    pub state: AppState,
    pub delivery: Arc<InMemoryDeliveryLog>,
    pub store: Arc<InMemoryLeadStore>,
    pub pool: Arc<WorkerPool>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub settings: Arc<StaticSettings>,
}

impl TestService {
    /// Fresh router over this instance's state.
    #[allow(dead_code)]
    pub fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }

    /// Wait until every queued enrichment unit has run.
    #[allow(dead_code)]
    pub async fn drain(&self) {
        self.pool.shutdown().await;
    }
}

/// Create a wired test service with fully configured settings.
#[allow(dead_code)]
pub fn create_test_service() -> TestService {
    create_test_service_with_fetcher(Arc::new(ScriptedFetcher::new()))
}

/// Create a wired test service around a specific fetcher script.
#[allow(dead_code)]
pub fn create_test_service_with_fetcher(fetcher: Arc<ScriptedFetcher>) -> TestService {
    let settings = Arc::new(StaticSettings::new(
        ProviderSettings::default()
            .with_verify_token(SecretString::from_string(TEST_VERIFY_TOKEN))
            .with_app_secret(SecretString::from_string(TEST_APP_SECRET))
            .with_access_token(SecretString::from_string("integration-access-token")),
    ));

    let delivery = Arc::new(InMemoryDeliveryLog::new());
    let store = Arc::new(InMemoryLeadStore::new());

    let processor = EnrichmentProcessor::new(delivery.clone(), fetcher.clone(), store.clone());
    let pool = Arc::new(WorkerPool::start(
        WorkerPoolConfig::default(),
        processor.clone(),
    ));

    let pipeline = LeadPipeline::new(delivery.clone(), processor, pool.clone());
    let verifier = SignatureVerifier::new(settings.clone());

    let state = AppState::new(
        ServiceConfig::default(),
        pipeline,
        verifier,
        settings.clone(),
        Arc::new(ServiceMetrics::default()),
    );

    TestService {
        state,
        delivery,
        store,
        pool,
        fetcher,
        settings,
    }
}

// ============================================================================
// Request and Payload Builders
// ============================================================================

/// Compute the signature header value for `payload` under `secret`.
#[allow(dead_code)]
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Notification payload carrying one leadgen change per id.
#[allow(dead_code)]
pub fn lead_notification_body(leadgen_ids: &[&str]) -> String {
    let entries: Vec<serde_json::Value> = leadgen_ids
        .iter()
        .map(|id| {
            serde_json::json!({
                "id": "1010",
                "time": 1_700_000_000,
                "changes": [{
                    "field": "leadgen",
                    "value": {
                        "leadgen_id": id,
                        "ad_id": "5555",
                        "form_id": "6666",
                        "page_id": "1010",
                        "adgroup_id": "7777"
                    }
                }]
            })
        })
        .collect();

    serde_json::json!({
        "object": "page",
        "entry": entries
    })
    .to_string()
}

/// POST to the intake endpoint, signed with the fixture app secret.
#[allow(dead_code)]
pub fn signed_webhook_request(body: String) -> Request<Body> {
    let signature = sign_payload(TEST_APP_SECRET, body.as_bytes());

    Request::builder()
        .method("POST")
        .uri("/webhooks/meta-leads")
        .header("content-type", "application/json")
        .header("x-hub-signature-256", signature)
        .body(Body::from(body))
        .unwrap()
}

/// GET the handshake endpoint with the given `hub.*` query parameters.
#[allow(dead_code)]
pub fn verification_request(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
) -> Request<Body> {
    let mut pairs = Vec::new();
    if let Some(mode) = mode {
        pairs.push(format!("hub.mode={}", mode));
    }
    if let Some(token) = token {
        pairs.push(format!("hub.verify_token={}", token));
    }
    if let Some(challenge) = challenge {
        pairs.push(format!("hub.challenge={}", challenge));
    }

    let uri = if pairs.is_empty() {
        "/webhooks/meta-leads".to_string()
    } else {
        format!("/webhooks/meta-leads?{}", pairs.join("&"))
    };

    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Bare GET request for the given path.
#[allow(dead_code)]
pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Decode a response body as JSON.
#[allow(dead_code)]
pub async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Read a response body as text.
#[allow(dead_code)]
pub async fn response_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

//! # Lead-Relay HTTP Service
//!
//! HTTP server for receiving Meta Lead Ads webhooks and feeding them through
//! the Lead-Relay pipeline.
//!
//! This service provides:
//! - Subscription verification handshake for the webhook endpoint
//! - Signed notification intake with immediate acknowledgement
//! - Delivery stats and failed-delivery reprocessing endpoints
//! - Health check and Prometheus metrics endpoints



use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use lead_relay_core::{
    config::SettingsProvider,
    graph::client::{GraphClientConfig, DEFAULT_GRAPH_BASE_URL},
    webhook::{SignatureError, SignatureVerifier, SIGNATURE_HEADER},
    CorrelationId, DeliveryStats, LeadPipeline, LeadNotification, LeadgenId, PipelineError,
    RetryPolicy, Timestamp, WorkerPoolConfig,
};
use prometheus::TextEncoder;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{error, info, instrument, warn};

/// Header carrying the request correlation id, lowercase.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Expected `hub.mode` value during subscription verification.
pub const SUBSCRIBE_MODE: &str = "subscribe";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Pipeline handling intake, reprocessing, and stats
    pub pipeline: LeadPipeline,

    /// Verifier for webhook payload signatures
    pub verifier: SignatureVerifier,

    /// Provider settings source, re-read per request
    pub settings: Arc<dyn SettingsProvider>,

    /// Prometheus metrics registry handles
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        pipeline: LeadPipeline,
        verifier: SignatureVerifier,
        settings: Arc<dyn SettingsProvider>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            config,
            pipeline,
            verifier,
            settings,
            metrics,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Enrichment worker pool settings
    pub enrichment: EnrichmentConfig,

    /// Graph API client settings
    pub graph: GraphConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            enrichment: EnrichmentConfig::default(),
            graph: GraphConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Validate the whole configuration tree.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.enrichment.validate()?;
        self.graph.validate()?;
        self.logging.validate()
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            timeout_seconds: 30,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid {
                message: "server.host must not be empty".to_string(),
            });
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "server.timeout_seconds must be at least 1".to_string(),
            });
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Enrichment worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Number of enrichment workers
    pub workers: usize,

    /// Queued units accepted before intake sheds to the delivery log
    pub queue_capacity: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        let defaults = WorkerPoolConfig::default();
        Self {
            workers: defaults.workers,
            queue_capacity: defaults.queue_capacity,
        }
    }
}

impl EnrichmentConfig {
    /// Build the worker pool options from this section.
    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                message: "enrichment.workers must be at least 1".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "enrichment.queue_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Graph API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Graph API origin, scheme and host only
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// Fetch attempts per lead, including the first
    pub retry_max_attempts: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            timeout_seconds: 10,
            retry_max_attempts: 3,
        }
    }
}

impl GraphConfig {
    /// Build the Graph client options from this section.
    pub fn client_config(&self) -> GraphClientConfig {
        GraphClientConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
            retry: RetryPolicy::exponential(self.retry_max_attempts),
            ..GraphClientConfig::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.base_url).map_err(|e| ConfigError::Invalid {
            message: format!("graph.base_url is not a valid url: {}", e),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Invalid {
                message: format!("graph.base_url must be http or https, got {}", url.scheme()),
            });
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "graph.retry_max_attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(ConfigError::Invalid {
                message: format!("logging.level is not a valid level: {}", other),
            }),
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route("/webhooks/meta-leads", get(handle_subscription_verification))
        .route("/webhooks/meta-leads", post(handle_lead_webhook))
        .route("/webhooks/meta-leads/stats", get(handle_delivery_stats))
        .route("/webhooks/meta-leads/reprocess", post(handle_reprocess))
        .route("/webhooks/meta-leads/health", get(handle_webhook_health));

    let health_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/ready", get(handle_readiness_check));

    let observability_routes = Router::new().route("/metrics", get(metrics_endpoint));

    Router::new()
        .merge(webhook_routes)
        .merge(health_routes)
        .merge(observability_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    state.config.server.timeout_seconds,
                )))
                .layer(CompressionLayer::new())
                .layer(DefaultBodyLimit::max(state.config.server.max_body_size))
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
pub async fn start_server(
    config: ServiceConfig,
    pipeline: LeadPipeline,
    verifier: SignatureVerifier,
    settings: Arc<dyn SettingsProvider>,
) -> Result<(), ServiceError> {
    config.validate()?;

    let metrics = ServiceMetrics::new().map_err(|e| {
        ServiceError::Configuration(ConfigError::Invalid {
            message: format!("Failed to initialize metrics: {}", e),
        })
    })?;

    let address = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let state = AppState::new(config, pipeline, verifier, settings, metrics);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(address.as_str())
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| ServiceError::BindFailed {
            address,
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", local_addr);

    let shutdown_signal = async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C signal handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
            },
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
            },
        }
    };

    // In-flight requests are allowed to complete; new connections are refused
    // as soon as the signal arrives.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Handle the subscription verification handshake
///
/// The provider probes the endpoint with `hub.mode`, `hub.verify_token`, and
/// `hub.challenge` query parameters and expects the raw challenge string
/// echoed back. Checks run in a fixed order: parameter presence (400), then
/// server-side token configuration (500), then the token comparison itself
/// (403). The configured token is re-read per request so a rotation takes
/// effect without a restart.
#[instrument(skip(state, params))]
pub async fn handle_subscription_verification(
    State(state): State<AppState>,
    Query(params): Query<VerificationParams>,
) -> Result<String, WebhookHandlerError> {
    let mode = params
        .mode
        .as_deref()
        .ok_or(WebhookHandlerError::IncompleteVerification {
            parameter: "hub.mode",
        })?;
    let token = params
        .verify_token
        .as_deref()
        .ok_or(WebhookHandlerError::IncompleteVerification {
            parameter: "hub.verify_token",
        })?;
    let challenge = params
        .challenge
        .ok_or(WebhookHandlerError::IncompleteVerification {
            parameter: "hub.challenge",
        })?;

    let settings = state.settings.current().await.map_err(|e| {
        WebhookHandlerError::SettingsUnavailable {
            message: e.to_string(),
        }
    })?;
    let expected = settings
        .verify_token
        .filter(|t| !t.is_empty())
        .ok_or(WebhookHandlerError::VerifyTokenNotConfigured)?;

    if mode != SUBSCRIBE_MODE || token != expected.expose_secret() {
        warn!(mode = %mode, "Subscription verification rejected");
        return Err(WebhookHandlerError::VerificationRejected);
    }

    info!("Subscription verification accepted");
    Ok(challenge)
}

/// Handle lead notification intake
///
/// The provider enforces a short response deadline and re-delivers on slow
/// or failed responses, so this handler only verifies, logs, and enqueues:
/// 1. Verify the `X-Hub-Signature-256` header over the raw body
/// 2. Decode the notification payload
/// 3. Log each leadgen event as pending and enqueue its enrichment unit
/// 4. Return HTTP 200 immediately; enrichment completes in the background
///
/// After the signature passes, every outcome answers 200. Pipeline failures
/// are reported in the body (`success: false`) rather than the status line,
/// because a non-2xx here only triggers a redelivery storm.
#[instrument(skip(state, headers, body))]
pub async fn handle_lead_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LeadWebhookResponse>, WebhookHandlerError> {
    let started = std::time::Instant::now();

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = state.verifier.verify(&body, signature).await {
        state.metrics.signature_validation_failures.inc();
        state.metrics.record_webhook_request(started.elapsed());
        return Err(e.into());
    }

    let notification: LeadNotification = serde_json::from_slice(&body).map_err(|e| {
        WebhookHandlerError::UnreadablePayload {
            message: e.to_string(),
        }
    })?;

    let response = match state.pipeline.intake(&notification).await {
        Ok(summary) => {
            let processed = summary.processed();
            state.metrics.leads_accepted_total.inc_by(processed as u64);
            info!(processed, "Lead notification accepted");
            LeadWebhookResponse {
                success: true,
                message: format!("{} leads received", processed),
                processed,
                leadgen_ids: summary.leadgen_ids,
            }
        }
        Err(e) => {
            error!(error = %e, "Lead notification intake failed");
            LeadWebhookResponse {
                success: false,
                message: e.to_string(),
                processed: 0,
                leadgen_ids: Vec::new(),
            }
        }
    };

    state.metrics.record_webhook_request(started.elapsed());
    Ok(Json(response))
}

// ============================================================================
// Operations Handlers
// ============================================================================

/// Delivery stats grouped by status
#[instrument(skip(state))]
pub async fn handle_delivery_stats(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, WebhookHandlerError> {
    let stats = state.pipeline.stats().await?;
    Ok(Json(StatsResponse {
        success: true,
        stats,
    }))
}

/// Re-run enrichment for recently failed deliveries
///
/// Runs synchronously: the response reports how the batch actually fared.
/// The success flag is strict, `true` only when no entry failed.
#[instrument(skip(state))]
pub async fn handle_reprocess(
    State(state): State<AppState>,
) -> Result<Json<ReprocessResponse>, WebhookHandlerError> {
    info!("Reprocess of failed deliveries requested");
    state.metrics.reprocess_operations_total.inc();

    let summary = state.pipeline.reprocess_failed().await?;
    state
        .metrics
        .reprocess_failures_total
        .inc_by(summary.failed);

    Ok(Json(ReprocessResponse {
        success: summary.is_success(),
        message: format!(
            "{} reprocessed, {} failed",
            summary.reprocessed, summary.failed
        ),
        reprocessed: summary.reprocessed,
        failed: summary.failed,
    }))
}

/// Configuration-presence checks for the webhook endpoint
///
/// Reports which provider credentials are configured. Always answers 200;
/// the `status` field distinguishes a fully configured endpoint from a
/// degraded one. Only presence is reported, never the values.
#[instrument(skip(state))]
pub async fn handle_webhook_health(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, WebhookHandlerError> {
    let settings = state.settings.current().await.map_err(|e| {
        WebhookHandlerError::SettingsUnavailable {
            message: e.to_string(),
        }
    })?;

    let mut checks = HashMap::new();
    checks.insert(
        "verify_token".to_string(),
        presence_check(settings.has_verify_token()),
    );
    checks.insert(
        "app_secret".to_string(),
        presence_check(settings.has_app_secret()),
    );
    checks.insert(
        "access_token".to_string(),
        presence_check(settings.has_access_token()),
    );

    let status = if settings.is_fully_configured() {
        "healthy"
    } else {
        "degraded"
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        timestamp: Timestamp::now(),
        checks,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

fn presence_check(present: bool) -> HealthCheckResult {
    HealthCheckResult {
        healthy: present,
        message: if present {
            "configured".to_string()
        } else {
            "not configured".to_string()
        },
    }
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Basic liveness check
#[instrument(skip(state))]
async fn handle_health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let mut checks = HashMap::new();

    let delivery_log = match state.pipeline.stats().await {
        Ok(_) => HealthCheckResult {
            healthy: true,
            message: "reachable".to_string(),
        },
        Err(e) => HealthCheckResult {
            healthy: false,
            message: e.to_string(),
        },
    };
    checks.insert("delivery_log".to_string(), delivery_log);

    let settings = match state.settings.current().await {
        Ok(_) => HealthCheckResult {
            healthy: true,
            message: "reachable".to_string(),
        },
        Err(e) => HealthCheckResult {
            healthy: false,
            message: e.to_string(),
        },
    };
    checks.insert("settings".to_string(), settings);

    let is_healthy = checks.values().all(|c| c.healthy);

    let response = HealthResponse {
        status: if is_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: Timestamp::now(),
        checks,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    if is_healthy {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Readiness check for orchestrators
#[instrument(skip(state))]
async fn handle_readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    let ready = state.settings.current().await.is_ok();

    let response = ReadinessResponse {
        ready,
        timestamp: Timestamp::now(),
    };

    if ready {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

// ============================================================================
// Observability Handlers
// ============================================================================

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(_state): State<AppState>) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode_to_string(&metric_families)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// Extracts or generates a correlation id per request, logs request start
/// and completion with structured fields, and echoes the id back in the
/// response headers.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<CorrelationId>().ok())
        .unwrap_or_default();
    let correlation = correlation_id.to_string();

    tracing::Span::current().record("correlation_id", correlation.as_str());

    // Downstream handlers can pick the id up from extensions.
    request.extensions_mut().insert(correlation_id);

    info!(
        correlation_id = %correlation,
        method = %method,
        uri = %uri,
        "Request started"
    );

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation.parse() {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            correlation_id = %correlation,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

/// Metrics collection middleware
///
/// Records the request counter and duration histogram for every request,
/// whatever route it hits.
#[instrument(skip_all)]
async fn metrics_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let start = std::time::Instant::now();
    let response = next.run(request).await;
    state.metrics.record_http_request(start.elapsed());
    response
}

// ============================================================================
// Request Parameter Types
// ============================================================================

/// Query parameters of the subscription verification handshake
#[derive(Deserialize)]
pub struct VerificationParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,

    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,

    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

// Security: the candidate token must not reach logs or span fields
impl std::fmt::Debug for VerificationParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationParams")
            .field("mode", &self.mode)
            .field("verify_token", &self.verify_token.as_ref().map(|_| "<REDACTED>"))
            .field("challenge", &self.challenge)
            .finish()
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Webhook intake response
#[derive(Debug, Serialize)]
pub struct LeadWebhookResponse {
    pub success: bool,
    pub message: String,
    pub processed: usize,
    pub leadgen_ids: Vec<LeadgenId>,
}

/// Delivery stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: DeliveryStats,
}

/// Reprocess response
#[derive(Debug, Serialize)]
pub struct ReprocessResponse {
    pub success: bool,
    pub message: String,
    pub reprocessed: u64,
    pub failed: u64,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub checks: HashMap<String, HealthCheckResult>,
    pub version: String,
}

/// Health check result for individual components
#[derive(Debug, Serialize, Clone)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub message: String,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub timestamp: Timestamp,
}

// ============================================================================
// Error Types
// ============================================================================

/// Webhook handler errors with HTTP status code mapping
///
/// Status codes follow the provider's expectations at the boundary:
///
/// - `400 Bad Request`: incomplete handshake parameters or an unreadable
///   notification body
/// - `401 Unauthorized`: signature header absent
/// - `403 Forbidden`: signature or verify-token mismatch, malformed
///   signature header
/// - `500 Internal Server Error`: server-side misconfiguration (missing
///   signing secret or verify token, settings source down)
/// - `503 Service Unavailable`: transient storage failure, worth a retry
///
/// Messages returned to clients carry no secret material; details are
/// logged server-side with correlation ids.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Signature verification did not pass
    #[error("signature rejected: {source}")]
    Signature {
        #[from]
        source: SignatureError,
    },

    /// Body was empty or not decodable as a lead notification
    #[error("unreadable notification payload: {message}")]
    UnreadablePayload { message: String },

    /// Handshake request is missing a required query parameter
    #[error("verification request missing {parameter}")]
    IncompleteVerification { parameter: &'static str },

    /// Handshake mode or token did not match
    #[error("subscription verification rejected")]
    VerificationRejected,

    /// No verify token is configured server-side
    #[error("verify token not configured")]
    VerifyTokenNotConfigured,

    /// Settings source failed while serving the request
    #[error("settings unavailable: {message}")]
    SettingsUnavailable { message: String },

    /// Delivery log failed while serving a maintenance operation
    #[error("delivery log unavailable: {message}")]
    StorageUnavailable { message: String, transient: bool },
}

impl From<PipelineError> for WebhookHandlerError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Payload { source } => Self::UnreadablePayload {
                message: source.to_string(),
            },
            PipelineError::Storage { source } => Self::StorageUnavailable {
                transient: source.is_transient(),
                message: source.to_string(),
            },
        }
    }
}

impl axum::response::IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let (status, message, retry_after) = match self {
            Self::Signature { ref source } => {
                let status = match source {
                    SignatureError::MissingSignature => StatusCode::UNAUTHORIZED,
                    SignatureError::Mismatch | SignatureError::MalformedHeader { .. } => {
                        StatusCode::FORBIDDEN
                    }
                    SignatureError::SecretNotConfigured
                    | SignatureError::SettingsUnavailable { .. } => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                if status.is_server_error() {
                    error!(error = %source, "Signature verification unavailable");
                } else {
                    warn!(error = %source, "Webhook signature rejected");
                }
                (status, self.to_string(), None)
            }
            Self::UnreadablePayload { .. } | Self::IncompleteVerification { .. } => {
                warn!(error = %self, "Rejected malformed request");
                (StatusCode::BAD_REQUEST, self.to_string(), None)
            }
            Self::VerificationRejected => (StatusCode::FORBIDDEN, self.to_string(), None),
            Self::VerifyTokenNotConfigured | Self::SettingsUnavailable { .. } => {
                error!(error = %self, "Server-side configuration failure");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string(), None)
            }
            Self::StorageUnavailable { transient, .. } => {
                error!(error = %self, transient, "Delivery log failure");
                if transient {
                    (StatusCode::SERVICE_UNAVAILABLE, self.to_string(), Some(30))
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, self.to_string(), None)
                }
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_seconds) = retry_after {
            if let Ok(header_value) = retry_seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

// ============================================================================
// Metrics
// ============================================================================

/// Service metrics for observability
#[derive(Debug)]
pub struct ServiceMetrics {
    // HTTP request metrics
    pub http_requests_total: prometheus::IntCounter,
    pub http_request_duration: prometheus::Histogram,

    // Webhook intake metrics
    pub webhook_requests_total: prometheus::IntCounter,
    pub webhook_duration_seconds: prometheus::Histogram,
    pub signature_validation_failures: prometheus::IntCounter,
    pub leads_accepted_total: prometheus::IntCounter,

    // Maintenance operation metrics
    pub reprocess_operations_total: prometheus::IntCounter,
    pub reprocess_failures_total: prometheus::IntCounter,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        use prometheus::{register_histogram, register_int_counter};

        Ok(Arc::new(Self {
            http_requests_total: register_int_counter!(
                "http_requests_total",
                "Total number of HTTP requests",
            )?,
            http_request_duration: register_histogram!(
                "http_request_duration_seconds",
                "HTTP request processing time",
                vec![0.001, 0.01, 0.1, 1.0, 10.0]
            )?,
            webhook_requests_total: register_int_counter!(
                "webhook_requests_total",
                "Total lead webhook requests received"
            )?,
            webhook_duration_seconds: register_histogram!(
                "webhook_duration_seconds",
                "Webhook intake time distribution",
                vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0]
            )?,
            signature_validation_failures: register_int_counter!(
                "signature_validation_failures",
                "Failed webhook signature validations"
            )?,
            leads_accepted_total: register_int_counter!(
                "leads_accepted_total",
                "Leadgen events logged and enqueued for enrichment"
            )?,
            reprocess_operations_total: register_int_counter!(
                "reprocess_operations_total",
                "Reprocess runs initiated"
            )?,
            reprocess_failures_total: register_int_counter!(
                "reprocess_failures_total",
                "Entries that failed again during reprocess runs"
            )?,
        }))
    }

    pub fn record_http_request(&self, duration: std::time::Duration) {
        self.http_requests_total.inc();
        self.http_request_duration.observe(duration.as_secs_f64());
    }

    pub fn record_webhook_request(&self, duration: std::time::Duration) {
        self.webhook_requests_total.inc();
        self.webhook_duration_seconds
            .observe(duration.as_secs_f64());
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        // This is a stub implementation for testing
        // In production, use ServiceMetrics::new() instead
        use prometheus::{register_histogram, register_int_counter};

        // Use unique names with timestamp to avoid registration conflicts in tests
        let suffix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();

        Self {
            http_requests_total: register_int_counter!(
                format!("http_requests_total_test_{}", suffix),
                "Test HTTP requests"
            )
            .unwrap(),
            http_request_duration: register_histogram!(
                format!("http_request_duration_seconds_test_{}", suffix),
                "Test HTTP duration",
                vec![]
            )
            .unwrap(),
            webhook_requests_total: register_int_counter!(
                format!("webhook_requests_total_test_{}", suffix),
                "Test webhook requests"
            )
            .unwrap(),
            webhook_duration_seconds: register_histogram!(
                format!("webhook_duration_seconds_test_{}", suffix),
                "Test webhook duration",
                vec![]
            )
            .unwrap(),
            signature_validation_failures: register_int_counter!(
                format!("signature_validation_failures_test_{}", suffix),
                "Test signature validation failures"
            )
            .unwrap(),
            leads_accepted_total: register_int_counter!(
                format!("leads_accepted_total_test_{}", suffix),
                "Test leads accepted"
            )
            .unwrap(),
            reprocess_operations_total: register_int_counter!(
                format!("reprocess_operations_total_test_{}", suffix),
                "Test reprocess operations"
            )
            .unwrap(),
            reprocess_failures_total: register_int_counter!(
                format!("reprocess_failures_total_test_{}", suffix),
                "Test reprocess failures"
            )
            .unwrap(),
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

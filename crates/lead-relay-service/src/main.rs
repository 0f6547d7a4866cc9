//! # Lead-Relay Service
//!
//! Binary entry point for the Lead-Relay HTTP service.
//!
//! This executable:
//! - Loads configuration from environment and files
//! - Initializes logging from the resolved configuration
//! - Wires the delivery log, Graph API client, and enrichment worker pool
//! - Starts the HTTP server from lead-relay-api

use lead_relay_api::{start_server, LoggingConfig, ServiceConfig, ServiceError};
use lead_relay_core::{
    graph::GraphClient, webhook::SignatureVerifier, DeliveryLog, EnrichmentProcessor, EnvSettings,
    InMemoryDeliveryLog, InMemoryLeadStore, LeadPipeline, LeadStore, SettingsProvider, WorkerPool,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming an operator-supplied configuration file.
const CONFIG_FILE_VAR: &str = "LEAD_RELAY_CONFIG_FILE";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Sources (applied in order, later sources override earlier ones):
    //  1. /etc/lead-relay/service.yaml          system-wide defaults
    //  2. ./config/service.yaml                 deployment-local override
    //  3. Path given by LEAD_RELAY_CONFIG_FILE  operator-specified file
    //  4. Environment variables prefixed LEAD_RELAY__ (double-underscore
    //     separator), e.g. LEAD_RELAY__SERVER__PORT=9090 sets server.port
    //
    // All service configuration fields carry serde defaults, so absent files
    // or an entirely unconfigured environment produces a valid service config
    // with built-in defaults.  A malformed file or an environment variable
    // that cannot be coerced to the correct type IS a hard error because it
    // indicates deliberate-but-broken operator configuration.
    //
    // Meta credentials (META_VERIFY_TOKEN, META_APP_SECRET,
    // META_PAGE_ACCESS_TOKEN) are NOT part of this config tree: they are read
    // from the environment on every request so rotated values take effect
    // without a restart.
    // -------------------------------------------------------------------------
    let mut config_builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/lead-relay/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    // Optional explicit path supplied by the operator.
    let mut explicit_config_path = None;
    if let Ok(path) = std::env::var(CONFIG_FILE_VAR) {
        if !path.is_empty() {
            config_builder = config_builder.add_source(
                config::File::with_name(&path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
            explicit_config_path = Some(path);
        }
    }

    let config = match config_builder
        .add_source(config::Environment::with_prefix("LEAD_RELAY").separator("__"))
        .build()
    {
        Ok(cfg) => cfg,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            error!(error = %e, "Failed to build configuration; aborting");
            std::process::exit(3);
        }
    };

    let service_config: ServiceConfig = match config.try_deserialize() {
        Ok(sc) => sc,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            error!(
                error = %e,
                "Could not deserialize service configuration; aborting. \
                 Fix the configuration and restart."
            );
            std::process::exit(3);
        }
    };

    // Logging is driven by the resolved configuration, so it comes up only
    // after the config phase; failures above fall back to the default format.
    init_logging(&service_config.logging);

    info!("Starting Lead-Relay service");
    if let Some(path) = &explicit_config_path {
        info!(path = %path, "Configuration loaded from explicit path");
    }

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    // -------------------------------------------------------------------------
    // Wire the pipeline
    //
    // Secrets come from the META_* environment variables and are re-read on
    // every request.  The delivery log and lead store are the in-memory
    // adapters; both are process-local and reset on restart.
    // -------------------------------------------------------------------------
    let settings: Arc<dyn SettingsProvider> = Arc::new(EnvSettings::new());

    match settings.current().await {
        Ok(s) if s.is_fully_configured() => {
            info!(graph_api_version = %s.graph_api_version, "Meta credentials present");
        }
        Ok(s) => {
            warn!(
                verify_token = s.has_verify_token(),
                app_secret = s.has_app_secret(),
                access_token = s.has_access_token(),
                "One or more META_* credentials are missing; affected endpoints \
                 will refuse requests until they are provided"
            );
        }
        Err(e) => {
            warn!(error = %e, "Settings source unavailable at startup");
        }
    }

    let delivery: Arc<dyn DeliveryLog> = Arc::new(InMemoryDeliveryLog::new());
    let store: Arc<dyn LeadStore> = Arc::new(InMemoryLeadStore::new());

    let fetcher = match GraphClient::new(service_config.graph.client_config(), settings.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to construct Graph API client; aborting");
            std::process::exit(3);
        }
    };

    let processor = EnrichmentProcessor::new(delivery.clone(), fetcher, store);
    let pool = Arc::new(WorkerPool::start(
        service_config.enrichment.pool_config(),
        processor.clone(),
    ));

    let pipeline = LeadPipeline::new(delivery, processor, pool.clone());
    let verifier = SignatureVerifier::new(settings.clone());

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        workers = service_config.enrichment.workers,
        "Starting HTTP server"
    );

    let server_result = start_server(service_config, pipeline, verifier, settings).await;

    // Queued enrichment units would be lost if the pool were dropped while
    // still holding work, so the drain runs before any exit path.
    pool.shutdown().await;
    info!("Enrichment workers drained");

    if let Err(e) = server_result {
        error!("Failed to start server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }

    Ok(())
}

// ============================================================================
// Private helpers
// ============================================================================

/// Install the global tracing subscriber.
///
/// `RUST_LOG` always wins when set; otherwise the configured level drives a
/// per-crate default filter. The JSON layer is meant for deployments that
/// ship logs to an aggregator.
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "lead_relay_service={level},lead_relay_api={level},lead_relay_core={level},tower_http=debug",
            level = logging.level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

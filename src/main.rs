//! Aegis Core - Content Safety Gateway
//!
//! Sits between a conversational client and a generative-model backend,
//! screens every prompt and every model response against a versioned safety
//! policy, and derives operational counters from the decision traces.

use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePool;
use tokio::net::TcpListener;

mod api;
mod auth;
mod classifier;
mod config;
mod domain;
mod engine;
mod error;
mod gateway;
mod logging;
mod storage;
mod telemetry;

use crate::api::build_router;
use crate::auth::ApiKeyValidator;
use crate::classifier::{Classifier, LexiconClassifier, RemoteClassifier, RemoteClassifierConfig};
use crate::config::{ClassifierMode, Config};
use crate::domain::{ChartKind, DashboardLayout, Panel, PolicyDocument, TimeRange};
use crate::engine::{BuiltinWordLists, PolicyEvaluator, PolicyStore};
use crate::error::AegisResult;
use crate::gateway::{
    BackendConfig, ChatGateway, EchoBackend, OpenRouterBackend, TextGenerator,
};
use crate::storage::TraceStore;
use crate::telemetry::{
    rules_for_policy, standard_rules, LogCounterSink, MetricExtractor, TelemetryHandle,
    TelemetryPipeline,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The screening gateway.
    pub gateway: Arc<ChatGateway>,
    /// Active policy store.
    pub policies: Arc<PolicyStore>,
    /// Durable trace storage.
    pub traces: TraceStore,
    /// Telemetry pipeline handle.
    pub telemetry: TelemetryHandle,
    /// Dashboard projection.
    pub dashboard: Arc<DashboardLayout>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: No .env file loaded ({e})");
    }

    // Initialize logging
    logging::init();

    tracing::info!("Starting Aegis Core v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        database = %config.database.url,
        policy_path = %config.policy.path,
        auth_enabled = %config.auth.enabled,
        "Configuration loaded"
    );

    // Load and activate the safety policy. A document failing validation
    // stops startup; it is never partially applied.
    let policy = PolicyDocument::from_file(&config.policy.path)
        .map_err(|e| anyhow::anyhow!("Policy rejected: {}", e))?;
    tracing::info!(
        policy_id = %policy.id,
        version = policy.version,
        denied_topics = policy.denied_topics.len(),
        content_filters = policy.content_filters.len(),
        pii_rules = policy.sensitive_info_rules.len(),
        "Policy loaded"
    );
    let policies = Arc::new(PolicyStore::new(policy)?);

    // Connect to database
    let pool = SqlitePool::connect(&config.database.url)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to database");
            anyhow::anyhow!("Database connection error: {}", e)
        })?;

    let traces = TraceStore::new(pool);
    traces.init_schema().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to initialize database schema");
        anyhow::anyhow!("Schema initialization error: {}", e)
    })?;

    tracing::info!("Database connected and schema initialized");

    // Classifier adapter
    let classifier: Arc<dyn Classifier> = match config.classifier.mode {
        ClassifierMode::Remote if !config.classifier.api_key.is_empty() => {
            tracing::info!(model = %config.classifier.model, "Remote classifier enabled");
            Arc::new(RemoteClassifier::new(RemoteClassifierConfig {
                api_key: config.classifier.api_key.clone(),
                model: config.classifier.model.clone(),
                base_url: config.classifier.base_url.clone(),
                timeout_secs: config.classifier.timeout_secs,
            })?)
        }
        ClassifierMode::Remote => {
            tracing::warn!("Remote classifier requested but no API key; using lexicon classifier");
            Arc::new(LexiconClassifier::new())
        }
        ClassifierMode::Lexicon => {
            tracing::info!("Lexicon classifier enabled");
            Arc::new(LexiconClassifier::new())
        }
    };

    let evaluator = PolicyEvaluator::new(
        classifier,
        Arc::new(BuiltinWordLists::new()),
        config.evaluator.clone(),
    );

    // Metric rules: the standard set plus counters derived from the startup
    // policy. Registration validates every rule before it sees a trace.
    let mut rules = standard_rules();
    rules.extend(rules_for_policy(&policies.active()));
    let extractor = MetricExtractor::with_rules(rules)?;
    let counter_names = extractor.rule_names();

    let dashboard = Arc::new(overview_layout(&counter_names)?);

    let telemetry = TelemetryPipeline::spawn(
        extractor,
        config.telemetry.namespace.clone(),
        config.telemetry.queue_capacity,
        Duration::from_secs(config.telemetry.publish_interval_secs),
        Some(Arc::new(LogCounterSink::new("count"))),
    );

    // Model backend
    let backend: Arc<dyn TextGenerator> =
        if config.backend.enabled && !config.backend.api_key.is_empty() {
            tracing::info!(model = %config.backend.model, "Model backend enabled");
            Arc::new(OpenRouterBackend::new(BackendConfig {
                api_key: config.backend.api_key.clone(),
                model: config.backend.model.clone(),
                base_url: config.backend.base_url.clone(),
                timeout_secs: config.backend.timeout_secs,
            })?)
        } else {
            tracing::warn!("Model backend disabled; echo backend answers instead");
            Arc::new(EchoBackend)
        };

    let gateway = Arc::new(ChatGateway::new(
        evaluator,
        policies.clone(),
        backend,
        Some(Arc::new(traces.clone())),
        telemetry.clone(),
    ));

    // Authentication
    let api_key_validator = ApiKeyValidator::new(config.auth.api_keys.clone());
    if config.auth.enabled {
        tracing::info!(api_keys = config.auth.api_keys.len(), "Authentication enabled");
    } else {
        tracing::warn!("Authentication is DISABLED - enable for production");
    }

    // Build application state
    let state = AppState {
        gateway,
        policies,
        traces,
        telemetry,
        dashboard,
    };

    // Build router
    let app = build_router(state, config.auth.enabled, api_key_validator);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(address = %addr, "Server listening");
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// The built-in dashboard projection over the standard counter set.
fn overview_layout(counter_names: &[String]) -> AegisResult<DashboardLayout> {
    DashboardLayout::new(
        "safety-overview",
        vec![
            Panel {
                title: "Blocked share of requests".to_string(),
                chart: ChartKind::Ratio,
                counters: vec![
                    "invocations".to_string(),
                    "input_blocked".to_string(),
                    "output_blocked".to_string(),
                ],
                window: TimeRange::Last7d,
            },
            Panel {
                title: "Backend utilization".to_string(),
                chart: ChartKind::TimeSeries,
                counters: vec![
                    "invocations".to_string(),
                    "backend_invocations".to_string(),
                ],
                window: TimeRange::Last24h,
            },
            Panel {
                title: "Anonymized messages".to_string(),
                chart: ChartKind::TimeSeries,
                counters: vec!["messages_anonymized".to_string()],
                window: TimeRange::Last7d,
            },
            Panel {
                title: "Degraded evaluations".to_string(),
                chart: ChartKind::TimeSeries,
                counters: vec!["undetermined_checks".to_string()],
                window: TimeRange::Last24h,
            },
        ],
        counter_names,
    )
}

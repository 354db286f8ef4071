//! cerberus-worker - artifact analysis worker for the cerberus pipeline
//!
//! Uploads published by other services do not reach this process: the only
//! event bus wired here is the in-process one, fed by this worker's own
//! reanalysis requests. New uploads are picked up by the reconciliation
//! poll, so `WORKER_POLL_INTERVAL_SECS` bounds their latency.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cerberus_core::defaults::EVENT_BUS_CAPACITY;
use cerberus_core::{EmbeddingBackend, InProcessEventBus, VisionBackend};
use cerberus_db::{log_pool_metrics, Database, PgArtifactRepository, PgEmbeddingRepository, PoolConfig};
use cerberus_inference::{
    ClaudeAnalysisBackend, ClaudeVisionBackend, MetricsTracker, OpenAIEmbeddingBackend,
};
use cerberus_jobs::{
    AnalysisOrchestrator, EmbeddingsStage, ExtractorRegistry, FilesystemContentStore,
    WorkerBuilder, WorkerConfig,
};

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter
fn init_tracing() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "cerberus_worker=debug,cerberus_jobs=debug,cerberus_inference=info,cerberus_db=info,cerberus_core=info"
            .into()
    });
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("cerberus-worker.log");
        let (non_blocking, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(file_dir, file_name));

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(log_ansi.unwrap_or(false)),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    // Database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/cerberus".to_string());
    info!("Connecting to database...");
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env())
        .await
        .context("database connection failed")?;
    info!("Running database migrations...");
    db.migrate().await.context("database migration failed")?;
    log_pool_metrics(db.pool());

    // AI backends
    let metrics = Arc::new(
        MetricsTracker::default()
            .with_sink(Arc::new(cerberus_db::PgUsageRepository::new(db.pool().clone()))),
    );
    let analysis = ClaudeAnalysisBackend::from_env().context("analysis backend unavailable")?;

    let vision: Option<Arc<dyn VisionBackend>> = match ClaudeVisionBackend::from_env() {
        Some(backend) => {
            info!(model = backend.model_name(), "Vision backend initialized");
            Some(Arc::new(backend))
        }
        None => {
            warn!("Vision backend not configured, image OCR will fail");
            None
        }
    };

    let embedder = match OpenAIEmbeddingBackend::from_env() {
        Some(Ok(backend)) => {
            info!(
                model = EmbeddingBackend::model_name(&backend),
                dimension = backend.dimension(),
                "Embedding backend initialized"
            );
            Some(backend)
        }
        Some(Err(e)) => {
            warn!(error = %e, "Embedding backend misconfigured, embeddings disabled");
            None
        }
        None => {
            info!("OPENAI_API_KEY not set, embeddings disabled");
            None
        }
    };

    // Pipeline
    let artifacts = Arc::new(PgArtifactRepository::new(db.pool().clone()));
    let registry = ExtractorRegistry::standard(vision);
    for (name, healthy) in registry.health_check_all().await {
        if healthy {
            info!(extractor = %name, "Extractor ready");
        } else {
            warn!(extractor = %name, "Extractor health check failed");
        }
    }

    let capacity = std::env::var("EVENT_BUS_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(EVENT_BUS_CAPACITY);
    let bus = Arc::new(InProcessEventBus::new(capacity));
    info!(
        capacity,
        "In-process event bus only, external uploads arrive via the reconciliation poll"
    );

    let content = FilesystemContentStore::from_env();
    info!(root = %content.root().display(), "Artifact storage configured");

    let mut orchestrator = AnalysisOrchestrator::new(
        artifacts.clone(),
        Arc::new(content),
        Arc::new(registry),
        Arc::new(analysis),
        bus.clone(),
        metrics.clone(),
    );
    if let Some(embedder) = embedder {
        orchestrator = orchestrator.with_embeddings(EmbeddingsStage::new(
            Arc::new(embedder),
            artifacts,
            Arc::new(PgEmbeddingRepository::new(db.pool().clone())),
            metrics.clone(),
        ));
    }

    let worker = WorkerBuilder::new(orchestrator, bus)
        .with_config(WorkerConfig::from_env())
        .build();
    let handle = worker.start().await?;

    shutdown_signal().await;
    info!("Shutting down...");
    handle.shutdown().await;

    let snapshot = metrics.snapshot();
    info!(
        calls_total = snapshot.calls_total,
        calls_failed = snapshot.calls_failed,
        input_tokens = snapshot.input_tokens,
        output_tokens = snapshot.output_tokens,
        total_cost_usd = snapshot.total_cost_usd,
        "AI usage this run"
    );
    db.pool().close().await;
    Ok(())
}

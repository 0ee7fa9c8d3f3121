//! ocrjobs server
//!
//! Accepts document uploads over HTTP, runs recognition on a background
//! worker pool and serves job state and results from the SQLite store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;

use ocrjobs::config::loader::validate_config;
use ocrjobs::{
    load_config, Database, DocumentDecoder, HealthChecker, JobManager, OcrService,
    ParamValidator, RecognitionEngine, Recognizer, ServiceConfig, TesseractEngine, WorkerPool,
};

mod error;
mod handlers;
mod logging;
mod routes;
mod state;

use state::AppState;

const ORPHAN_MESSAGE: &str = "service restarted while the job was processing";

#[derive(Parser, Debug)]
#[command(name = "ocrjobs-server", version, about = "Asynchronous OCR job service")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "OCRJOBS_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8000
    #[arg(long, env = "OCRJOBS_BIND")]
    bind: Option<String>,

    /// SQLite database file
    #[arg(long, env = "OCRJOBS_DATABASE")]
    database: Option<String>,

    /// Number of recognition workers
    #[arg(long, env = "OCRJOBS_WORKERS")]
    workers: Option<usize>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn resolve_config(&self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => ServiceConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        if let Some(database) = &self.database {
            config.database_path = database.clone();
        }
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }

        validate_config(&config)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json)?;

    let config = cli.resolve_config()?;
    tracing::info!("Starting ocrjobs server v{}", env!("CARGO_PKG_VERSION"));

    let database_path = PathBuf::from(&config.database_path);
    let db = Database::open(&database_path)
        .with_context(|| format!("opening database {}", database_path.display()))?;
    tracing::info!("Database initialized at {}", database_path.display());

    let manager = JobManager::new(db.clone());
    recover_orphans(&manager, config.fail_orphans_on_startup)?;

    let engine: Arc<dyn RecognitionEngine> =
        Arc::new(TesseractEngine::new(config.ocr.tesseract_path.as_str()));
    let validator = match ParamValidator::from_engine(engine.as_ref(), &config.ocr) {
        Ok(validator) => validator,
        Err(e) => {
            tracing::warn!(
                "Could not list installed languages: {}. Every submission will be rejected until the engine is available and the server restarts",
                e
            );
            ParamValidator::new(Vec::new()).with_defaults(
                config.ocr.default_language.clone(),
                config.ocr.default_segmentation_mode,
            )
        }
    };

    let recognizer = Recognizer::new(engine.clone(), DocumentDecoder::new(&config.ocr));
    let pool = WorkerPool::new(manager.clone(), recognizer, config.worker_count)
        .context("starting worker pool")?;
    tracing::info!("Worker pool started with {} workers", config.worker_count);

    let health = HealthChecker::new(
        db.clone(),
        engine,
        database_path.clone(),
        config.health.min_free_disk_bytes,
    );
    let service = OcrService::new(manager, Arc::new(pool), validator, health);

    let app = routes::create_router(AppState::new(service.clone()), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("binding {}", config.bind_address))?;
    tracing::info!("ocrjobs server listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("HTTP server stopped, draining workers");
    tokio::task::spawn_blocking(move || service.shutdown())
        .await
        .context("stopping worker pool")?;

    if let Err(e) = db.close() {
        tracing::warn!("Database not closed cleanly: {}", e);
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Jobs still `processing` were owned by a previous process.
fn recover_orphans(manager: &JobManager, fail: bool) -> anyhow::Result<()> {
    let orphans = manager.orphaned_jobs()?;
    if orphans.is_empty() {
        return Ok(());
    }

    if fail {
        let failed = manager.fail_orphans(ORPHAN_MESSAGE)?;
        tracing::warn!("Failed {} job(s) orphaned by a previous run", failed);
    } else {
        tracing::warn!(
            "{} job(s) left in processing by a previous run: {}",
            orphans.len(),
            orphans.join(", ")
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

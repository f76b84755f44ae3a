use anpr_ingest::api::rest::{AppState, RestApi};
use anpr_ingest::config;
use anpr_ingest::db::repositories::{SitesRepository, VehiclesRepository};
use anpr_ingest::db::DatabaseService;
use anpr_ingest::retention::EventRetentionService;
use anpr_ingest::services::PgEventStore;
use anpr_ingest::storage::{EvidenceStore, S3EvidenceStore};
use anyhow::Result;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// `--config <path>` wins over `ANPR_CONFIG`
fn config_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    std::env::var("ANPR_CONFIG")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

async fn run_app() -> Result<()> {
    let config = config::load_config(config_path().as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.api.log_level.as_str()),
    )
    .init();
    info!("Starting ANPR ingest service v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(config);
    let db = DatabaseService::new(&config.database).await?;

    let store = Arc::new(PgEventStore::new(db.pool.clone()));
    let registry = Arc::new(VehiclesRepository::new(db.pool.clone()));
    let sites = Arc::new(SitesRepository::new(
        db.pool.clone(),
        &config.sites.camera_aliases,
    ));

    let evidence: Option<Arc<dyn EvidenceStore>> = if config.evidence.is_configured() {
        Some(Arc::new(S3EvidenceStore::new(&config.evidence)?))
    } else {
        warn!("Evidence storage is not configured; photos will not be uploaded");
        None
    };

    let shutdown = CancellationToken::new();
    let state = AppState::new(
        config.clone(),
        store,
        registry,
        sites,
        evidence,
        shutdown.clone(),
    );

    let retention = Arc::new(EventRetentionService::new(
        config.retention.clone(),
        state.events.clone(),
    ));
    let retention_task = retention.start(shutdown.clone());

    let mut server = tokio::spawn(RestApi::new(state).run());

    let server_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down...");
            shutdown.cancel();
            server.await
        }
        result = &mut server => {
            shutdown.cancel();
            result
        }
    };

    match server_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("API server error: {:#}", e),
        Err(e) => error!("API server task failed: {}", e),
    }
    if let Some(task) = retention_task {
        if let Err(e) = task.await {
            error!("Retention task failed: {}", e);
        }
    }

    db.pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}

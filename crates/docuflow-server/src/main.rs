//! docuflow-server — HTTP API and pipeline host.
//!
//! Wires the inbox watcher, ingestion queue, worker pool and document
//! store together and exposes the dashboard-facing API.

mod error;
mod routes;
mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use docuflow::{
    load_config, Database, InboxWatcher, IngestionQueue, ProcessingConfig, ProcessingRouter,
    ResultPublisher, WorkerPool,
};

use state::AppState;

const DEFAULT_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting docuflow-server v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(load_configuration()?);
    std::fs::create_dir_all(&config.inbox_directory)?;

    let db_path = docuflow::db::resolve_database_path(config.database_path.as_deref())
        .ok_or("could not resolve a database path")?;
    let db = Database::open(&db_path)?;

    let publisher = ResultPublisher::default();
    let queue = Arc::new(IngestionQueue::new(config.retry_policy()));
    let router = Arc::new(ProcessingRouter::new(
        db.clone(),
        Arc::clone(&config),
        publisher.clone(),
    ));
    let pool = WorkerPool::start(
        Arc::clone(&queue),
        router,
        config.effective_worker_count(),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let watcher_handle = start_watcher(&config, Arc::clone(&queue), Arc::clone(&shutdown));
    log_terminal_events(&publisher);

    let app = routes::create_router(AppState::new(
        db,
        Arc::clone(&queue),
        publisher,
        Arc::clone(&config),
    ));

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = format!("0.0.0.0:{}", port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    shutdown.store(true, Ordering::Relaxed);
    pool.shutdown();
    pool.wait();
    if let Some(handle) = watcher_handle {
        let _ = handle.join();
    }
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("docuflow=info,docuflow_server=info,tower_http=info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Config file path comes from the first CLI argument or
/// `DOCUFLOW_CONFIG`. The file is validated against the embedded schema.
fn load_configuration() -> Result<ProcessingConfig, Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("DOCUFLOW_CONFIG").ok())
        .ok_or("usage: docuflow-server <config.json> (or set DOCUFLOW_CONFIG)")?;
    let config = load_config(&path)?;
    info!(
        "Configuration loaded from {} (inbox {}, threshold {})",
        path,
        config.inbox_directory.display(),
        config.confidence_threshold
    );
    Ok(config)
}

/// Catch-up scan of the inbox, then a background watch thread feeding
/// the ingestion queue until shutdown.
fn start_watcher(
    config: &ProcessingConfig,
    queue: Arc<IngestionQueue>,
    shutdown: Arc<AtomicBool>,
) -> Option<std::thread::JoinHandle<()>> {
    let watcher = InboxWatcher::new(&config.inbox_directory);

    match watcher.scan() {
        Ok(events) => {
            for event in events {
                if let Err(e) = queue.enqueue(event) {
                    error!("Failed to enqueue scanned object: {}", e);
                }
            }
        }
        Err(e) => warn!("Inbox catch-up scan failed: {}", e),
    }

    let handle = std::thread::Builder::new()
        .name("inbox-watcher".to_string())
        .spawn(move || {
            let enqueue = move |event| {
                if let Err(e) = queue.enqueue(event) {
                    error!("Failed to enqueue watched object: {}", e);
                }
            };
            if let Err(e) = watcher.watch(enqueue, shutdown) {
                error!("Inbox watch failed: {}", e);
            }
        });

    match handle {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("Failed to start inbox watcher thread: {}", e);
            None
        }
    }
}

/// Keeps a subscriber on the result channel so terminal events land in
/// the server log even with no external consumer attached.
fn log_terminal_events(publisher: &ResultPublisher) {
    let mut rx = publisher.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!(
                    document_id = %event.document_id,
                    status = %event.status,
                    generation = event.generation,
                    confidence = event.confidence,
                    "Document reached terminal state"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Result subscriber lagged, skipped {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

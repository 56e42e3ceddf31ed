//! Shared application state handed to every request handler.

use std::sync::Arc;

use docuflow::{Database, ExceptionEngine, IngestionQueue, ProcessingConfig, ResultPublisher};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub queue: Arc<IngestionQueue>,
    pub engine: Arc<ExceptionEngine>,
    pub publisher: ResultPublisher,
    pub config: Arc<ProcessingConfig>,
}

impl AppState {
    pub fn new(
        db: Database,
        queue: Arc<IngestionQueue>,
        publisher: ResultPublisher,
        config: Arc<ProcessingConfig>,
    ) -> Self {
        let engine = Arc::new(ExceptionEngine::new(db.clone(), Arc::clone(&config)));
        Self {
            db,
            queue,
            engine,
            publisher,
            config,
        }
    }
}

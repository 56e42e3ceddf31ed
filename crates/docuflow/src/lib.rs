pub mod adapter;
pub mod classify;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod queue;
pub mod rules;
pub mod watcher;
pub mod worker;

pub use config::{load_config, ProcessingConfig};
pub use db::Database;
pub use engine::{BulkResolveOutcome, ExceptionEngine};
pub use error::{
    AdapterError, ConfigError, DocuflowError, EngineError, QueueError, Result, WorkerError,
};
pub use evaluate::{Assessment, ConfidenceEvaluator};
pub use model::{
    DocType, DocumentStatus, ExceptionCategory, ExceptionPriority, ExceptionStatus, ProcessorKind,
};
pub use pipeline::{request_reprocess, HandleOutcome, ProcessingRouter};
pub use publish::{DocumentProcessedEvent, ResultPublisher};
pub use queue::{IngestionEvent, IngestionQueue, RetryPolicy};
pub use watcher::InboxWatcher;
pub use worker::WorkerPool;

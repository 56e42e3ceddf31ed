use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocuflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Exception engine error: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Failure modes of a single extraction adapter call.
///
/// Transient failures are retried within the same processing attempt;
/// permanent failures advance the chain to the next adapter immediately.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Transient extraction failure: {0}")]
    Transient(String),

    #[error("Permanent extraction failure: {0}")]
    Permanent(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Ingestion channel closed unexpectedly")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Inbox scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Watch error: {0}")]
    WatchError(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Exception '{0}' not found")]
    NotFound(String),

    #[error("Document '{0}' not found")]
    DocumentNotFound(String),

    #[error("Exception '{id}' is already {status}")]
    AlreadyTerminal { id: String, status: String },

    #[error("Invalid document status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, DocuflowError>;

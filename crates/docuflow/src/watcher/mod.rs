//! Object store watcher — detects finalized uploads in the inbox area and
//! emits one ingestion event per object.
//!
//! The inbox is a watched directory: `scan` walks its top level for
//! catch-up at startup, `watch` picks up new objects as they land. The
//! object generation derives from the file's modified time, so a
//! re-uploaded object always carries a newer generation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use log::{debug, error, info, warn};
use notify::{Config as NotifyConfig, PollWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer_opt, Config as DebouncerConfig, DebouncedEventKind};
use walkdir::WalkDir;

use crate::error::WorkerError;
use crate::queue::IngestionEvent;

/// Upload formats accepted for extraction.
const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "csv", "xlsx", "xls", "txt"];

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let lowered = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&lowered.as_str())
        })
        .unwrap_or(false)
}

/// Builds the finalize notification for one inbox object. Returns `None`
/// when the file vanished between detection and stat.
pub fn event_for(path: &Path) -> Option<IngestionEvent> {
    let metadata = std::fs::metadata(path).ok()?;
    let object_generation = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    let content_type = mime_guess::from_path(path).first().map(|m| m.to_string());

    Some(IngestionEvent {
        storage_path: path.to_string_lossy().into_owned(),
        object_generation,
        size_bytes: Some(metadata.len() as i64),
        content_type,
    })
}

pub struct InboxWatcher {
    inbox: PathBuf,
}

impl InboxWatcher {
    pub fn new<P: AsRef<Path>>(inbox: P) -> Self {
        Self {
            inbox: inbox.as_ref().to_path_buf(),
        }
    }

    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    /// Catch-up scan: one event per supported file at the inbox top
    /// level. Subdirectories are not part of the inbox area.
    pub fn scan(&self) -> Result<Vec<IngestionEvent>, WorkerError> {
        let mut events = Vec::new();

        for entry in WalkDir::new(&self.inbox).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| WorkerError::ScanFailed {
                path: self.inbox.clone(),
                source: e,
            })?;
            let path = entry.path();

            if path.is_dir() || !is_supported(path) {
                continue;
            }

            if let Some(event) = event_for(path) {
                debug!("Found inbox object: {}", path.display());
                events.push(event);
            }
        }

        info!(
            "Scanned {} objects in {}",
            events.len(),
            self.inbox.display()
        );
        Ok(events)
    }

    /// Watches the inbox for new finalized objects until shutdown,
    /// invoking the callback once per detected object.
    ///
    /// Uses a debounced PollWatcher so partially written uploads settle
    /// before an event fires, and so network/container mounts work.
    pub fn watch<F>(&self, callback: F, shutdown: Arc<AtomicBool>) -> Result<(), WorkerError>
    where
        F: Fn(IngestionEvent) + Send + 'static,
    {
        let poll_config = NotifyConfig::default().with_poll_interval(Duration::from_secs(2));
        let debouncer_config = DebouncerConfig::default()
            .with_timeout(Duration::from_millis(500))
            .with_notify_config(poll_config);

        let (tx, rx) = std::sync::mpsc::channel();

        let mut debouncer = new_debouncer_opt::<_, PollWatcher>(debouncer_config, tx)
            .map_err(|e| WorkerError::WatchError(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&self.inbox, RecursiveMode::NonRecursive)
            .map_err(|e| WorkerError::WatchError(e.to_string()))?;

        info!("Watching inbox: {}", self.inbox.display());

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Inbox watch shutting down...");
                break;
            }

            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(Ok(events)) => {
                    for event in events {
                        if !matches!(event.kind, DebouncedEventKind::Any) {
                            continue;
                        }
                        let path = &event.path;
                        if path.is_dir() || !is_supported(path) {
                            continue;
                        }
                        // Deleted before the debounce settled.
                        let Some(ingestion) = event_for(path) else {
                            continue;
                        };
                        info!("New inbox object: {}", path.display());
                        callback(ingestion);
                    }
                }
                Ok(Err(errors)) => {
                    warn!("Inbox watch error: {:?}", errors);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Inbox watch channel disconnected");
                    break;
                }
            }
        }

        Ok(())
    }
}

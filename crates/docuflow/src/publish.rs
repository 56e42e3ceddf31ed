//! Result publisher — emits one terminal event per document attempt for
//! downstream consumers.
//!
//! Backed by a `tokio::sync::broadcast` channel; lagging or absent
//! subscribers never block the pipeline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::DocumentStatus;

/// Emitted exactly once per terminal store write, including failures and
/// dead-lettered events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProcessedEvent {
    pub document_id: String,
    pub storage_path: String,
    pub status: DocumentStatus,
    pub generation: i64,
    /// Aggregate confidence of the finalized extraction; `None` for
    /// pipeline failures where no extraction was persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Clone)]
pub struct ResultPublisher {
    sender: Arc<broadcast::Sender<DocumentProcessedEvent>>,
}

impl ResultPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publishes a terminal event. No active receivers is fine.
    pub fn publish(&self, event: DocumentProcessedEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocumentProcessedEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ResultPublisher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, status: DocumentStatus) -> DocumentProcessedEvent {
        DocumentProcessedEvent {
            document_id: id.to_string(),
            storage_path: format!("/inbox/{}.pdf", id),
            status,
            generation: 0,
            confidence: Some(0.9),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let publisher = ResultPublisher::new(4);
        publisher.publish(event("d1", DocumentStatus::Processed));
    }

    #[test]
    fn test_subscriber_receives_events() {
        let publisher = ResultPublisher::new(4);
        let mut rx = publisher.subscribe();

        publisher.publish(event("d1", DocumentStatus::Processed));
        publisher.publish(event("d2", DocumentStatus::Failed));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.document_id, "d1");
        assert_eq!(first.status, DocumentStatus::Processed);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.status, DocumentStatus::Failed);
    }

    #[test]
    fn test_clone_shares_channel() {
        let publisher = ResultPublisher::new(4);
        let clone = publisher.clone();
        let mut rx = publisher.subscribe();

        clone.publish(event("d3", DocumentStatus::NeedsReview));
        assert_eq!(rx.try_recv().unwrap().document_id, "d3");
    }
}

//! Processing router — drives one ingestion event end-to-end through the
//! attempt state machine: dedupe/claim, classification, the adapter chain,
//! confidence evaluation, persistence and exception generation.
//!
//! Delivery is at-least-once, so every step here is idempotent. All store
//! mutations are conditional on `(id, generation, expected status)`; a
//! write that matches zero rows means this attempt was superseded and its
//! result is discarded.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use crate::adapter::{AdapterRegistry, Extraction, ExtractionAdapter};
use crate::classify;
use crate::config::ProcessingConfig;
use crate::db::document_repo::{self, DocumentRow, ExtractionOutcome};
use crate::db::exception_repo::{self, ExceptionRow};
use crate::db::{Database, DatabaseError};
use crate::error::{AdapterError, EngineError};
use crate::evaluate::{ChainDecision, ConfidenceEvaluator, Finding};
use crate::model::{DocType, DocumentStatus, ExceptionCategory, ExceptionPriority};
use crate::publish::{DocumentProcessedEvent, ResultPublisher};
use crate::queue::{Delivery, IngestionEvent, IngestionQueue};
use crate::rules;

/// Bounded local retries for store writes that hit transient SQLite
/// contention.
const PERSISTENCE_RETRIES: u32 = 3;

/// What the worker should do with the delivery.
#[derive(Debug)]
pub enum HandleOutcome {
    /// Acknowledge: processed, duplicate, or superseded.
    Ack,
    /// Attempt failed; the queue decides between redelivery and
    /// dead-lettering.
    Retry { error: String },
}

enum AttemptError {
    /// Duplicate or superseded delivery; acknowledge without processing.
    Skip(String),
    /// A newer generation won the race mid-flight; discard silently.
    Stale,
    /// The attempt failed; persist the failure and re-queue.
    Retryable(String),
}

impl From<DatabaseError> for AttemptError {
    fn from(e: DatabaseError) -> Self {
        AttemptError::Retryable(format!("store write failed: {}", e))
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn file_name_of(storage_path: &str) -> String {
    Path::new(storage_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| storage_path.to_string())
}

pub struct ProcessingRouter {
    db: Database,
    registry: AdapterRegistry,
    evaluator: ConfidenceEvaluator,
    config: Arc<ProcessingConfig>,
    publisher: ResultPublisher,
}

impl ProcessingRouter {
    pub fn new(db: Database, config: Arc<ProcessingConfig>, publisher: ResultPublisher) -> Self {
        let registry = AdapterRegistry::from_config(&config);
        Self::with_registry(db, config, publisher, registry)
    }

    /// Constructor with an injected adapter registry.
    pub fn with_registry(
        db: Database,
        config: Arc<ProcessingConfig>,
        publisher: ResultPublisher,
        registry: AdapterRegistry,
    ) -> Self {
        let evaluator =
            ConfidenceEvaluator::new(config.confidence_threshold, config.strict_validation);
        Self {
            db,
            registry,
            evaluator,
            config,
            publisher,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Processes one delivery end-to-end.
    pub fn handle(&self, delivery: &Delivery) -> HandleOutcome {
        let mut claim: Option<(String, i64)> = None;
        match self.process(delivery, &mut claim) {
            Ok(status) => {
                debug!(
                    storage_path = %delivery.event.storage_path,
                    status = %status,
                    "Attempt finished"
                );
                HandleOutcome::Ack
            }
            Err(AttemptError::Skip(reason)) => {
                debug!(
                    storage_path = %delivery.event.storage_path,
                    reason = %reason,
                    "Acknowledging delivery without processing"
                );
                HandleOutcome::Ack
            }
            Err(AttemptError::Stale) => {
                debug!(
                    storage_path = %delivery.event.storage_path,
                    "Discarding stale-generation result"
                );
                HandleOutcome::Ack
            }
            Err(AttemptError::Retryable(error)) => {
                if let Some((id, generation)) = claim {
                    let now = now_rfc3339();
                    if let Err(e) =
                        document_repo::mark_failed(&self.db, &id, generation, &error, &now)
                    {
                        warn!(document_id = %id, "Failed to record attempt failure: {}", e);
                    }
                }
                HandleOutcome::Retry { error }
            }
        }
    }

    /// Persists a dead-lettered event and publishes the terminal failure.
    /// Dead letters are retained for manual inspection, never dropped.
    pub fn dead_letter(&self, delivery: &Delivery, error: &str) {
        let event = &delivery.event;
        let now = now_rfc3339();
        let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
        if let Err(e) = document_repo::insert_dead_letter(
            &self.db,
            &event.storage_path,
            event.object_generation,
            delivery.attempt,
            error,
            &payload,
            &now,
        ) {
            warn!(
                storage_path = %event.storage_path,
                "Failed to persist dead letter: {}", e
            );
        }

        match document_repo::find_by_storage_path(&self.db, &event.storage_path) {
            Ok(Some(doc)) => self.publisher.publish(DocumentProcessedEvent {
                document_id: doc.id,
                storage_path: event.storage_path.clone(),
                status: DocumentStatus::Failed,
                generation: doc.generation,
                confidence: None,
            }),
            Ok(None) => {}
            Err(e) => warn!("Failed to look up dead-lettered document: {}", e),
        }

        warn!(
            storage_path = %event.storage_path,
            attempts = delivery.attempt,
            "Event dead-lettered: {}", error
        );
    }

    fn process(
        &self,
        delivery: &Delivery,
        claim: &mut Option<(String, i64)>,
    ) -> Result<DocumentStatus, AttemptError> {
        let event = &delivery.event;
        let now = now_rfc3339();

        let (id, generation, stored_doc_type) = self.resolve_document(delivery, &now)?;

        let claimed = self.with_persistence_retry(|| {
            document_repo::claim_for_processing(
                &self.db,
                &id,
                generation,
                event.object_generation,
                &now,
            )
        })?;
        if !claimed {
            return Err(AttemptError::Skip("claim lost to concurrent worker".into()));
        }
        *claim = Some((id.clone(), generation));

        let started = Instant::now();
        let _span = info_span!(
            "process_document",
            document_id = %id,
            storage_path = %event.storage_path,
            generation,
            attempt = delivery.attempt,
        )
        .entered();

        let bytes = std::fs::read(&event.storage_path).map_err(|e| {
            AttemptError::Retryable(format!("failed to read '{}': {}", event.storage_path, e))
        })?;

        let filename = file_name_of(&event.storage_path);
        let stored = stored_doc_type.as_deref().and_then(DocType::parse);
        let (doc_type, classification_failed) = match stored {
            Some(t) if t != DocType::Unknown => (t, false),
            _ => match classify::classify(&filename, event.content_type.as_deref(), &bytes) {
                Some(t) => (t, false),
                None => {
                    debug!(filename = %filename, "Classification failed, degrading to generic chain");
                    (DocType::Unknown, true)
                }
            },
        };

        let extraction = self.run_chain(&bytes, doc_type)?;
        let mut assessment = self.evaluator.assess(doc_type, &extraction);
        let status = if assessment.findings.is_empty() {
            DocumentStatus::Processed
        } else {
            DocumentStatus::NeedsReview
        };

        if classification_failed {
            assessment.findings.push(Finding {
                category: ExceptionCategory::UnknownDocType,
                priority: ExceptionPriority::Medium,
                reason: format!("Could not determine document type for '{}'", filename),
                field_name: None,
                expected: None,
                actual: None,
            });
        }

        let extracted_data = serde_json::to_string(&extraction.fields)
            .map_err(|e| AttemptError::Retryable(format!("failed to encode fields: {}", e)))?;
        let field_confidences = serde_json::to_string(&extraction.confidences)
            .map_err(|e| AttemptError::Retryable(format!("failed to encode confidences: {}", e)))?;

        let outcome = ExtractionOutcome {
            doc_type: doc_type.as_str().to_string(),
            status: status.as_str().to_string(),
            extracted_data,
            field_confidences,
            confidence: assessment.aggregate,
            processor_used: extraction.processor.as_str().to_string(),
            processing_time_ms: started.elapsed().as_millis() as i64,
        };

        let now = now_rfc3339();
        let persisted = self.with_persistence_retry(|| {
            document_repo::finalize_extraction(&self.db, &id, generation, &outcome, &now)
        })?;
        if !persisted {
            return Err(AttemptError::Stale);
        }

        for finding in &assessment.findings {
            let row = ExceptionRow::new_open(
                &id,
                finding.category,
                finding.priority,
                &finding.reason,
                finding.field_name.as_deref(),
                finding.expected.as_deref(),
                finding.actual.as_deref(),
                &now,
            );
            exception_repo::insert(&self.db, &row)?;
        }

        self.publisher.publish(DocumentProcessedEvent {
            document_id: id.clone(),
            storage_path: event.storage_path.clone(),
            status,
            generation,
            confidence: Some(assessment.aggregate),
        });

        info!(
            document_id = %id,
            status = %status,
            confidence = assessment.aggregate,
            processor = extraction.processor.as_str(),
            exceptions = assessment.findings.len(),
            "Document attempt complete"
        );

        Ok(status)
    }

    /// Resolves the delivery against the store: creates a fresh `pending`
    /// record, deduplicates duplicate/stale deliveries, and applies
    /// last-writer-wins for re-uploaded objects.
    fn resolve_document(
        &self,
        delivery: &Delivery,
        now: &str,
    ) -> Result<(String, i64, Option<String>), AttemptError> {
        let event = &delivery.event;
        let existing = document_repo::find_by_storage_path(&self.db, &event.storage_path)?;

        let Some(doc) = existing else {
            let filename = file_name_of(&event.storage_path);
            let mime = event.content_type.clone().or_else(|| {
                mime_guess::from_path(&event.storage_path)
                    .first()
                    .map(|m| m.to_string())
            });
            let row = DocumentRow::new_pending(
                &event.storage_path,
                &filename,
                mime.as_deref(),
                event.size_bytes,
                event.object_generation,
                None,
                now,
            );
            return match document_repo::insert(&self.db, &row) {
                Ok(()) => Ok((row.id, 0, None)),
                // Unique storage_path race: another worker created the
                // record and owns this object. Its delivery processes it.
                Err(_) => Err(AttemptError::Skip("document created concurrently".into())),
            };
        };

        if doc.object_generation > event.object_generation {
            return Err(AttemptError::Skip("stale object generation".into()));
        }
        let newer_object = event.object_generation > doc.object_generation;
        let status = DocumentStatus::parse(&doc.status).unwrap_or(DocumentStatus::Failed);

        match status {
            DocumentStatus::Pending => Ok((doc.id, doc.generation, doc.doc_type)),
            DocumentStatus::Failed => {
                // Redeliveries re-enter processing from failed while retry
                // budget remains; fresh duplicates of a settled failure ack.
                if delivery.attempt > 1 || newer_object {
                    Ok((doc.id, doc.generation, doc.doc_type))
                } else {
                    Err(AttemptError::Skip("document already failed".into()))
                }
            }
            DocumentStatus::Processing | DocumentStatus::Processed | DocumentStatus::NeedsReview => {
                if newer_object {
                    // A re-uploaded object supersedes whatever state the
                    // previous version reached.
                    let generation = self
                        .with_persistence_retry(|| {
                            document_repo::reset_for_reprocess(&self.db, &doc.id, now)
                        })?
                        .ok_or_else(|| AttemptError::Skip("document vanished".into()))?;
                    Ok((doc.id, generation, doc.doc_type))
                } else {
                    Err(AttemptError::Skip(format!(
                        "document already {}",
                        doc.status
                    )))
                }
            }
        }
    }

    /// Invokes adapters in chain order: transient errors are retried
    /// within the attempt, permanent errors advance the chain, and the
    /// first extraction to clear the threshold wins. An exhausted chain
    /// finalizes with the best extraction seen.
    fn run_chain(&self, bytes: &[u8], doc_type: DocType) -> Result<Extraction, AttemptError> {
        let chain = self.registry.chain_for(doc_type);
        let required = rules::required_fields(doc_type);
        let total = chain.len();

        let mut best: Option<(Extraction, f64)> = None;
        let mut last_error: Option<String> = None;

        for (index, adapter) in chain.iter().enumerate() {
            let remaining = index + 1 < total;
            match self.run_adapter(adapter.as_ref(), bytes, doc_type) {
                Ok(extraction) => {
                    let aggregate = crate::evaluate::aggregate_confidence(
                        &extraction.fields,
                        &extraction.confidences,
                        required,
                    );
                    debug!(
                        adapter = adapter.kind().as_str(),
                        aggregate, "Adapter produced extraction"
                    );
                    let improves = best.as_ref().map_or(true, |(_, b)| aggregate > *b);
                    if improves {
                        best = Some((extraction, aggregate));
                    }
                    if self.evaluator.decide(aggregate, remaining) == ChainDecision::Finalize
                        && aggregate >= self.evaluator.threshold()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!(adapter = adapter.kind().as_str(), "Adapter failed: {}", e);
                    last_error = Some(e.to_string());
                }
            }
        }

        best.map(|(extraction, _)| extraction).ok_or_else(|| {
            AttemptError::Retryable(
                last_error.unwrap_or_else(|| "no adapter produced an extraction".to_string()),
            )
        })
    }

    /// Retries transient adapter failures within the attempt, bounded by
    /// config. The router owns this policy; adapters stay stateless.
    fn run_adapter(
        &self,
        adapter: &dyn ExtractionAdapter,
        bytes: &[u8],
        doc_type: DocType,
    ) -> Result<Extraction, AdapterError> {
        let mut retries = 0;
        loop {
            match adapter.extract(bytes, doc_type) {
                Ok(extraction) => return Ok(extraction),
                Err(AdapterError::Transient(reason)) => {
                    if retries >= self.config.max_adapter_retries {
                        return Err(AdapterError::Transient(reason));
                    }
                    retries += 1;
                    debug!(
                        adapter = adapter.kind().as_str(),
                        retry = retries,
                        "Transient adapter failure, retrying: {}",
                        reason
                    );
                }
                Err(permanent) => return Err(permanent),
            }
        }
    }

    /// Bounded retry for store writes hitting transient contention.
    fn with_persistence_retry<T>(
        &self,
        mut write: impl FnMut() -> Result<T, DatabaseError>,
    ) -> Result<T, AttemptError> {
        let mut attempt = 0;
        loop {
            match write() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= PERSISTENCE_RETRIES {
                        return Err(e.into());
                    }
                    debug!("Store write contention, retrying: {}", e);
                    std::thread::sleep(std::time::Duration::from_millis(10 * attempt as u64));
                }
            }
        }
    }
}

/// Idempotent reprocess request: resets the document to `pending`, bumps
/// the processing generation (discarding in-flight stale results at their
/// next conditional write) and re-queues the ingestion event.
pub fn request_reprocess(
    db: &Database,
    queue: &IngestionQueue,
    id: &str,
) -> crate::error::Result<DocumentRow> {
    let doc = document_repo::find_by_id(db, id)?
        .ok_or_else(|| EngineError::DocumentNotFound(id.to_string()))?;

    let now = now_rfc3339();
    document_repo::reset_for_reprocess(db, id, &now)?;
    let updated = document_repo::find_by_id(db, id)?
        .ok_or_else(|| EngineError::DocumentNotFound(id.to_string()))?;

    queue.enqueue(IngestionEvent {
        storage_path: doc.storage_path,
        object_generation: doc.object_generation,
        size_bytes: doc.size_bytes,
        content_type: doc.mime_type,
    })?;

    info!(document_id = %id, generation = updated.generation, "Reprocess requested");
    Ok(updated)
}

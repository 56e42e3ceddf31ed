//! Exception engine — resolution workflow for recorded anomalies.
//!
//! Resolution operations are idempotent against re-submission of the same
//! terminal state: re-resolving a resolved exception returns the existing
//! record instead of erroring, which protects against retried client
//! requests. Terminal states are otherwise immutable; revisiting a
//! correction requires a new exception.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::ProcessingConfig;
use crate::db::document_repo::{self, DocumentRow};
use crate::db::exception_repo::{self, ExceptionRow};
use crate::db::Database;
use crate::error::EngineError;
use crate::evaluate::aggregate_confidence;
use crate::model::{DocType, DocumentStatus, ExceptionStatus};
use crate::rules;

/// Per-id outcome of a best-effort batch resolve. Never atomic.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResolveOutcome {
    pub resolved: Vec<String>,
    pub failed: Vec<BulkResolveFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResolveFailure {
    pub id: String,
    pub reason: String,
}

pub struct ExceptionEngine {
    db: Database,
    config: Arc<ProcessingConfig>,
}

impl ExceptionEngine {
    pub fn new(db: Database, config: Arc<ProcessingConfig>) -> Self {
        Self { db, config }
    }

    /// Resolves an exception, storing the resolution record.
    ///
    /// A field-scoped resolution with a corrected value also patches the
    /// owning document's extracted field (human-supplied values are
    /// authoritative, confidence 1.0), recomputes the aggregate and flips
    /// `needs_review -> processed` when no other open blocking exception
    /// remains and the aggregate clears the threshold.
    pub fn resolve(
        &self,
        id: &str,
        corrected_value: Option<&str>,
        notes: Option<&str>,
        resolver: &str,
    ) -> Result<ExceptionRow, EngineError> {
        let existing = exception_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        match ExceptionStatus::parse(&existing.status) {
            Some(ExceptionStatus::Resolved) => {
                debug!("Exception {} already resolved, returning record", id);
                return Ok(existing);
            }
            Some(ExceptionStatus::Ignored) => {
                return Err(EngineError::AlreadyTerminal {
                    id: id.to_string(),
                    status: existing.status,
                });
            }
            _ => {}
        }

        let now = chrono::Utc::now().to_rfc3339();
        exception_repo::mark_resolved(&self.db, id, corrected_value, notes, resolver, &now)?;

        if let (Some(field), Some(corrected)) = (existing.field_name.as_deref(), corrected_value) {
            self.apply_correction(&existing.document_id, field, corrected, &now)?;
        }

        let resolved = exception_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        info!(
            "Exception {} resolved by {} (document {})",
            id, resolver, resolved.document_id
        );
        Ok(resolved)
    }

    /// Ignores an exception; the document is left untouched. Idempotent
    /// on re-ignore.
    pub fn ignore(
        &self,
        id: &str,
        reason: Option<&str>,
        resolver: &str,
    ) -> Result<ExceptionRow, EngineError> {
        let existing = exception_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        match ExceptionStatus::parse(&existing.status) {
            Some(ExceptionStatus::Ignored) => {
                debug!("Exception {} already ignored, returning record", id);
                return Ok(existing);
            }
            Some(ExceptionStatus::Resolved) => {
                return Err(EngineError::AlreadyTerminal {
                    id: id.to_string(),
                    status: existing.status,
                });
            }
            _ => {}
        }

        let now = chrono::Utc::now().to_rfc3339();
        exception_repo::mark_ignored(
            &self.db,
            id,
            reason.unwrap_or("Ignored by reviewer"),
            resolver,
            &now,
        )?;

        let ignored = exception_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        info!("Exception {} ignored by {}", id, resolver);
        Ok(ignored)
    }

    /// Applies `resolve` to each id independently. Partial failure is
    /// reported per id; the batch itself never raises.
    pub fn bulk_resolve(
        &self,
        ids: &[String],
        notes: Option<&str>,
        resolver: &str,
    ) -> BulkResolveOutcome {
        let mut outcome = BulkResolveOutcome::default();
        for id in ids {
            match self.resolve(id, None, notes, resolver) {
                Ok(_) => outcome.resolved.push(id.clone()),
                Err(e) => outcome.failed.push(BulkResolveFailure {
                    id: id.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        info!(
            "Bulk resolve: {} resolved, {} failed",
            outcome.resolved.len(),
            outcome.failed.len()
        );
        outcome
    }

    /// Patches the document's extracted field with the corrected value,
    /// recomputes the aggregate and completes the review when this was the
    /// last open blocking exception.
    fn apply_correction(
        &self,
        document_id: &str,
        field: &str,
        corrected: &str,
        now: &str,
    ) -> Result<(), EngineError> {
        let doc = document_repo::find_by_id(&self.db, document_id)?
            .ok_or_else(|| EngineError::DocumentNotFound(document_id.to_string()))?;

        let mut fields: Map<String, Value> = doc
            .extracted_data
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        let mut confidences: BTreeMap<String, f64> = doc
            .field_confidences
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();

        fields.insert(field.to_string(), crate::adapter::parse_scalar(corrected));
        confidences.insert(field.to_string(), 1.0);

        let doc_type = doc
            .doc_type
            .as_deref()
            .and_then(DocType::parse)
            .unwrap_or(DocType::Unknown);
        let aggregate =
            aggregate_confidence(&fields, &confidences, rules::required_fields(doc_type));

        let extracted =
            serde_json::to_string(&fields).map_err(crate::db::DatabaseError::from)?;
        let confidences_json =
            serde_json::to_string(&confidences).map_err(crate::db::DatabaseError::from)?;
        document_repo::update_extraction(
            &self.db,
            document_id,
            &extracted,
            &confidences_json,
            aggregate,
            now,
        )?;
        debug!(
            "Patched field '{}' on document {} (aggregate {:.2})",
            field, document_id, aggregate
        );

        self.maybe_complete_review(&doc, aggregate, now)
    }

    /// `needs_review -> processed` once the last open blocking exception
    /// is gone and the recomputed aggregate clears the threshold. No
    /// re-validation cascade runs here; revisiting a correction is a new
    /// exception.
    fn maybe_complete_review(
        &self,
        doc: &DocumentRow,
        aggregate: f64,
        now: &str,
    ) -> Result<(), EngineError> {
        let status = DocumentStatus::parse(&doc.status).unwrap_or(DocumentStatus::Failed);
        if status != DocumentStatus::NeedsReview {
            return Ok(());
        }
        if aggregate < self.config.confidence_threshold {
            return Ok(());
        }
        if exception_repo::count_open_blocking(&self.db, &doc.id)? > 0 {
            return Ok(());
        }

        if !status.can_transition(DocumentStatus::Processed) {
            return Err(EngineError::InvalidTransition {
                from: doc.status.clone(),
                to: "processed".to_string(),
            });
        }
        document_repo::set_status(&self.db, &doc.id, DocumentStatus::Processed.as_str(), now)?;
        info!("Document {} completed review, now processed", doc.id);
        Ok(())
    }
}

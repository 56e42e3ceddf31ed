//! Document repository — CRUD and conditional lifecycle updates for the
//! `documents` table.
//!
//! Worker-side mutations are single-row conditional updates keyed by
//! `(id, generation, expected status)`. A mutation that matches zero rows
//! means the caller lost the race (stale generation or concurrent claim)
//! and must abort without persisting.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw document row from the database.
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: String,
    pub storage_path: String,
    pub original_filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub doc_type: Option<String>,
    pub status: String,
    pub generation: i64,
    pub object_generation: i64,
    pub extracted_data: Option<String>,
    pub field_confidences: Option<String>,
    pub confidence: Option<f64>,
    pub processor_used: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub processing_error: Option<String>,
    pub retry_count: i64,
    pub uploaded_by: Option<String>,
    pub created_at: String,
    pub processed_at: Option<String>,
    pub updated_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            storage_path: row.get("storage_path")?,
            original_filename: row.get("original_filename")?,
            mime_type: row.get("mime_type")?,
            size_bytes: row.get("size_bytes")?,
            doc_type: row.get("doc_type")?,
            status: row.get("status")?,
            generation: row.get("generation")?,
            object_generation: row.get("object_generation")?,
            extracted_data: row.get("extracted_data")?,
            field_confidences: row.get("field_confidences")?,
            confidence: row.get("confidence")?,
            processor_used: row.get("processor_used")?,
            processing_time_ms: row.get("processing_time_ms")?,
            processing_error: row.get("processing_error")?,
            retry_count: row.get("retry_count")?,
            uploaded_by: row.get("uploaded_by")?,
            created_at: row.get("created_at")?,
            processed_at: row.get("processed_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// A fresh `pending` row for a newly observed storage object.
    pub fn new_pending(
        storage_path: &str,
        original_filename: &str,
        mime_type: Option<&str>,
        size_bytes: Option<i64>,
        object_generation: i64,
        uploaded_by: Option<&str>,
        now: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            storage_path: storage_path.to_string(),
            original_filename: original_filename.to_string(),
            mime_type: mime_type.map(str::to_string),
            size_bytes,
            doc_type: None,
            status: "pending".to_string(),
            generation: 0,
            object_generation,
            extracted_data: None,
            field_confidences: None,
            confidence: None,
            processor_used: None,
            processing_time_ms: None,
            processing_error: None,
            retry_count: 0,
            uploaded_by: uploaded_by.map(str::to_string),
            created_at: now.to_string(),
            processed_at: None,
            updated_at: now.to_string(),
        }
    }
}

/// Query filter parameters for document listing.
#[derive(Debug, Default, Clone)]
pub struct DocumentFilter {
    pub status: Option<String>,
    pub doc_type: Option<String>,
    /// Substring match on the original filename.
    pub search: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Extraction result persisted when an attempt reaches a terminal status.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub doc_type: String,
    pub status: String,
    pub extracted_data: String,
    pub field_confidences: String,
    pub confidence: f64,
    pub processor_used: String,
    pub processing_time_ms: i64,
}

/// Inserts a new document row.
pub fn insert(db: &Database, doc: &DocumentRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO documents (id, storage_path, original_filename, mime_type, size_bytes,
             doc_type, status, generation, object_generation, extracted_data, field_confidences,
             confidence, processor_used, processing_time_ms, processing_error, retry_count,
             uploaded_by, created_at, processed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?19, ?20)",
            params![
                doc.id,
                doc.storage_path,
                doc.original_filename,
                doc.mime_type,
                doc.size_bytes,
                doc.doc_type,
                doc.status,
                doc.generation,
                doc.object_generation,
                doc.extracted_data,
                doc.field_confidences,
                doc.confidence,
                doc.processor_used,
                doc.processing_time_ms,
                doc.processing_error,
                doc.retry_count,
                doc.uploaded_by,
                doc.created_at,
                doc.processed_at,
                doc.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a document by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM documents WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], DocumentRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds a document by its storage path (unique per object).
pub fn find_by_storage_path(
    db: &Database,
    storage_path: &str,
) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM documents WHERE storage_path = ?1")?;
        let mut rows = stmt.query_map(params![storage_path], DocumentRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Queries documents with filters, returning (rows, total_count).
pub fn query(
    db: &Database,
    filter: &DocumentFilter,
) -> Result<(Vec<DocumentRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.clone()));
        }
        if let Some(ref doc_type) = filter.doc_type {
            conditions.push(format!("doc_type = ?{}", param_values.len() + 1));
            param_values.push(Box::new(doc_type.clone()));
        }
        if let Some(ref search) = filter.search {
            conditions.push(format!(
                "original_filename LIKE ?{}",
                param_values.len() + 1
            ));
            param_values.push(Box::new(format!("%{}%", search)));
        }
        if let Some(ref from_date) = filter.from_date {
            conditions.push(format!("created_at >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(from_date.clone()));
        }
        if let Some(ref to_date) = filter.to_date {
            conditions.push(format!("created_at <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(to_date.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // Count total matching rows.
        let count_sql = format!("SELECT COUNT(*) FROM documents {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        // Fetch paginated results.
        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM documents {} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<DocumentRow> = stmt
            .query_map(params_ref.as_slice(), DocumentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Claims a document for processing: `pending|failed -> processing`,
/// conditional on the expected generation. Returns false when the claim
/// was lost to a concurrent worker or a newer generation.
pub fn claim_for_processing(
    db: &Database,
    id: &str,
    generation: i64,
    object_generation: i64,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET status = 'processing', object_generation = ?3, updated_at = ?4
             WHERE id = ?1 AND generation = ?2 AND status IN ('pending', 'failed')",
            params![id, generation, object_generation, now],
        )?;
        Ok(changed == 1)
    })
}

/// Persists a terminal extraction outcome, conditional on the claim still
/// holding `(generation, status = processing)`. Returns false when a newer
/// generation superseded this attempt; the caller discards its result.
pub fn finalize_extraction(
    db: &Database,
    id: &str,
    generation: i64,
    outcome: &ExtractionOutcome,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET doc_type = ?3, status = ?4, extracted_data = ?5,
             field_confidences = ?6, confidence = ?7, processor_used = ?8,
             processing_time_ms = ?9, processing_error = NULL, processed_at = ?10,
             updated_at = ?10
             WHERE id = ?1 AND generation = ?2 AND status = 'processing'",
            params![
                id,
                generation,
                outcome.doc_type,
                outcome.status,
                outcome.extracted_data,
                outcome.field_confidences,
                outcome.confidence,
                outcome.processor_used,
                outcome.processing_time_ms,
                now,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Records a failed attempt: `processing -> failed` with the error text,
/// conditional on the generation. Also bumps the retry counter.
pub fn mark_failed(
    db: &Database,
    id: &str,
    generation: i64,
    error: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET status = 'failed', processing_error = ?3,
             retry_count = retry_count + 1, updated_at = ?4
             WHERE id = ?1 AND generation = ?2 AND status = 'processing'",
            params![id, generation, error, now],
        )?;
        Ok(changed == 1)
    })
}

/// Resets a document to `pending` and bumps the processing generation so
/// in-flight stale attempts abort at their next conditional write.
/// Returns the new generation.
pub fn reset_for_reprocess(
    db: &Database,
    id: &str,
    now: &str,
) -> Result<Option<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET status = 'pending', generation = generation + 1,
             processing_error = NULL, updated_at = ?2
             WHERE id = ?1",
            params![id, now],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let generation: i64 = conn.query_row(
            "SELECT generation FROM documents WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        Ok(Some(generation))
    })
}

/// Overwrites the extraction payload in place (field correction path).
/// Unconditional; used by resolution and manual edits, which operate on
/// terminal documents.
pub fn update_extraction(
    db: &Database,
    id: &str,
    extracted_data: &str,
    field_confidences: &str,
    confidence: f64,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE documents SET extracted_data = ?2, field_confidences = ?3,
             confidence = ?4, updated_at = ?5
             WHERE id = ?1",
            params![id, extracted_data, field_confidences, confidence, now],
        )?;
        Ok(())
    })
}

/// Updates only the status and updated_at of a document.
pub fn set_status(
    db: &Database,
    id: &str,
    status: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE documents SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status, now],
        )?;
        Ok(())
    })
}

/// Updates the stored doc_type (manual reclassification).
pub fn set_doc_type(
    db: &Database,
    id: &str,
    doc_type: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE documents SET doc_type = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, doc_type, now],
        )?;
        Ok(())
    })
}

/// Records a dead-lettered ingestion event for manual inspection.
pub fn insert_dead_letter(
    db: &Database,
    storage_path: &str,
    object_generation: i64,
    attempts: u32,
    last_error: &str,
    payload: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO dead_letters (id, storage_path, object_generation, attempts,
             last_error, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                uuid::Uuid::new_v4().to_string(),
                storage_path,
                object_generation,
                attempts,
                last_error,
                payload,
                now,
            ],
        )?;
        Ok(())
    })
}

/// Counts dead-letter entries for a storage path.
pub fn count_dead_letters(db: &Database, storage_path: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM dead_letters WHERE storage_path = ?1",
            params![storage_path],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

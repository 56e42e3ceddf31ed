//! Document endpoints: upload, listing, manual edits and reprocessing.

use std::path::Path as FsPath;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use docuflow::db::document_repo::{self, DocumentFilter, DocumentRow};
use docuflow::evaluate::aggregate_confidence;
use docuflow::{request_reprocess, watcher, DocType, DocumentStatus};

use crate::error::ApiError;
use crate::state::AppState;

use super::{page_params, Paged};

/// API shape of a document record; JSON columns are decoded for clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub id: String,
    pub storage_path: String,
    pub original_filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub doc_type: Option<String>,
    pub status: String,
    pub generation: i64,
    pub extracted_data: Option<Value>,
    pub field_confidences: Option<Value>,
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

impl From<DocumentRow> for DocumentView {
    fn from(row: DocumentRow) -> Self {
        let decode = |raw: Option<String>| {
            raw.as_deref()
                .and_then(|text| serde_json::from_str::<Value>(text).ok())
        };
        Self {
            extracted_data: decode(row.extracted_data),
            field_confidences: decode(row.field_confidences),
            id: row.id,
            storage_path: row.storage_path,
            original_filename: row.original_filename,
            mime_type: row.mime_type,
            size_bytes: row.size_bytes,
            doc_type: row.doc_type,
            status: row.status,
            generation: row.generation,
            confidence: row.confidence,
            processor_used: row.processor_used,
            processing_time_ms: row.processing_time_ms,
            processing_error: row.processing_error,
            retry_count: row.retry_count,
            uploaded_by: row.uploaded_by,
            created_at: row.created_at,
            processed_at: row.processed_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DocumentListQuery {
    pub status: Option<String>,
    pub doc_type: Option<String>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<DocumentListQuery>,
) -> Result<Json<Paged<DocumentView>>, ApiError> {
    if let Some(ref status) = query.status {
        if DocumentStatus::parse(status).is_none() {
            return Err(ApiError::BadRequest(format!(
                "Unknown document status '{}'",
                status
            )));
        }
    }
    if let Some(ref doc_type) = query.doc_type {
        if DocType::parse(doc_type).is_none() {
            return Err(ApiError::BadRequest(format!(
                "Unknown document type '{}'",
                doc_type
            )));
        }
    }

    let (page, page_size, offset) = page_params(query.page, query.page_size);
    let filter = DocumentFilter {
        status: query.status,
        doc_type: query.doc_type,
        search: query.search,
        limit: Some(page_size),
        offset: Some(offset),
        ..Default::default()
    };
    let (rows, total) = document_repo::query(&state.db, &filter)?;

    Ok(Json(Paged {
        items: rows.into_iter().map(DocumentView::from).collect(),
        total,
        page,
        page_size,
    }))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentView>, ApiError> {
    let row = document_repo::find_by_id(&state.db, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("Document '{}' not found", id)))?;
    Ok(Json(row.into()))
}

/// Accepts a multipart upload, stores the file in the inbox area and
/// queues it for processing. The inbox watcher may deliver the same
/// object again; the router's idempotency check absorbs the duplicate.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentView>), ApiError> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut uploaded_by: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(sanitize_filename)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        ApiError::BadRequest("File part is missing a filename".to_string())
                    })?;
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
                file = Some((filename, content_type, bytes.to_vec()));
            }
            Some("uploaded_by") => {
                uploaded_by = field.text().await.ok().filter(|t| !t.is_empty());
            }
            _ => {}
        }
    }

    let (filename, content_type, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("Missing 'file' part".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    std::fs::create_dir_all(&state.config.inbox_directory)
        .map_err(|e| ApiError::Internal(format!("Failed to prepare inbox: {}", e)))?;
    let target = unique_inbox_path(&state.config.inbox_directory, &filename);
    std::fs::write(&target, &bytes)
        .map_err(|e| ApiError::Internal(format!("Failed to store upload: {}", e)))?;

    let event = watcher::event_for(&target)
        .ok_or_else(|| ApiError::Internal("Stored upload vanished".to_string()))?;
    let mime = content_type.or_else(|| event.content_type.clone());

    let now = chrono::Utc::now().to_rfc3339();
    let row = DocumentRow::new_pending(
        &event.storage_path,
        &filename,
        mime.as_deref(),
        event.size_bytes,
        event.object_generation,
        uploaded_by.as_deref(),
        &now,
    );
    document_repo::insert(&state.db, &row)?;
    state
        .queue
        .enqueue(event)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    info!(document_id = %row.id, filename = %filename, "Upload accepted");
    let view = document_repo::find_by_id(&state.db, &row.id)?
        .ok_or_else(|| ApiError::Internal("Uploaded document vanished".to_string()))?;
    Ok((StatusCode::CREATED, Json(view.into())))
}

pub async fn reprocess(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentView>, ApiError> {
    let row = request_reprocess(&state.db, &state.queue, &id)?;
    Ok(Json(row.into()))
}

#[derive(Debug, Deserialize)]
pub struct DocumentPatch {
    /// Manual reclassification.
    pub doc_type: Option<String>,
    /// Field corrections merged into the extracted data, confidence 1.0.
    pub extracted_data: Option<Map<String, Value>>,
    /// Manual approval: only `needs_review -> processed`.
    pub status: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<DocumentPatch>,
) -> Result<Json<DocumentView>, ApiError> {
    let doc = document_repo::find_by_id(&state.db, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("Document '{}' not found", id)))?;
    let now = chrono::Utc::now().to_rfc3339();

    let mut doc_type = doc.doc_type.as_deref().and_then(DocType::parse);
    if let Some(ref raw) = patch.doc_type {
        let parsed = DocType::parse(raw).ok_or_else(|| {
            ApiError::BadRequest(format!("Unknown document type '{}'", raw))
        })?;
        document_repo::set_doc_type(&state.db, &id, parsed.as_str(), &now)?;
        doc_type = Some(parsed);
    }

    if let Some(corrections) = patch.extracted_data {
        apply_corrections(&state, &doc, doc_type, corrections, &now)?;
    }

    if let Some(ref raw) = patch.status {
        let target = DocumentStatus::parse(raw).ok_or_else(|| {
            ApiError::BadRequest(format!("Unknown document status '{}'", raw))
        })?;
        if target != DocumentStatus::Processed {
            return Err(ApiError::BadRequest(
                "Only manual approval to 'processed' is supported; use the reprocess endpoint to re-run extraction".to_string(),
            ));
        }
        let current = DocumentStatus::parse(&doc.status)
            .ok_or_else(|| ApiError::Internal(format!("Corrupt status '{}'", doc.status)))?;
        if !current.can_transition(target) {
            return Err(ApiError::Conflict(format!(
                "Cannot approve a document in status '{}'",
                doc.status
            )));
        }
        document_repo::set_status(&state.db, &id, target.as_str(), &now)?;
        info!(document_id = %id, "Document manually approved");
    }

    let updated = document_repo::find_by_id(&state.db, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("Document '{}' not found", id)))?;
    Ok(Json(updated.into()))
}

/// Merges manual field corrections and recomputes the aggregate. Human
/// corrections are authoritative: each patched field scores 1.0.
fn apply_corrections(
    state: &AppState,
    doc: &DocumentRow,
    doc_type: Option<DocType>,
    corrections: Map<String, Value>,
    now: &str,
) -> Result<(), ApiError> {
    let mut fields: Map<String, Value> = doc
        .extracted_data
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();
    let mut confidences: std::collections::BTreeMap<String, f64> = doc
        .field_confidences
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    for (field, value) in corrections {
        confidences.insert(field.clone(), 1.0);
        fields.insert(field, value);
    }

    let required = docuflow::rules::required_fields(doc_type.unwrap_or(DocType::Unknown));
    let aggregate = aggregate_confidence(&fields, &confidences, required);

    let extracted = serde_json::to_string(&fields)
        .map_err(|e| ApiError::Internal(format!("Failed to encode fields: {}", e)))?;
    let confidences_json = serde_json::to_string(&confidences)
        .map_err(|e| ApiError::Internal(format!("Failed to encode confidences: {}", e)))?;
    document_repo::update_extraction(
        &state.db,
        &doc.id,
        &extracted,
        &confidences_json,
        aggregate,
        now,
    )?;
    Ok(())
}

/// Strips any path components from a client-supplied filename.
fn sanitize_filename(raw: &str) -> String {
    FsPath::new(raw)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Picks a non-colliding inbox path for the upload.
fn unique_inbox_path(inbox: &FsPath, filename: &str) -> std::path::PathBuf {
    let candidate = inbox.join(filename);
    if !candidate.exists() {
        return candidate;
    }
    let stem = FsPath::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let suffix = uuid::Uuid::new_v4().to_string();
    let short = &suffix[..8];
    match FsPath::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) => inbox.join(format!("{}-{}.{}", stem, short, ext)),
        None => inbox.join(format!("{}-{}", stem, short)),
    }
}

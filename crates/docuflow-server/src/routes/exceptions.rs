//! Exception endpoints: listing and the resolution workflow.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use docuflow::db::exception_repo::{self, ExceptionFilter, ExceptionRow};
use docuflow::{BulkResolveOutcome, ExceptionCategory, ExceptionPriority, ExceptionStatus};

use crate::error::ApiError;
use crate::state::AppState;

use super::{page_params, Paged};

/// Fallback resolver identity for unauthenticated API calls.
const DEFAULT_RESOLVER: &str = "api";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionView {
    pub id: String,
    pub document_id: String,
    pub category: String,
    pub reason: String,
    pub field_name: Option<String>,
    pub expected_value: Option<String>,
    pub actual_value: Option<String>,
    pub priority: String,
    pub status: String,
    pub auto_resolvable: bool,
    pub suggested_resolution: Option<Value>,
    pub corrected_value: Option<String>,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ExceptionRow> for ExceptionView {
    fn from(row: ExceptionRow) -> Self {
        Self {
            suggested_resolution: row
                .suggested_resolution
                .as_deref()
                .and_then(|text| serde_json::from_str(text).ok()),
            id: row.id,
            document_id: row.document_id,
            category: row.category,
            reason: row.reason,
            field_name: row.field_name,
            expected_value: row.expected_value,
            actual_value: row.actual_value,
            priority: row.priority,
            status: row.status,
            auto_resolvable: row.auto_resolvable,
            corrected_value: row.corrected_value,
            resolution_notes: row.resolution_notes,
            resolved_by: row.resolved_by,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExceptionListQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub document_id: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ExceptionListQuery>,
) -> Result<Json<Paged<ExceptionView>>, ApiError> {
    if let Some(ref status) = query.status {
        if ExceptionStatus::parse(status).is_none() {
            return Err(ApiError::BadRequest(format!(
                "Unknown exception status '{}'",
                status
            )));
        }
    }
    if let Some(ref category) = query.category {
        if ExceptionCategory::parse(category).is_none() {
            return Err(ApiError::BadRequest(format!(
                "Unknown exception category '{}'",
                category
            )));
        }
    }
    if let Some(ref priority) = query.priority {
        if ExceptionPriority::parse(priority).is_none() {
            return Err(ApiError::BadRequest(format!(
                "Unknown exception priority '{}'",
                priority
            )));
        }
    }

    let (page, page_size, offset) = page_params(query.page, query.page_size);
    let filter = ExceptionFilter {
        status: query.status,
        category: query.category,
        priority: query.priority,
        document_id: query.document_id,
        limit: Some(page_size),
        offset: Some(offset),
        ..Default::default()
    };
    let (rows, total) = exception_repo::query(&state.db, &filter)?;

    Ok(Json(Paged {
        items: rows.into_iter().map(ExceptionView::from).collect(),
        total,
        page,
        page_size,
    }))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExceptionView>, ApiError> {
    let row = exception_repo::find_by_id(&state.db, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("Exception '{}' not found", id)))?;
    Ok(Json(row.into()))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub corrected_value: Option<String>,
    pub notes: Option<String>,
    pub resolver: Option<String>,
}

pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ExceptionView>, ApiError> {
    let resolver = request.resolver.as_deref().unwrap_or(DEFAULT_RESOLVER);
    let row = state.engine.resolve(
        &id,
        request.corrected_value.as_deref(),
        request.notes.as_deref(),
        resolver,
    )?;
    Ok(Json(row.into()))
}

#[derive(Debug, Deserialize)]
pub struct IgnoreRequest {
    pub reason: Option<String>,
    pub resolver: Option<String>,
}

pub async fn ignore(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<IgnoreRequest>,
) -> Result<Json<ExceptionView>, ApiError> {
    let resolver = request.resolver.as_deref().unwrap_or(DEFAULT_RESOLVER);
    let row = state
        .engine
        .ignore(&id, request.reason.as_deref(), resolver)?;
    Ok(Json(row.into()))
}

#[derive(Debug, Deserialize)]
pub struct BulkResolveRequest {
    pub exception_ids: Vec<String>,
    pub notes: Option<String>,
    pub resolver: Option<String>,
}

/// Best-effort batch: per-id outcomes, never an all-or-nothing failure.
pub async fn bulk_resolve(
    State(state): State<AppState>,
    Json(request): Json<BulkResolveRequest>,
) -> Result<Json<BulkResolveOutcome>, ApiError> {
    if request.exception_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "exception_ids must not be empty".to_string(),
        ));
    }
    let resolver = request.resolver.as_deref().unwrap_or(DEFAULT_RESOLVER);
    let outcome = state
        .engine
        .bulk_resolve(&request.exception_ids, request.notes.as_deref(), resolver);
    Ok(Json(outcome))
}

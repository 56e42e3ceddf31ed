//! Uniform JSON error responses for the API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docuflow::{DocuflowError, EngineError};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::Internal(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(_)) {
            tracing::error!("Request failed: {}", self.message());
        }
        let body = Json(json!({ "error": self.message() }));
        (self.status(), body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(_) | EngineError::DocumentNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            EngineError::AlreadyTerminal { .. } | EngineError::InvalidTransition { .. } => {
                ApiError::Conflict(e.to_string())
            }
            EngineError::Database(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<docuflow::db::DatabaseError> for ApiError {
    fn from(e: docuflow::db::DatabaseError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<DocuflowError> for ApiError {
    fn from(e: DocuflowError) -> Self {
        match e {
            DocuflowError::Engine(engine) => engine.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

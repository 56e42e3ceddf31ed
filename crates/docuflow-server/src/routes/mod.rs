//! HTTP route table and shared response shapes.

use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod documents;
pub mod exceptions;
pub mod metrics;

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

/// One page of a filtered listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Normalizes 1-based page parameters into (page, page_size, offset).
fn page_params(page: Option<u64>, page_size: Option<u64>) -> (u64, u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    (page, page_size, (page - 1) * page_size)
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/documents", get(documents::list))
        .route("/documents/upload", post(documents::upload))
        .route(
            "/documents/:id",
            get(documents::get_one).patch(documents::update),
        )
        .route("/documents/:id/reprocess", post(documents::reprocess))
        .route("/exceptions", get(exceptions::list))
        .route("/exceptions/bulk-resolve", post(exceptions::bulk_resolve))
        .route("/exceptions/:id", get(exceptions::get_one))
        .route("/exceptions/:id/resolve", post(exceptions::resolve))
        .route("/exceptions/:id/ignore", post(exceptions::ignore))
        .route("/metrics/dashboard", get(metrics::dashboard))
        .route("/metrics/trends", get(metrics::trends))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_defaults() {
        assert_eq!(page_params(None, None), (1, 20, 0));
    }

    #[test]
    fn test_page_params_offset() {
        assert_eq!(page_params(Some(3), Some(25)), (3, 25, 50));
    }

    #[test]
    fn test_page_params_clamped() {
        assert_eq!(page_params(Some(0), Some(10_000)), (1, 100, 0));
        assert_eq!(page_params(Some(2), Some(0)), (2, 1, 1));
    }
}

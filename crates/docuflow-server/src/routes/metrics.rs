//! Read-only aggregate metrics, computed from the document/exception
//! store.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use docuflow::db::metrics_repo::{self, DashboardMetrics, TrendMetrics};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_WINDOW_DAYS: u32 = 30;
const MAX_WINDOW_DAYS: u32 = 365;

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub days: Option<u32>,
}

impl WindowQuery {
    fn days(&self) -> u32 {
        self.days.unwrap_or(DEFAULT_WINDOW_DAYS).clamp(1, MAX_WINDOW_DAYS)
    }
}

pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<DashboardMetrics>, ApiError> {
    let metrics = metrics_repo::dashboard(&state.db, query.days())?;
    Ok(Json(metrics))
}

pub async fn trends(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<TrendMetrics>, ApiError> {
    let metrics = metrics_repo::trends(&state.db, query.days())?;
    Ok(Json(metrics))
}

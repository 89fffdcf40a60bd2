//! REST API handlers
//!
//! Defines the `/api/v1` routes: trial browsing, review updates, stats,
//! health, and the operational debug trigger for ingestion.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{ReviewStatus, TrialFilter};
use crate::scheduler::{SchedulerError, SchedulerStatus};

use super::server::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service_state: String,
    pub version: String,
    pub uptime_secs: u64,
    pub scheduler: SchedulerStatus,
}

/// Review status counts
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub counts: BTreeMap<String, i64>,
    pub total: i64,
}

/// Trial list query parameters
#[derive(Debug, Default, Deserialize)]
pub struct TrialListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Review update request body
#[derive(Debug, Deserialize)]
pub struct UpdateTrialRequest {
    pub status: String,
    pub custom_summary: Option<String>,
}

/// Debug trigger acknowledgement
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: &'static str,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the `/api/v1` router; state is applied by the server assembly
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/trials", get(list_trials))
        .route("/trials/stats", get(trial_stats))
        .route("/trials/{nct_id}", get(get_trial).patch(update_trial))
        .route("/debug/run-ingestion", post(run_ingestion))
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let service_state = *state.service_state.borrow();

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        service_state: service_state.as_str().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        scheduler: state.scheduler.status().await,
    }))
}

// ============================================================================
// Trial Handlers
// ============================================================================

/// List trials with optional status filter and search
async fn list_trials(
    State(state): State<AppState>,
    Query(query): Query<TrialListQuery>,
) -> axum::response::Response {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => match ReviewStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new(format!("Invalid status: {raw}"))),
                )
                    .into_response();
            }
        },
    };

    let filter = TrialFilter {
        status,
        search: query.search.filter(|s| !s.is_empty()),
        limit: query.limit.unwrap_or(TrialFilter::DEFAULT_LIMIT),
        offset: query.offset.unwrap_or(0),
    };

    match state.store.list(&filter).await {
        Ok(page) => (StatusCode::OK, Json(ApiResponse::success(page))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list trials");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to list trials")),
            )
                .into_response()
        }
    }
}

/// Get a single trial by registry identifier
async fn get_trial(
    State(state): State<AppState>,
    Path(nct_id): Path<String>,
) -> axum::response::Response {
    match state.store.get(&nct_id).await {
        Ok(Some(trial)) => (StatusCode::OK, Json(ApiResponse::success(trial))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Trial not found: {nct_id}"))),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(nct_id = %nct_id, error = %e, "Failed to fetch trial");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to fetch trial")),
            )
                .into_response()
        }
    }
}

/// Update the review state of a trial
async fn update_trial(
    State(state): State<AppState>,
    Path(nct_id): Path<String>,
    Json(request): Json<UpdateTrialRequest>,
) -> axum::response::Response {
    let Some(status) = ReviewStatus::parse(&request.status) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(format!(
                "Invalid status: {}",
                request.status
            ))),
        )
            .into_response();
    };

    match state
        .store
        .update_review(&nct_id, status, request.custom_summary.as_deref())
        .await
    {
        Ok(Some(trial)) => (StatusCode::OK, Json(ApiResponse::success(trial))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Trial not found: {nct_id}"))),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(nct_id = %nct_id, error = %e, "Failed to update trial");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to update trial")),
            )
                .into_response()
        }
    }
}

/// Count trials grouped by review status
async fn trial_stats(State(state): State<AppState>) -> axum::response::Response {
    match state.store.counts_by_status().await {
        Ok(counts) => {
            let total: i64 = counts.iter().map(|(_, n)| n).sum();
            let counts = counts
                .into_iter()
                .map(|(status, n)| (status.as_str().to_string(), n))
                .collect();

            (
                StatusCode::OK,
                Json(ApiResponse::success(StatsResponse { counts, total })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to count trials");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to count trials")),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Debug Handlers
// ============================================================================

/// Trigger an ingestion run out of band.
///
/// Returns immediately; the run executes in the background. Calling while a
/// run is in flight yields 409, never a queued second run.
async fn run_ingestion(State(state): State<AppState>) -> axum::response::Response {
    match state.scheduler.trigger_now().await {
        Ok(()) => (
            StatusCode::OK,
            Json(TriggerResponse { status: "started" }),
        )
            .into_response(),
        Err(SchedulerError::Busy) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("Ingestion already running")),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================

//! API route handlers
//!
//! Ingestion and aggregation both touch the event log synchronously, so every
//! handler runs its work on the blocking pool.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::aggregation::Aggregator;
use crate::ingest::{BatchResult, IngestError, IngestionService};
use crate::types::{EstimateFilters, EventKind, Platform, StatsRange};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub ingest: IngestionService,
    pub aggregator: Aggregator,
}

impl ApiState {
    pub fn new(ingest: IngestionService, aggregator: Aggregator) -> Self {
        Self { ingest, aggregator }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, Response>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        warn!(error = %e, "Blocking task failed");
        ApiErrorResponse::internal("request processing failed")
    })
}

fn parse_range(raw: Option<&str>) -> Result<StatsRange, Response> {
    match raw {
        None => Ok(StatsRange::default()),
        Some(s) => s.parse().map_err(ApiErrorResponse::bad_request),
    }
}

// ============================================================================
// Ingestion
// ============================================================================

/// POST /api/v1/events - record a batch of `{type, data}` entries
pub async fn post_events(
    State(state): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let entries = match body {
        Ok(Json(Value::Array(entries))) => entries,
        Ok(Json(_)) => return ApiErrorResponse::bad_request("expected a JSON array of events"),
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    let ingest = state.ingest.clone();
    match blocking(move || ingest.record_batch(entries)).await {
        Ok(results) => Json(results).into_response(),
        Err(resp) => resp,
    }
}

/// POST /api/v1/events/:type - record one event of the given type
pub async fn post_event(
    State(state): State<ApiState>,
    Path(event_type): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let kind: EventKind = match event_type.parse() {
        Ok(kind) => kind,
        Err(_) => {
            return ApiErrorResponse::bad_request(
                IngestError::UnknownType(event_type).to_string(),
            )
        }
    };
    let data = match body {
        Ok(Json(data)) => data,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    let ingest = state.ingest.clone();
    let outcome = match blocking(move || ingest.record_event(kind, data)).await {
        Ok(outcome) => outcome,
        Err(resp) => return resp,
    };

    let (status, error) = match outcome {
        Ok(_) => (StatusCode::OK, None),
        Err(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, Some(e.to_string())),
        Err(e) => {
            warn!(%kind, error = %e, "Event persistence failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Some(e.to_string()))
        }
    };

    let body = BatchResult {
        success: error.is_none(),
        event_type: kind.to_string(),
        error,
    };
    (status, Json(body)).into_response()
}

// ============================================================================
// Aggregation
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub range: Option<String>,
}

/// GET /api/v1/stats?range=7d
pub async fn get_stats(State(state): State<ApiState>, Query(q): Query<StatsQuery>) -> Response {
    let range = match parse_range(q.range.as_deref()) {
        Ok(range) => range,
        Err(resp) => return resp,
    };

    let aggregator = state.aggregator.clone();
    match blocking(move || aggregator.get_external_video_stats(range)).await {
        Ok(stats) => Json(stats).into_response(),
        Err(resp) => resp,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatesQuery {
    pub range: Option<String>,
    pub video_id: Option<String>,
    pub platform: Option<String>,
}

/// GET /api/v1/estimates?range=30d&videoId=&platform=
pub async fn get_estimates(
    State(state): State<ApiState>,
    Query(q): Query<EstimatesQuery>,
) -> Response {
    let range = match parse_range(q.range.as_deref()) {
        Ok(range) => range,
        Err(resp) => return resp,
    };

    let platform = match q.platform.as_deref().filter(|p| !p.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<Platform>() {
            Ok(p) => Some(p),
            Err(msg) => return ApiErrorResponse::bad_request(msg),
        },
    };

    let filters = EstimateFilters {
        video_id: q.video_id.filter(|v| !v.is_empty()),
        platform,
    };

    let aggregator = state.aggregator.clone();
    match blocking(move || aggregator.get_completion_estimates(range, &filters)).await {
        Ok(report) => Json(report).into_response(),
        Err(resp) => resp,
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub segments: usize,
}

/// GET /health
pub async fn get_health(State(state): State<ApiState>) -> Response {
    let log = state.ingest.log().clone();
    match blocking(move || (log.backend_name(), log.list_segments().len())).await {
        Ok((backend, segments)) => ApiResponse::ok(HealthResponse {
            status: "ok",
            backend,
            segments,
        }),
        Err(resp) => resp,
    }
}

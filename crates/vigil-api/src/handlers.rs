//! REST API handlers.
//!
//! Read handlers go through the monitor's aggregate reader; ingestion
//! handlers hand off to the recorders and always answer 202.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::debug;

use vigil_core::{EventContext, Operation, SecurityEvent, SecurityEventType, Severity};

use crate::ApiState;

pub const DEFAULT_EVENT_LIMIT: usize = 50;
pub const MAX_EVENT_LIMIT: usize = 500;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn accepted() -> impl IntoResponse {
    (StatusCode::ACCEPTED, ApiResponse::ok("accepted"))
}

// ── Health ─────────────────────────────────────────────────────

/// GET /health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let report = state.monitor.reader().health().await;
    let status = if report.store_reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, ApiResponse::ok(report))
}

// ── Performance ────────────────────────────────────────────────

/// GET /api/v1/stats
pub async fn list_stats(State(state): State<ApiState>) -> impl IntoResponse {
    match state.monitor.reader().get_all_stats().await {
        Ok(stats) => ApiResponse::ok(stats).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub method: String,
    pub route: String,
}

/// GET /api/v1/stats/lookup?method=&route=
///
/// Routes contain slashes, so the operation is passed as query parameters
/// rather than path segments.
pub async fn lookup_stats(
    State(state): State<ApiState>,
    Query(q): Query<LookupQuery>,
) -> impl IntoResponse {
    let op = Operation::new(&q.method, q.route);
    match state.monitor.reader().get_stats(&op).await {
        Ok(Some(stats)) => ApiResponse::ok(stats).into_response(),
        Ok(None) => error_response("no statistics for operation", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/summary
pub async fn summary(State(state): State<ApiState>) -> impl IntoResponse {
    match state.monitor.reader().summary().await {
        Ok(summary) => ApiResponse::ok(summary).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Performance sample body.
#[derive(Debug, Deserialize)]
pub struct SampleRequest {
    pub method: String,
    pub route: String,
    pub duration_ms: f64,
    pub status_code: u16,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// POST /api/v1/samples
pub async fn record_sample(
    State(state): State<ApiState>,
    Json(req): Json<SampleRequest>,
) -> impl IntoResponse {
    state
        .monitor
        .record_metric(
            &req.method,
            &req.route,
            req.duration_ms,
            req.status_code,
            req.user_id.as_deref(),
        )
        .await;
    accepted()
}

// ── Security ───────────────────────────────────────────────────

/// Security event body. The timestamp is assigned on receipt.
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    #[serde(rename = "type")]
    pub event_type: SecurityEventType,
    pub severity: Severity,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl From<EventRequest> for SecurityEvent {
    fn from(req: EventRequest) -> Self {
        SecurityEvent {
            event_type: req.event_type,
            user_id: req.user_id,
            ip_address: req.ip_address,
            severity: req.severity,
            context: EventContext {
                endpoint: req.endpoint,
                user_agent: req.user_agent,
                details: req.details,
            },
            timestamp: 0,
        }
    }
}

/// POST /api/v1/events
pub async fn record_event(
    State(state): State<ApiState>,
    Json(req): Json<EventRequest>,
) -> impl IntoResponse {
    debug!(event_type = %req.event_type, "security event received");
    state.monitor.record_event(req.into()).await;
    accepted()
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/events?limit=
pub async fn recent_events(
    State(state): State<ApiState>,
    Query(q): Query<EventsQuery>,
) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT);
    match state.monitor.reader().get_recent_events(limit).await {
        Ok(events) => ApiResponse::ok(events).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/alerts
pub async fn list_alerts(State(state): State<ApiState>) -> impl IntoResponse {
    match state.monitor.get_active_alerts().await {
        Ok(alerts) => ApiResponse::ok(alerts).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    match state.monitor.prometheus().await {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

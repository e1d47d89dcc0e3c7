//! vigil-api — HTTP surface for the Vigil monitor.
//!
//! Thin axum handlers over [`vigil_monitor::Monitor`]. Ingestion endpoints
//! accept work and never report recorder failures; read endpoints surface
//! store errors as 500s.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Store reachability (503 when unreachable) |
//! | GET | `/api/v1/stats` | All operation statistics |
//! | GET | `/api/v1/stats/lookup?method=&route=` | One operation's statistics |
//! | GET | `/api/v1/summary` | Usage totals |
//! | GET | `/api/v1/alerts` | Active alerts |
//! | GET | `/api/v1/events?limit=` | Recent security events |
//! | POST | `/api/v1/samples` | Record a performance sample |
//! | POST | `/api/v1/events` | Record a security event |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use vigil_monitor::Monitor;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub monitor: Arc<Monitor>,
}

/// Build the complete API router.
pub fn build_router(monitor: Arc<Monitor>) -> Router {
    let state = ApiState { monitor };

    let api_routes = Router::new()
        .route("/stats", get(handlers::list_stats))
        .route("/stats/lookup", get(handlers::lookup_stats))
        .route("/summary", get(handlers::summary))
        .route("/alerts", get(handlers::list_alerts))
        .route("/events", get(handlers::recent_events).post(handlers::record_event))
        .route("/samples", post(handlers::record_sample))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health).with_state(state.clone()))
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}

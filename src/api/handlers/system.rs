//! System endpoints: health check, worker counters, routing table.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::app_state::AppState;
use crate::queue::QueueBinding;
use crate::worker::StatsSnapshot;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// Routing table response.
#[derive(Debug, Serialize)]
pub struct RoutingResponse {
    routine_types: Vec<&'static str>,
    bindings: Vec<QueueBinding>,
}

/// `GET /health`: service health status.
pub async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /stats`: worker counters.
pub async fn stats_handler(State(state): State<AppState>) -> (StatusCode, Json<StatsSnapshot>) {
    (StatusCode::OK, Json(state.stats.snapshot()))
}

/// `GET /config/routines`: executable routine types and queue bindings.
pub async fn routines_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<RoutingResponse>) {
    let bindings = state.bindings.all().into_iter().cloned().collect();
    (
        StatusCode::OK,
        Json(RoutingResponse {
            routine_types: state.routines.routine_types(),
            bindings,
        }),
    )
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/config/routines", get(routines_handler))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::queue::QueueBindings;
    use crate::routine::RoutineRegistry;
    use crate::worker::WorkerStats;

    fn state() -> AppState {
        let Ok(bindings) = QueueBindings::parse("sme_indexer=sme-q", None, Some("dlq")) else {
            panic!("bindings");
        };
        AppState {
            stats: Arc::new(WorkerStats::new()),
            bindings,
            routines: Arc::new(RoutineRegistry::new()),
        }
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (status, Json(body)) = health_handler().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "healthy");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn stats_reflect_worker_counters() {
        let state = state();
        state.stats.record_received();
        let (_, Json(snapshot)) = stats_handler(State(state)).await;
        assert_eq!(snapshot.received, 1);
    }

    #[tokio::test]
    async fn routing_table_lists_bindings() {
        let (_, Json(body)) = routines_handler(State(state())).await;
        assert!(body.routine_types.is_empty());
        assert_eq!(body.bindings.len(), 1);
        let Some(binding) = body.bindings.first() else {
            panic!("binding");
        };
        assert_eq!(binding.queue_url, "sme-q");
        assert_eq!(binding.dead_letter_url.as_deref(), Some("dlq"));
    }
}

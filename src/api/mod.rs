//! HTTP layer: health, counters and routing configuration.
//!
//! The worker has no business API; these endpoints exist for load
//! balancers and operators.

pub mod handlers;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete router with all system endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new().merge(handlers::system::routes())
}

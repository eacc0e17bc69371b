//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::queue::QueueBindings;
use crate::routine::RoutineRegistry;
use crate::worker::WorkerStats;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live counters of the worker runtime.
    pub stats: Arc<WorkerStats>,
    /// Routine-to-queue binding table.
    pub bindings: QueueBindings,
    /// Routines this process can execute.
    pub routines: Arc<RoutineRegistry>,
}

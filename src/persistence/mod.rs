//! PostgreSQL backends: queue, stream and dedupe store.
//!
//! All three share one `sqlx::PgPool`. Tables are created idempotently at
//! startup by [`schema::ensure_schema`]; there are no migrations.

pub mod dedupe;
pub mod queue;
pub mod schema;
pub mod stream;

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use dedupe::PostgresDedupeStore;
pub use queue::PostgresQueue;
pub use schema::ensure_schema;
pub use stream::PostgresStream;

use crate::config::WorkerConfig;
use crate::error::PipelineError;

/// Opens the connection pool described by `config`.
///
/// # Errors
///
/// Returns [`PipelineError::Storage`] if no connection can be established.
pub async fn connect(config: &WorkerConfig) -> Result<PgPool, PipelineError> {
    connect_to(config, &config.database_url).await
}

/// Opens a pool to `url` with the pool limits of `config`.
///
/// Used for queue endpoint overrides that live in another database.
///
/// # Errors
///
/// Returns [`PipelineError::Storage`] if no connection can be established.
pub async fn connect_to(config: &WorkerConfig, url: &str) -> Result<PgPool, PipelineError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(url)
        .await?;
    tracing::info!(
        max_connections = config.database_max_connections,
        "database pool ready"
    );
    Ok(pool)
}

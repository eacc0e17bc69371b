//! Table definitions.

use sqlx::PgPool;

use crate::error::PipelineError;

const STATEMENTS: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS sme_queue_messages (\
        id UUID PRIMARY KEY, \
        queue_url TEXT NOT NULL, \
        body TEXT NOT NULL, \
        receive_count INTEGER NOT NULL DEFAULT 0, \
        receipt UUID, \
        visible_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
        enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now())",
    "CREATE INDEX IF NOT EXISTS sme_queue_messages_visible_idx \
        ON sme_queue_messages (queue_url, visible_at)",
    "CREATE UNIQUE INDEX IF NOT EXISTS sme_queue_messages_receipt_idx \
        ON sme_queue_messages (receipt)",
    "CREATE TABLE IF NOT EXISTS sme_stream_records (\
        sequence BIGSERIAL PRIMARY KEY, \
        stream_name TEXT NOT NULL, \
        partition_key TEXT NOT NULL, \
        data BYTEA NOT NULL, \
        written_at TIMESTAMPTZ NOT NULL DEFAULT now())",
    "CREATE TABLE IF NOT EXISTS sme_seen_events (\
        blockchain_id TEXT NOT NULL, \
        transaction_hash TEXT NOT NULL, \
        seen_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
        PRIMARY KEY (blockchain_id, transaction_hash))",
    "CREATE INDEX IF NOT EXISTS sme_seen_events_seen_at_idx ON sme_seen_events (seen_at)",
];

/// Creates every table and index that does not exist yet.
///
/// # Errors
///
/// Returns [`PipelineError::Storage`] if a statement fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), PipelineError> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!(statements = STATEMENTS.len(), "schema ensured");
    Ok(())
}

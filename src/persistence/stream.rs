//! Append-only stream table.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::PipelineError;
use crate::stream::{RecordStatus, StreamRecord, StreamSink};

/// Stream sink writing to `sme_stream_records`.
///
/// Each record is inserted on its own, so a batch can partially succeed
/// exactly like a managed stream does.
#[derive(Debug, Clone)]
pub struct PostgresStream {
    pool: PgPool,
}

impl PostgresStream {
    /// Creates a sink on `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamSink for PostgresStream {
    async fn put_records(
        &self,
        stream: &str,
        records: &[StreamRecord],
    ) -> Result<Vec<RecordStatus>, PipelineError> {
        let mut statuses = Vec::with_capacity(records.len());
        for record in records {
            let inserted = sqlx::query_scalar::<_, i64>(
                "INSERT INTO sme_stream_records (stream_name, partition_key, data) \
                 VALUES ($1, $2, $3) RETURNING sequence",
            )
            .bind(stream)
            .bind(&record.partition_key)
            .bind(&record.data)
            .fetch_one(&self.pool)
            .await;
            statuses.push(match inserted {
                Ok(sequence) => RecordStatus::Accepted {
                    sequence: sequence.to_string(),
                },
                Err(err) => RecordStatus::Rejected {
                    reason: err.to_string(),
                },
            });
        }
        Ok(statuses)
    }
}

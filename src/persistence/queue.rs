//! PostgreSQL visibility-timeout queue.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::queue::{QueueClient, ReceivedMessage};

/// Queue backed by the `sme_queue_messages` table.
///
/// Receivers claim rows with `FOR UPDATE SKIP LOCKED`, so concurrent workers
/// never receive the same delivery.
#[derive(Debug, Clone)]
pub struct PostgresQueue {
    pool: PgPool,
}

impl PostgresQueue {
    /// Creates a queue backend on `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn queue_error(err: sqlx::Error) -> PipelineError {
    PipelineError::Queue(err.to_string())
}

fn parse_receipt(receipt: &str) -> Result<Uuid, PipelineError> {
    Uuid::parse_str(receipt).map_err(|e| PipelineError::Queue(format!("invalid receipt: {e}")))
}

#[async_trait]
impl QueueClient for PostgresQueue {
    async fn send(&self, queue_url: &str, body: &str) -> Result<String, PipelineError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO sme_queue_messages (id, queue_url, body) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(queue_url)
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(queue_error)?;
        Ok(id.to_string())
    }

    async fn receive(
        &self,
        queue_url: &str,
        max: usize,
        visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>, PipelineError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, i32)>(
            "UPDATE sme_queue_messages m \
             SET receive_count = m.receive_count + 1, \
                 receipt = gen_random_uuid(), \
                 visible_at = now() + make_interval(secs => $3) \
             WHERE m.id IN ( \
                 SELECT id FROM sme_queue_messages \
                 WHERE queue_url = $1 AND visible_at <= now() \
                 ORDER BY enqueued_at \
                 LIMIT $2 \
                 FOR UPDATE SKIP LOCKED) \
             RETURNING m.id, m.receipt, m.body, m.receive_count",
        )
        .bind(queue_url)
        .bind(i64::try_from(max).unwrap_or(i64::MAX))
        .bind(visibility.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(queue_error)?;

        Ok(rows
            .into_iter()
            .map(|(id, receipt, body, receive_count)| ReceivedMessage {
                message_id: id.to_string(),
                receipt: receipt.to_string(),
                body,
                receive_count: u32::try_from(receive_count).unwrap_or(0),
            })
            .collect())
    }

    async fn delete(&self, queue_url: &str, receipt: &str) -> Result<(), PipelineError> {
        let result =
            sqlx::query("DELETE FROM sme_queue_messages WHERE queue_url = $1 AND receipt = $2")
                .bind(queue_url)
                .bind(parse_receipt(receipt)?)
                .execute(&self.pool)
                .await
                .map_err(queue_error)?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::Queue(format!(
                "unknown receipt on {queue_url}"
            )));
        }
        Ok(())
    }

    async fn release(
        &self,
        queue_url: &str,
        receipt: &str,
        delay: Duration,
    ) -> Result<(), PipelineError> {
        let result = sqlx::query(
            "UPDATE sme_queue_messages \
             SET receipt = NULL, visible_at = now() + make_interval(secs => $3) \
             WHERE queue_url = $1 AND receipt = $2",
        )
        .bind(queue_url)
        .bind(parse_receipt(receipt)?)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(queue_error)?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::Queue(format!(
                "unknown receipt on {queue_url}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_receipt() {
        assert!(parse_receipt("not-a-uuid").is_err());
        assert!(parse_receipt(&Uuid::new_v4().to_string()).is_ok());
    }
}

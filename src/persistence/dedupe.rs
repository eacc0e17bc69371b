//! PostgreSQL dedupe store.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;

use crate::domain::{BlockchainId, DedupeIdentity};
use crate::error::PipelineError;
use crate::stream::DedupeStore;

/// Dedupe store backed by `sme_seen_events`.
///
/// Inserts use `ON CONFLICT DO NOTHING`, so concurrent workers recording the
/// same identity never conflict.
#[derive(Debug, Clone)]
pub struct PostgresDedupeStore {
    pool: PgPool,
}

impl PostgresDedupeStore {
    /// Creates a store on `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deletes identities recorded more than `days` days ago.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] on database failure. A window
    /// too large to represent deletes nothing.
    pub async fn delete_older_than(&self, days: u64) -> Result<u64, PipelineError> {
        let Some(cutoff) = retention_cutoff(Utc::now(), days) else {
            tracing::warn!(days, "dedupe retention window out of range, cleanup skipped");
            return Ok(0);
        };
        let result = sqlx::query("DELETE FROM sme_seen_events WHERE seen_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// `now` minus `days` days, or `None` when that is not a valid instant.
fn retention_cutoff(now: DateTime<Utc>, days: u64) -> Option<DateTime<Utc>> {
    let window = TimeDelta::try_days(i64::try_from(days).ok()?)?;
    now.checked_sub_signed(window)
}

/// Groups transaction hashes by chain.
fn by_chain(identities: &[DedupeIdentity]) -> BTreeMap<BlockchainId, Vec<String>> {
    let mut grouped: BTreeMap<BlockchainId, Vec<String>> = BTreeMap::new();
    for id in identities {
        grouped
            .entry(id.blockchain_id())
            .or_default()
            .push(id.transaction_hash().to_string());
    }
    grouped
}

#[async_trait]
impl DedupeStore for PostgresDedupeStore {
    async fn seen(
        &self,
        identities: &[DedupeIdentity],
    ) -> Result<HashSet<DedupeIdentity>, PipelineError> {
        let mut seen = HashSet::new();
        for (chain, hashes) in by_chain(identities) {
            let found = sqlx::query_scalar::<_, String>(
                "SELECT transaction_hash FROM sme_seen_events \
                 WHERE blockchain_id = $1 AND transaction_hash = ANY($2)",
            )
            .bind(chain.as_str())
            .bind(&hashes)
            .fetch_all(&self.pool)
            .await?;
            seen.extend(
                found
                    .into_iter()
                    .filter_map(|hash| DedupeIdentity::new(chain, hash)),
            );
        }
        Ok(seen)
    }

    async fn record(&self, identities: &[DedupeIdentity]) -> Result<(), PipelineError> {
        for (chain, hashes) in by_chain(identities) {
            sqlx::query(
                "INSERT INTO sme_seen_events (blockchain_id, transaction_hash) \
                 SELECT $1, UNNEST($2::text[]) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(chain.as_str())
            .bind(&hashes)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

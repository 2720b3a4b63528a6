//! # PostgreSQL Send Attempt Repository
//!
//! The `(rfq_id, idempotency_key)` index is deliberately non-unique.
//! [`insert_if_absent`](SendAttemptRepository::insert_if_absent) serializes
//! inserts per RFQ with an advisory lock and looks the key up before
//! inserting.

use crate::domain::entities::{DispatchTarget, NewSendAttempt, SendAttempt};
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{
    AttemptId, Channel, CounterpartyId, IdempotencyKey, RfqId, SendStatus,
};
use crate::infrastructure::persistence::postgres::{
    advisory_lock, from_db_version, query_error, to_db_version,
};
use crate::infrastructure::persistence::traits::{
    Insertion, RepositoryError, RepositoryResult, SendAttemptRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

const ATTEMPT_COLUMNS: &str = "id, rfq_id, channel, counterparty_id, status, idempotency_key, \
     retry_of_attempt_id, chain_depth, max_retries, provider_message_id, error, metadata, \
     version, created_at, updated_at";

/// PostgreSQL implementation of [`SendAttemptRepository`].
#[derive(Debug, Clone)]
pub struct PostgresSendAttemptRepository {
    pool: PgPool,
}

impl PostgresSendAttemptRepository {
    /// Creates a new repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SendAttemptRepository for PostgresSendAttemptRepository {
    async fn insert_if_absent(
        &self,
        new: NewSendAttempt,
    ) -> RepositoryResult<Insertion<SendAttempt>> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        advisory_lock(&mut tx, &format!("rfq_send_attempt:{}", new.rfq_id)).await?;

        let existing: Option<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM rfq_send_attempts \
             WHERE rfq_id = $1 AND idempotency_key = $2 ORDER BY id LIMIT 1"
        ))
        .bind(new.rfq_id.get())
        .bind(new.idempotency_key.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?;

        if let Some(row) = existing {
            tx.commit().await.map_err(query_error)?;
            debug!(rfq_id = %new.rfq_id, idempotency_key = %new.idempotency_key, "attempt key hit");
            return row.try_into_attempt().map(Insertion::Existing);
        }

        if let Some(parent) = new.retry_of_attempt_id {
            let successor: Option<(i64,)> = sqlx::query_as(
                "SELECT id FROM rfq_send_attempts WHERE retry_of_attempt_id = $1 LIMIT 1",
            )
            .bind(parent.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?;
            if successor.is_some() {
                return Err(RepositoryError::duplicate("send_attempt successor", parent));
            }
        }

        let row: AttemptRow = sqlx::query_as(&format!(
            "INSERT INTO rfq_send_attempts \
             (rfq_id, channel, counterparty_id, status, idempotency_key, retry_of_attempt_id, \
              chain_depth, max_retries, metadata) \
             VALUES ($1, $2, $3, 'queued', $4, $5, $6, $7, $8) \
             RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(new.rfq_id.get())
        .bind(new.target.channel.as_str())
        .bind(new.target.counterparty_id.map(CounterpartyId::get))
        .bind(new.idempotency_key.as_str())
        .bind(new.retry_of_attempt_id.map(AttemptId::get))
        .bind(to_db_int(new.chain_depth)?)
        .bind(to_db_int(new.max_retries)?)
        .bind(&new.metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        row.try_into_attempt().map(Insertion::Created)
    }

    async fn get(&self, id: AttemptId) -> RepositoryResult<Option<SendAttempt>> {
        let row: Option<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM rfq_send_attempts WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(AttemptRow::try_into_attempt).transpose()
    }

    async fn find_by_key(
        &self,
        rfq_id: RfqId,
        key: &IdempotencyKey,
    ) -> RepositoryResult<Option<SendAttempt>> {
        let row: Option<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM rfq_send_attempts \
             WHERE rfq_id = $1 AND idempotency_key = $2 ORDER BY id LIMIT 1"
        ))
        .bind(rfq_id.get())
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(AttemptRow::try_into_attempt).transpose()
    }

    async fn find_by_rfq(&self, rfq_id: RfqId) -> RepositoryResult<Vec<SendAttempt>> {
        let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM rfq_send_attempts WHERE rfq_id = $1 ORDER BY id ASC"
        ))
        .bind(rfq_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter().map(AttemptRow::try_into_attempt).collect()
    }

    async fn find_successor(&self, id: AttemptId) -> RepositoryResult<Option<SendAttempt>> {
        let row: Option<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM rfq_send_attempts \
             WHERE retry_of_attempt_id = $1 ORDER BY id LIMIT 1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(AttemptRow::try_into_attempt).transpose()
    }

    async fn find_by_status(
        &self,
        status: SendStatus,
        limit: usize,
    ) -> RepositoryResult<Vec<SendAttempt>> {
        let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM rfq_send_attempts \
             WHERE status = $1 ORDER BY id ASC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter().map(AttemptRow::try_into_attempt).collect()
    }

    async fn update(&self, attempt: &SendAttempt, expected_version: u64) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE rfq_send_attempts
            SET status = $3, provider_message_id = $4, error = $5, metadata = $6,
                version = $7, updated_at = $8
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(attempt.id().get())
        .bind(to_db_version(expected_version)?)
        .bind(attempt.status().as_str())
        .bind(attempt.provider_message_id())
        .bind(attempt.error())
        .bind(attempt.metadata())
        .bind(to_db_version(attempt.version())?)
        .bind(*attempt.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM rfq_send_attempts WHERE id = $1")
                .bind(attempt.id().get())
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;

        match current {
            Some((actual,)) => Err(RepositoryError::version_conflict(
                "send_attempt",
                attempt.id(),
                expected_version,
                from_db_version(actual)?,
            )),
            None => Err(RepositoryError::not_found("send_attempt", attempt.id())),
        }
    }
}

fn to_db_int(value: u32) -> RepositoryResult<i32> {
    i32::try_from(value).map_err(|_| RepositoryError::internal("integer overflow"))
}

fn from_db_int(value: i32) -> RepositoryResult<u32> {
    u32::try_from(value).map_err(|_| RepositoryError::serialization("negative integer"))
}

/// Row type for attempt queries.
#[derive(Debug, sqlx::FromRow)]
struct AttemptRow {
    id: i64,
    rfq_id: i64,
    channel: String,
    counterparty_id: Option<i64>,
    status: String,
    idempotency_key: String,
    retry_of_attempt_id: Option<i64>,
    chain_depth: i32,
    max_retries: i32,
    provider_message_id: Option<String>,
    error: Option<String>,
    metadata: serde_json::Value,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AttemptRow {
    fn try_into_attempt(self) -> RepositoryResult<SendAttempt> {
        let channel = self
            .channel
            .parse::<Channel>()
            .map_err(|e| RepositoryError::serialization(e.to_string()))?;
        let status = self
            .status
            .parse::<SendStatus>()
            .map_err(|e| RepositoryError::serialization(e.to_string()))?;

        Ok(SendAttempt::from_parts(
            AttemptId::new(self.id),
            RfqId::new(self.rfq_id),
            DispatchTarget::new(channel, self.counterparty_id.map(CounterpartyId::new)),
            status,
            IdempotencyKey::new(self.idempotency_key),
            self.retry_of_attempt_id.map(AttemptId::new),
            from_db_int(self.chain_depth)?,
            from_db_int(self.max_retries)?,
            self.provider_message_id,
            self.error,
            self.metadata,
            from_db_version(self.version)?,
            Timestamp::from(self.created_at),
            Timestamp::from(self.updated_at),
        ))
    }
}

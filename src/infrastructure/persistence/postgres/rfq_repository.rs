//! # PostgreSQL RFQ Repository

use crate::domain::entities::Rfq;
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{QuoteId, RfqId, RfqStatus, UserId};
use crate::infrastructure::persistence::postgres::{from_db_version, query_error, to_db_version};
use crate::infrastructure::persistence::traits::{
    RepositoryError, RepositoryResult, RfqRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

const RFQ_COLUMNS: &str = "id, message_text, status, sent_at, awarded_at, awarded_quote_id, \
     failure_reason, created_by, version, created_at, updated_at";

/// PostgreSQL implementation of [`RfqRepository`].
#[derive(Debug, Clone)]
pub struct PostgresRfqRepository {
    pool: PgPool,
}

impl PostgresRfqRepository {
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
impl RfqRepository for PostgresRfqRepository {
    async fn create(
        &self,
        message_text: &str,
        created_by: Option<UserId>,
    ) -> RepositoryResult<Rfq> {
        let row: RfqRow = sqlx::query_as(&format!(
            "INSERT INTO rfqs (message_text, status, created_by) VALUES ($1, 'draft', $2) \
             RETURNING {RFQ_COLUMNS}"
        ))
        .bind(message_text)
        .bind(created_by.map(UserId::get))
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        row.try_into_rfq()
    }

    async fn get(&self, id: RfqId) -> RepositoryResult<Option<Rfq>> {
        let row: Option<RfqRow> =
            sqlx::query_as(&format!("SELECT {RFQ_COLUMNS} FROM rfqs WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;

        row.map(RfqRow::try_into_rfq).transpose()
    }

    async fn update(&self, rfq: &Rfq, expected_version: u64) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE rfqs
            SET message_text = $3, status = $4, sent_at = $5, awarded_at = $6,
                awarded_quote_id = $7, failure_reason = $8, version = $9, updated_at = $10
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(rfq.id().get())
        .bind(to_db_version(expected_version)?)
        .bind(rfq.message_text())
        .bind(rfq.status().as_str())
        .bind(rfq.sent_at().map(|t| *t.as_datetime()))
        .bind(rfq.awarded_at().map(|t| *t.as_datetime()))
        .bind(rfq.awarded_quote_id().map(QuoteId::get))
        .bind(rfq.failure_reason())
        .bind(to_db_version(rfq.version())?)
        .bind(*rfq.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current: Option<(i64,)> = sqlx::query_as("SELECT version FROM rfqs WHERE id = $1")
            .bind(rfq.id().get())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        match current {
            Some((actual,)) => Err(RepositoryError::version_conflict(
                "rfq",
                rfq.id(),
                expected_version,
                from_db_version(actual)?,
            )),
            None => Err(RepositoryError::not_found("rfq", rfq.id())),
        }
    }

    async fn count(&self) -> RepositoryResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rfqs")
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(count.max(0) as u64)
    }
}

/// Row type for RFQ queries.
#[derive(Debug, sqlx::FromRow)]
struct RfqRow {
    id: i64,
    message_text: String,
    status: String,
    sent_at: Option<DateTime<Utc>>,
    awarded_at: Option<DateTime<Utc>>,
    awarded_quote_id: Option<i64>,
    failure_reason: Option<String>,
    created_by: Option<i64>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RfqRow {
    fn try_into_rfq(self) -> RepositoryResult<Rfq> {
        let status = self
            .status
            .parse::<RfqStatus>()
            .map_err(|e| RepositoryError::serialization(e.to_string()))?;

        Ok(Rfq::from_parts(
            RfqId::new(self.id),
            self.message_text,
            status,
            self.sent_at.map(Timestamp::from),
            self.awarded_at.map(Timestamp::from),
            self.awarded_quote_id.map(QuoteId::new),
            self.failure_reason,
            self.created_by.map(UserId::new),
            from_db_version(self.version)?,
            Timestamp::from(self.created_at),
            Timestamp::from(self.updated_at),
        ))
    }
}

//! # PostgreSQL Timeline Event Store
//!
//! Append-only. Keyed appends take an advisory lock on the key so the
//! lookup and the insert are one serialized step per key.

use crate::domain::entities::TimelineEvent;
use crate::domain::events::{NewTimelineEvent, TimelineEventType};
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{CorrelationId, EventId, IdempotencyKey, UserId, Visibility};
use crate::infrastructure::persistence::postgres::{advisory_lock, query_error};
use crate::infrastructure::persistence::traits::{
    Insertion, RepositoryError, RepositoryResult, TimelineEventStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

const EVENT_COLUMNS: &str = "id, event_type, subject_type, subject_id, correlation_id, \
     idempotency_key, visibility, actor_user_id, payload, meta, occurred_at";

/// PostgreSQL implementation of [`TimelineEventStore`].
#[derive(Debug, Clone)]
pub struct PostgresTimelineEventStore {
    pool: PgPool,
}

impl PostgresTimelineEventStore {
    /// Creates a new store.
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

fn visibility_names(visibilities: &[Visibility]) -> Vec<String> {
    visibilities.iter().map(|v| v.as_str().to_string()).collect()
}

#[async_trait]
impl TimelineEventStore for PostgresTimelineEventStore {
    async fn append_if_absent(
        &self,
        event: NewTimelineEvent,
    ) -> RepositoryResult<Insertion<TimelineEvent>> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        if let Some(key) = &event.idempotency_key {
            advisory_lock(&mut tx, &format!("timeline:{key}")).await?;

            let existing: Option<EventRow> = sqlx::query_as(&format!(
                "SELECT {EVENT_COLUMNS} FROM timeline_events \
                 WHERE idempotency_key = $1 ORDER BY id LIMIT 1"
            ))
            .bind(key.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?;

            if let Some(row) = existing {
                tx.commit().await.map_err(query_error)?;
                return row.try_into_event().map(Insertion::Existing);
            }
        }

        let row: EventRow = sqlx::query_as(&format!(
            "INSERT INTO timeline_events \
             (event_type, subject_type, subject_id, correlation_id, idempotency_key, \
              visibility, actor_user_id, payload, meta) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event.event_type.as_str())
        .bind(&event.subject_type)
        .bind(event.subject_id)
        .bind(event.correlation_id.as_str())
        .bind(event.idempotency_key.as_ref().map(IdempotencyKey::as_str))
        .bind(event.visibility.as_str())
        .bind(event.actor_user_id.map(UserId::get))
        .bind(&event.payload)
        .bind(event.meta.as_ref())
        .fetch_one(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        row.try_into_event().map(Insertion::Created)
    }

    async fn get(&self, id: EventId) -> RepositoryResult<Option<TimelineEvent>> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM timeline_events WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(EventRow::try_into_event).transpose()
    }

    async fn find_by_key(&self, key: &IdempotencyKey) -> RepositoryResult<Option<TimelineEvent>> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM timeline_events \
             WHERE idempotency_key = $1 ORDER BY id LIMIT 1"
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(EventRow::try_into_event).transpose()
    }

    async fn list_for_subject(
        &self,
        subject_type: &str,
        subject_id: i64,
        visibilities: &[Visibility],
    ) -> RepositoryResult<Vec<TimelineEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM timeline_events \
             WHERE subject_type = $1 AND subject_id = $2 AND visibility = ANY($3) \
             ORDER BY id ASC"
        ))
        .bind(subject_type)
        .bind(subject_id)
        .bind(visibility_names(visibilities))
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter().map(EventRow::try_into_event).collect()
    }

    async fn recent(
        &self,
        visibilities: &[Visibility],
        limit: usize,
    ) -> RepositoryResult<Vec<TimelineEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM timeline_events \
             WHERE visibility = ANY($1) ORDER BY id DESC LIMIT $2"
        ))
        .bind(visibility_names(visibilities))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter().map(EventRow::try_into_event).collect()
    }

    async fn list_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> RepositoryResult<Vec<TimelineEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM timeline_events \
             WHERE correlation_id = $1 ORDER BY id ASC"
        ))
        .bind(correlation_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter().map(EventRow::try_into_event).collect()
    }

    async fn count(&self) -> RepositoryResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM timeline_events")
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(count.max(0) as u64)
    }
}

/// Row type for timeline queries.
#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    event_type: String,
    subject_type: String,
    subject_id: i64,
    correlation_id: String,
    idempotency_key: Option<String>,
    visibility: String,
    actor_user_id: Option<i64>,
    payload: serde_json::Value,
    meta: Option<serde_json::Value>,
    occurred_at: DateTime<Utc>,
}

impl EventRow {
    fn try_into_event(self) -> RepositoryResult<TimelineEvent> {
        let event_type = self
            .event_type
            .parse::<TimelineEventType>()
            .map_err(|e| RepositoryError::serialization(e.to_string()))?;
        let visibility = self
            .visibility
            .parse::<Visibility>()
            .map_err(|e| RepositoryError::serialization(e.to_string()))?;

        let mut new = NewTimelineEvent::new(
            event_type,
            self.subject_type,
            self.subject_id,
            CorrelationId::new(self.correlation_id),
        )
        .with_visibility(visibility)
        .with_actor(self.actor_user_id.map(UserId::new))
        .with_payload(self.payload);
        new.idempotency_key = self.idempotency_key.map(IdempotencyKey::new);
        new.meta = self.meta;

        Ok(TimelineEvent::from_new(
            EventId::new(self.id),
            new,
            Timestamp::from(self.occurred_at),
        ))
    }
}

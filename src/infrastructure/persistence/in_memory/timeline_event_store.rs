//! # In-Memory Timeline Event Store
//!
//! In-memory implementation of [`TimelineEventStore`].
//!
//! Events live in a `Vec` in insertion order, with a side index from
//! idempotency key to position.

use crate::domain::entities::TimelineEvent;
use crate::domain::events::NewTimelineEvent;
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{CorrelationId, EventId, IdempotencyKey, Visibility};
use crate::infrastructure::persistence::traits::{
    Insertion, RepositoryResult, TimelineEventStore,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    events: Vec<TimelineEvent>,
    by_key: HashMap<IdempotencyKey, usize>,
}

/// In-memory implementation of [`TimelineEventStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryTimelineEventStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryTimelineEventStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .try_read()
            .map(|guard| guard.events.len())
            .unwrap_or(0)
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of every stored event in insertion order.
    pub async fn snapshot(&self) -> Vec<TimelineEvent> {
        self.state.read().await.events.clone()
    }
}

#[async_trait]
impl TimelineEventStore for InMemoryTimelineEventStore {
    async fn append_if_absent(
        &self,
        event: NewTimelineEvent,
    ) -> RepositoryResult<Insertion<TimelineEvent>> {
        let mut state = self.state.write().await;

        if let Some(key) = &event.idempotency_key
            && let Some(existing) = state.by_key.get(key).and_then(|&i| state.events.get(i))
        {
            return Ok(Insertion::Existing(existing.clone()));
        }

        let position = state.events.len();
        let id = EventId::new(i64::try_from(position).unwrap_or(i64::MAX).saturating_add(1));
        let key = event.idempotency_key.clone();
        let stored = TimelineEvent::from_new(id, event, Timestamp::now());
        state.events.push(stored.clone());
        if let Some(key) = key {
            state.by_key.insert(key, position);
        }
        Ok(Insertion::Created(stored))
    }

    async fn get(&self, id: EventId) -> RepositoryResult<Option<TimelineEvent>> {
        let state = self.state.read().await;
        let position = usize::try_from(id.get().saturating_sub(1)).ok();
        Ok(position
            .and_then(|i| state.events.get(i))
            .filter(|e| e.id() == id)
            .cloned())
    }

    async fn find_by_key(&self, key: &IdempotencyKey) -> RepositoryResult<Option<TimelineEvent>> {
        let state = self.state.read().await;
        Ok(state
            .by_key
            .get(key)
            .and_then(|&i| state.events.get(i))
            .cloned())
    }

    async fn list_for_subject(
        &self,
        subject_type: &str,
        subject_id: i64,
        visibilities: &[Visibility],
    ) -> RepositoryResult<Vec<TimelineEvent>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.is_about(subject_type, subject_id))
            .filter(|e| visibilities.contains(&e.visibility()))
            .cloned()
            .collect())
    }

    async fn recent(
        &self,
        visibilities: &[Visibility],
        limit: usize,
    ) -> RepositoryResult<Vec<TimelineEvent>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .rev()
            .filter(|e| visibilities.contains(&e.visibility()))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> RepositoryResult<Vec<TimelineEvent>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.correlation_id() == correlation_id)
            .cloned()
            .collect())
    }

    async fn count(&self) -> RepositoryResult<u64> {
        let state = self.state.read().await;
        Ok(state.events.len() as u64)
    }
}

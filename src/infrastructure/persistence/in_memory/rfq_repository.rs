//! # In-Memory RFQ Repository
//!
//! In-memory implementation of [`RfqRepository`].

use crate::domain::entities::Rfq;
use crate::domain::value_objects::{RfqId, UserId};
use crate::infrastructure::persistence::traits::{
    RepositoryError, RepositoryResult, RfqRepository,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    rows: HashMap<RfqId, Rfq>,
    last_id: i64,
}

/// In-memory implementation of [`RfqRepository`].
///
/// Ids are assigned from a counter starting at 1.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRfqRepository {
    state: Arc<RwLock<State>>,
}

impl InMemoryRfqRepository {
    /// Creates a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of RFQs in the repository.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .try_read()
            .map(|guard| guard.rows.len())
            .unwrap_or(0)
    }

    /// Returns true if the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RfqRepository for InMemoryRfqRepository {
    async fn create(
        &self,
        message_text: &str,
        created_by: Option<UserId>,
    ) -> RepositoryResult<Rfq> {
        let mut state = self.state.write().await;
        state.last_id = state.last_id.saturating_add(1);
        let rfq = Rfq::new(RfqId::new(state.last_id), message_text, created_by);
        state.rows.insert(rfq.id(), rfq.clone());
        Ok(rfq)
    }

    async fn get(&self, id: RfqId) -> RepositoryResult<Option<Rfq>> {
        let state = self.state.read().await;
        Ok(state.rows.get(&id).cloned())
    }

    async fn update(&self, rfq: &Rfq, expected_version: u64) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .rows
            .get_mut(&rfq.id())
            .ok_or_else(|| RepositoryError::not_found("rfq", rfq.id()))?;
        if stored.version() != expected_version {
            return Err(RepositoryError::version_conflict(
                "rfq",
                rfq.id(),
                expected_version,
                stored.version(),
            ));
        }
        *stored = rfq.clone();
        Ok(())
    }

    async fn count(&self) -> RepositoryResult<u64> {
        let state = self.state.read().await;
        Ok(state.rows.len() as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::value_objects::RfqStatus;

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let repo = InMemoryRfqRepository::new();
        let a = repo.create("a", None).await.unwrap();
        let b = repo.create("b", None).await.unwrap();
        assert_eq!(a.id(), RfqId::new(1));
        assert_eq!(b.id(), RfqId::new(2));
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn update_with_expected_version() {
        let repo = InMemoryRfqRepository::new();
        let mut rfq = repo.create("text", None).await.unwrap();
        let loaded = rfq.version();
        rfq.mark_sent().unwrap();
        repo.update(&rfq, loaded).await.unwrap();

        let stored = repo.get(rfq.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), RfqStatus::Sent);
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let repo = InMemoryRfqRepository::new();
        let rfq = repo.create("text", None).await.unwrap();

        let mut first = rfq.clone();
        first.mark_sent().unwrap();
        repo.update(&first, rfq.version()).await.unwrap();

        let mut second = rfq.clone();
        second.mark_failed("late").unwrap();
        let err = repo.update(&second, rfq.version()).await.unwrap_err();
        assert!(err.is_version_conflict());
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let repo = InMemoryRfqRepository::new();
        let rfq = Rfq::new(RfqId::new(99), "x", None);
        assert!(repo.update(&rfq, 1).await.unwrap_err().is_not_found());
    }
}

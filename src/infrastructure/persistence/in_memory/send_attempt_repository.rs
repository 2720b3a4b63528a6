//! # In-Memory Send Attempt Repository
//!
//! In-memory implementation of [`SendAttemptRepository`].
//!
//! The key lookup and the insert happen under one write lock, which makes
//! [`SendAttemptRepository::insert_if_absent`] atomic across concurrent
//! workers sharing the repository.

use crate::domain::entities::{NewSendAttempt, SendAttempt};
use crate::domain::value_objects::{AttemptId, IdempotencyKey, RfqId, SendStatus};
use crate::infrastructure::persistence::traits::{
    Insertion, RepositoryError, RepositoryResult, SendAttemptRepository,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<AttemptId, SendAttempt>,
    last_id: i64,
}

/// In-memory implementation of [`SendAttemptRepository`].
#[derive(Debug, Clone, Default)]
pub struct InMemorySendAttemptRepository {
    state: Arc<RwLock<State>>,
}

impl InMemorySendAttemptRepository {
    /// Creates a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of attempts in the repository.
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
impl SendAttemptRepository for InMemorySendAttemptRepository {
    async fn insert_if_absent(
        &self,
        new: NewSendAttempt,
    ) -> RepositoryResult<Insertion<SendAttempt>> {
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .rows
            .values()
            .find(|a| a.rfq_id() == new.rfq_id && *a.idempotency_key() == new.idempotency_key)
        {
            return Ok(Insertion::Existing(existing.clone()));
        }

        if let Some(parent) = new.retry_of_attempt_id
            && state
                .rows
                .values()
                .any(|a| a.retry_of_attempt_id() == Some(parent))
        {
            return Err(RepositoryError::duplicate(
                "send_attempt successor",
                parent,
            ));
        }

        state.last_id = state.last_id.saturating_add(1);
        let attempt = SendAttempt::from_new(AttemptId::new(state.last_id), new);
        state.rows.insert(attempt.id(), attempt.clone());
        Ok(Insertion::Created(attempt))
    }

    async fn get(&self, id: AttemptId) -> RepositoryResult<Option<SendAttempt>> {
        let state = self.state.read().await;
        Ok(state.rows.get(&id).cloned())
    }

    async fn find_by_key(
        &self,
        rfq_id: RfqId,
        key: &IdempotencyKey,
    ) -> RepositoryResult<Option<SendAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .values()
            .find(|a| a.rfq_id() == rfq_id && a.idempotency_key() == key)
            .cloned())
    }

    async fn find_by_rfq(&self, rfq_id: RfqId) -> RepositoryResult<Vec<SendAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .values()
            .filter(|a| a.rfq_id() == rfq_id)
            .cloned()
            .collect())
    }

    async fn find_successor(&self, id: AttemptId) -> RepositoryResult<Option<SendAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .values()
            .find(|a| a.retry_of_attempt_id() == Some(id))
            .cloned())
    }

    async fn find_by_status(
        &self,
        status: SendStatus,
        limit: usize,
    ) -> RepositoryResult<Vec<SendAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .values()
            .filter(|a| a.status() == status)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update(&self, attempt: &SendAttempt, expected_version: u64) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .rows
            .get_mut(&attempt.id())
            .ok_or_else(|| RepositoryError::not_found("send_attempt", attempt.id()))?;
        if stored.version() != expected_version {
            return Err(RepositoryError::version_conflict(
                "send_attempt",
                attempt.id(),
                expected_version,
                stored.version(),
            ));
        }
        *stored = attempt.clone();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::entities::DispatchTarget;
    use crate::domain::value_objects::Channel;
    use serde_json::json;

    fn new_attempt(rfq: i64, key: &str, retry_of: Option<AttemptId>) -> NewSendAttempt {
        NewSendAttempt {
            rfq_id: RfqId::new(rfq),
            target: DispatchTarget::new(Channel::Email, None),
            idempotency_key: IdempotencyKey::new(key),
            retry_of_attempt_id: retry_of,
            chain_depth: if retry_of.is_some() { 2 } else { 1 },
            max_retries: 3,
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn same_key_returns_existing() {
        let repo = InMemorySendAttemptRepository::new();
        let first = repo.insert_if_absent(new_attempt(1, "k", None)).await.unwrap();
        let second = repo.insert_if_absent(new_attempt(1, "k", None)).await.unwrap();
        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.get().id(), second.get().id());
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn same_key_other_rfq_is_distinct() {
        let repo = InMemorySendAttemptRepository::new();
        repo.insert_if_absent(new_attempt(1, "k", None)).await.unwrap();
        let other = repo.insert_if_absent(new_attempt(2, "k", None)).await.unwrap();
        assert!(other.is_created());
    }

    #[tokio::test]
    async fn second_successor_is_rejected() {
        let repo = InMemorySendAttemptRepository::new();
        let root = repo
            .insert_if_absent(new_attempt(1, "k1", None))
            .await
            .unwrap()
            .into_inner();
        repo.insert_if_absent(new_attempt(1, "k2", Some(root.id())))
            .await
            .unwrap();
        let err = repo
            .insert_if_absent(new_attempt(1, "k3", Some(root.id())))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
        let successor = repo.find_successor(root.id()).await.unwrap().unwrap();
        assert_eq!(successor.idempotency_key().as_str(), "k2");
    }

    #[tokio::test]
    async fn concurrent_inserts_collapse() {
        let repo = InMemorySendAttemptRepository::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.insert_if_absent(new_attempt(1, "k", None)).await })
            })
            .collect();
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_created() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(repo.find_by_rfq(RfqId::new(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_and_find_by_status() {
        let repo = InMemorySendAttemptRepository::new();
        let mut attempt = repo
            .insert_if_absent(new_attempt(1, "k", None))
            .await
            .unwrap()
            .into_inner();
        let loaded = attempt.version();
        attempt.claim().unwrap();
        repo.update(&attempt, loaded).await.unwrap();

        assert!(repo.find_by_status(SendStatus::Queued, 10).await.unwrap().is_empty());
        assert_eq!(repo.find_by_status(SendStatus::Sent, 10).await.unwrap().len(), 1);
        assert!(repo.update(&attempt, loaded).await.unwrap_err().is_version_conflict());
    }
}

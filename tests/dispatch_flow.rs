//! End-to-end dispatch over the in-memory adapters with concurrent workers.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use rfq_dispatch::application::services::{
    Actor, AttemptRef, CommentRequest, DispatchPool, DispatchQueue, DispatchWorker, Outcome,
    OverallOutcome, RfqDispatcher, SendRequest, TimelineLog, TransportCallback,
};
use rfq_dispatch::config::{DispatchConfig, TimelineConfig};
use rfq_dispatch::domain::entities::DispatchTarget;
use rfq_dispatch::domain::events::{NewTimelineEvent, TimelineEventType};
use rfq_dispatch::domain::services::{normalize_mentions, thread_key_for};
use rfq_dispatch::domain::value_objects::{
    Channel, CorrelationId, CounterpartyId, IdempotencyKey, QuoteId, RfqId, RfqStatus, Role,
    SendStatus, UserId, Visibility,
};
use rfq_dispatch::infrastructure::persistence::in_memory::{
    InMemoryRfqRepository, InMemorySendAttemptRepository, InMemoryTimelineEventStore,
};
use rfq_dispatch::infrastructure::transport::SimulatedTransport;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    dispatcher: Arc<RfqDispatcher>,
    pool: DispatchPool,
}

fn dispatcher() -> RfqDispatcher {
    let timeline = TimelineLog::new(
        Arc::new(InMemoryTimelineEventStore::new()),
        Arc::new(TimelineConfig::default()),
    );
    RfqDispatcher::new(
        Arc::new(InMemoryRfqRepository::new()),
        Arc::new(InMemorySendAttemptRepository::new()),
        timeline,
        DispatchConfig::default()
            .with_retry_backoff_ms(1)
            .with_default_max_retries(2),
    )
}

fn harness(workers: usize) -> Harness {
    let (queue, rx) = DispatchQueue::bounded(64);
    let dispatcher = Arc::new(dispatcher().with_queue(queue.clone()));
    let worker = Arc::new(DispatchWorker::new(
        Arc::clone(&dispatcher),
        Arc::new(SimulatedTransport::new()),
    ));
    let pool = DispatchPool::spawn(worker, queue, rx, workers, CancellationToken::new());
    Harness { dispatcher, pool }
}

fn target(channel: Channel, cp: i64) -> DispatchTarget {
    DispatchTarget::new(channel, Some(CounterpartyId::new(cp)))
}

async fn wait_settled(d: &RfqDispatcher, rfq_id: RfqId) -> OverallOutcome {
    for _ in 0..400 {
        let overall = d.ledger().aggregate_outcome(rfq_id).await.unwrap().overall;
        if overall != OverallOutcome::InProgress {
            return overall;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    OverallOutcome::InProgress
}

async fn wait_status(d: &RfqDispatcher, rfq_id: RfqId, status: RfqStatus) -> bool {
    for _ in 0..400 {
        if d.state_machine().get(rfq_id).await.unwrap().status() == status {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

async fn count(d: &RfqDispatcher, rfq_id: RfqId, event_type: TimelineEventType) -> usize {
    d.timeline()
        .list_for_subject("rfq", rfq_id.get(), Role::Admin)
        .await
        .unwrap()
        .iter()
        .filter(|e| e.event_type() == event_type)
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_deliver_every_rfq() {
    let h = harness(4);
    let d = &h.dispatcher;

    let mut rfqs = Vec::new();
    for n in 0..5 {
        let rfq = d.create_rfq(&format!("Al {n}00t Q4"), Some(UserId::new(7))).await.unwrap();
        d.request_send(
            SendRequest::new(
                rfq.id(),
                vec![target(Channel::Email, 1), target(Channel::Api, 2), target(Channel::WhatsApp, 3)],
                CorrelationId::generate(),
            )
            .with_request_key(format!("req-{n}"))
            .with_metadata(json!({"failures_before_success": 1})),
        )
        .await
        .unwrap();
        rfqs.push(rfq.id());
    }

    for rfq_id in &rfqs {
        assert_eq!(wait_settled(d, *rfq_id).await, OverallOutcome::AllDelivered);
        let attempts = d.ledger().list(*rfq_id).await.unwrap();
        assert_eq!(attempts.len(), 6);
        assert_eq!(attempts.iter().filter(|a| a.retry_of_attempt_id().is_some()).count(), 3);
        assert_eq!(d.state_machine().get(*rfq_id).await.unwrap().status(), RfqStatus::Sent);
        assert_eq!(count(d, *rfq_id, TimelineEventType::RfqStateChanged).await, 1);
        assert_eq!(count(d, *rfq_id, TimelineEventType::RfqSendAttemptCreated).await, 6);
    }

    let award = d
        .award(rfqs[0], QuoteId::new(99), Some(UserId::new(7)), &CorrelationId::generate())
        .await
        .unwrap();
    assert_eq!(award.rfq.status(), RfqStatus::Awarded);
    assert!(award.rfq.awarded_at().is_some());

    h.pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exhausted_target_fails_rfq_once() {
    let h = harness(3);
    let d = &h.dispatcher;
    let rfq = d.create_rfq("Cu 25t Jan", None).await.unwrap();
    d.request_send(
        SendRequest::new(rfq.id(), vec![target(Channel::Broker, 4)], CorrelationId::generate())
            .with_max_retries(2)
            .with_metadata(json!({"force_failure": true})),
    )
    .await
    .unwrap();

    assert!(wait_status(d, rfq.id(), RfqStatus::Failed).await);
    let attempts = d.ledger().list(rfq.id()).await.unwrap();
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| a.status() == SendStatus::Failed));
    assert_eq!(attempts.iter().map(|a| a.chain_depth()).max(), Some(3));

    let rfq = d.state_machine().get(rfq.id()).await.unwrap();
    assert_eq!(rfq.failure_reason(), Some("retry_budget_exhausted"));
    assert_eq!(count(d, rfq.id(), TimelineEventType::RfqStateChanged).await, 2);

    h.pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn replayed_requests_collapse() {
    let d = Arc::new(dispatcher());
    let rfq = d.create_rfq("Zn 10t", None).await.unwrap();
    let request = SendRequest::new(
        rfq.id(),
        vec![target(Channel::Email, 1), target(Channel::Api, 1)],
        CorrelationId::new("corr-replay"),
    )
    .with_request_key("client-42");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let d = Arc::clone(&d);
        let request = request.clone();
        tasks.push(tokio::spawn(async move { d.request_send(request).await }));
    }
    let mut ids = HashSet::new();
    for task in tasks {
        let receipt = task.await.unwrap().unwrap();
        ids.extend(receipt.attempts.iter().map(|a| a.id()));
    }

    assert_eq!(ids.len(), 2);
    assert_eq!(d.ledger().list(rfq.id()).await.unwrap().len(), 2);
    assert_eq!(count(&d, rfq.id(), TimelineEventType::RfqSendRequested).await, 1);
    assert_eq!(count(&d, rfq.id(), TimelineEventType::RfqStateChanged).await, 1);
    assert_eq!(count(&d, rfq.id(), TimelineEventType::RfqSendAttemptCreated).await, 2);
}

#[tokio::test]
async fn failed_rfq_is_never_resurrected() {
    let d = dispatcher();
    let rfq = d.create_rfq("Ni 5t", None).await.unwrap();
    let receipt = d
        .request_send(SendRequest::new(rfq.id(), vec![target(Channel::Email, 1)], CorrelationId::generate()))
        .await
        .unwrap();
    let attempt = &receipt.attempts[0];
    let corr = CorrelationId::generate();
    d.cancel(rfq.id(), "desk closed", None, &corr).await.unwrap();

    let report = d
        .handle_callback(TransportCallback {
            attempt: AttemptRef::Key {
                rfq_id: rfq.id(),
                idempotency_key: attempt.idempotency_key().clone(),
            },
            outcome: Outcome::delivered("late-1"),
            correlation_id: corr.clone(),
        })
        .await
        .unwrap();
    assert_eq!(report.attempt.status(), SendStatus::Delivered);

    let rfq = d.state_machine().get(rfq.id()).await.unwrap();
    assert_eq!(rfq.status(), RfqStatus::Failed);
    assert!(d.award(rfq.id(), QuoteId::new(1), None, &corr).await.unwrap_err().is_invalid_transition());
    assert!(
        d.state_machine()
            .transition_to_sent(rfq.id(), rfq_dispatch::application::services::TransitionContext::new(None, &corr))
            .await
            .unwrap_err()
            .is_invalid_transition()
    );
}

#[tokio::test]
async fn append_is_idempotent() {
    let d = dispatcher();
    let key = IdempotencyKey::new("contract:9:created");
    let event = NewTimelineEvent::new(
        TimelineEventType::ContractCreated,
        "contract",
        9,
        CorrelationId::new("corr-contract"),
    )
    .with_idempotency_key(key)
    .with_payload(json!({"contract_no": "C-9"}));

    let first = d.timeline().append(event.clone()).await.unwrap();
    let second = d.timeline().append(event).await.unwrap();
    assert!(first.is_created());
    assert!(!second.is_created());
    assert_eq!(first.get().id(), second.get().id());
    let listed = d
        .timeline()
        .list_for_subject("contract", 9, Role::Compras)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn finance_events_are_gated_by_role() {
    let d = dispatcher();
    let rfq = d.create_rfq("Al 1t", None).await.unwrap();
    d.request_send(SendRequest::new(rfq.id(), vec![target(Channel::Email, 1)], CorrelationId::generate()))
        .await
        .unwrap();
    d.timeline()
        .add_comment(
            Actor::new(Some(UserId::new(3)), Role::Compras),
            CommentRequest {
                subject_type: "rfq".to_string(),
                subject_id: rfq.id().get(),
                body: "ping @Ana".to_string(),
                visibility: Visibility::All,
                mentions: vec![" Ana ".to_string(), "@ana".to_string()],
                attachments: Vec::new(),
                idempotency_key: Some(IdempotencyKey::new("comment:client:1")),
                meta: None,
            },
            CorrelationId::generate(),
        )
        .await
        .unwrap();

    let compras = d
        .timeline()
        .list_for_subject("rfq", rfq.id().get(), Role::Compras)
        .await
        .unwrap();
    assert!(compras.iter().all(|e| e.visibility() == Visibility::All));
    assert_eq!(compras.len(), 2);

    for role in [Role::Financeiro, Role::Admin] {
        let events = d
            .timeline()
            .list_for_subject("rfq", rfq.id().get(), role)
            .await
            .unwrap();
        assert!(events.iter().any(|e| e.visibility() == Visibility::Finance));
        assert!(events.len() > compras.len());
    }

    let auditor = d
        .timeline()
        .list_for_subject("rfq", rfq.id().get(), Role::Auditoria)
        .await
        .unwrap();
    assert!(auditor.iter().all(|e| e.visibility() == Visibility::All));
    assert_eq!(auditor.len(), compras.len());
}

#[test]
fn mentions_and_thread_keys() {
    let raw = [" User@Test.com ", "@user@test.com", "", "  ", "2", "2"];
    assert_eq!(normalize_mentions(raw), vec!["user@test.com", "2"]);
    assert_eq!(thread_key_for("rfq", 123).unwrap(), "rfq:123");
    assert_eq!(thread_key_for("rfq", 123).unwrap(), thread_key_for("rfq", 123).unwrap());
    assert!(thread_key_for("", 1).is_err());
    assert!(thread_key_for("rfq", 0).is_err());
}

//! Idempotency Integration Tests
//!
//! Concurrent duplicate webhook deliveries must produce exactly one
//! state-machine execution and identical outcomes for every caller.

use std::sync::Arc;
use std::time::Duration;

use chatflow::adapters::RecordingTransport;
use chatflow::domain::{Domain, InboundEvent, TenantContext};
use chatflow::engine::{NodeServices, StateMachine};
use chatflow::flows;
use chatflow::idempotency::IdempotencyService;
use chatflow::nlu::IntentDetector;
use chatflow::resilience::Resilience;
use chatflow::router::{DomainRouter, RouterSettings};
use chatflow::store::{InMemoryConversationStore, InMemoryTenantStore};

fn build_router(transport: Arc<RecordingTransport>) -> (Arc<DomainRouter>, Arc<InMemoryConversationStore>) {
    let tenants = Arc::new(
        InMemoryTenantStore::new().with_tenant(TenantContext::new("acme", Domain::Medical)),
    );
    let conversations = Arc::new(InMemoryConversationStore::new());
    let resilience = Arc::new(Resilience::default());
    let registry = Arc::new(flows::build_registry().unwrap());
    let services = Arc::new(NodeServices::new(resilience.clone()));

    let router = DomainRouter::new(
        tenants,
        conversations.clone(),
        Arc::new(IdempotencyService::new(Duration::from_secs(60))),
        IntentDetector::new(None, resilience.clone()),
        StateMachine::new(registry, services),
        resilience,
        RouterSettings::default(),
    )
    .with_transport(transport);

    (Arc::new(router), conversations)
}

#[tokio::test]
async fn test_concurrent_duplicates_execute_once() {
    let transport = Arc::new(RecordingTransport::new());
    let (router, _conversations) = build_router(transport.clone());

    // Two deliveries of message id "msg-42" for tenant "acme", concurrently
    let a = tokio::spawn({
        let router = router.clone();
        async move {
            router
                .handle(InboundEvent::text("acme", "5215550001", "msg-42", "hello"))
                .await
                .unwrap()
        }
    });
    let b = tokio::spawn({
        let router = router.clone();
        async move {
            router
                .handle(InboundEvent::text("acme", "5215550001", "msg-42", "hello"))
                .await
                .unwrap()
        }
    });

    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    // Exactly one execution delivered messages
    assert_eq!(transport.sent().len(), 1);

    // Both callers observe the same outbound message set
    assert_eq!(a.outcome.messages, b.outcome.messages);
    assert!(!a.outcome.messages.is_empty());

    // One of the two was the original
    assert_eq!(
        [a.duplicate, b.duplicate].iter().filter(|d| **d).count(),
        1
    );
}

#[tokio::test]
async fn test_n_fold_delivery_yields_identical_outcomes() {
    let transport = Arc::new(RecordingTransport::new());
    let (router, _) = build_router(transport.clone());

    let mut handles = Vec::new();
    for _ in 0..5 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            router
                .handle(InboundEvent::text("acme", "u1", "msg-7", "hi"))
                .await
                .unwrap()
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(transport.sent().len(), 1);
    let first = &outcomes[0].outcome.messages;
    for response in &outcomes {
        assert_eq!(&response.outcome.messages, first);
    }
    assert_eq!(outcomes.iter().filter(|r| !r.duplicate).count(), 1);
}

#[tokio::test]
async fn test_sequential_duplicate_replays_recorded_outcome() {
    let transport = Arc::new(RecordingTransport::new());
    let (router, _) = build_router(transport.clone());

    let original = router
        .handle(InboundEvent::text("acme", "u1", "msg-1", "hello"))
        .await
        .unwrap();
    let replay = router
        .handle(InboundEvent::text("acme", "u1", "msg-1", "hello"))
        .await
        .unwrap();

    assert!(!original.duplicate);
    assert!(replay.duplicate);
    assert_eq!(original.outcome.messages, replay.outcome.messages);

    // The replayed delivery does not re-send
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn test_distinct_message_ids_both_execute() {
    let transport = Arc::new(RecordingTransport::new());
    let (router, _) = build_router(transport.clone());

    let first = router
        .handle(InboundEvent::text("acme", "u1", "msg-1", "hello"))
        .await
        .unwrap();
    let second = router
        .handle(InboundEvent::text("acme", "u1", "msg-2", "1"))
        .await
        .unwrap();

    assert!(!first.duplicate);
    assert!(!second.duplicate);
    assert_eq!(transport.sent().len(), 2);
}

#[tokio::test]
async fn test_tenant_failure_does_not_consume_key() {
    let transport = Arc::new(RecordingTransport::new());
    let (router, _) = build_router(transport.clone());

    // Unknown tenant: rejected before admission
    let rejected = router
        .handle(InboundEvent::text("ghost", "u1", "msg-9", "hello"))
        .await;
    assert!(rejected.is_err());

    // The same message id for a real tenant is processed fresh
    let processed = router
        .handle(InboundEvent::text("acme", "u1", "msg-9", "hello"))
        .await
        .unwrap();
    assert!(!processed.duplicate);
}

//! Domain Router Integration Tests
//!
//! Error taxonomy at the router surface, routing priority through the
//! full stack, and the LLM fallback's failure behavior.

use std::sync::Arc;
use std::time::Duration;

use chatflow::adapters::{LlmProvider, ProviderError, ScriptedLlm};
use chatflow::domain::{Domain, InboundEvent, OutboundMessage, TenantContext, TenantError};
use chatflow::engine::{NodeServices, StateMachine};
use chatflow::flows;
use chatflow::idempotency::IdempotencyService;
use chatflow::nlu::IntentDetector;
use chatflow::resilience::{BreakerConfig, DependencyPolicy, Resilience, RetryPolicy};
use chatflow::router::{DomainRouter, RouterError, RouterSettings};
use chatflow::store::{InMemoryConversationStore, InMemoryTenantStore};

fn fast_resilience() -> Arc<Resilience> {
    Arc::new(Resilience::new(DependencyPolicy {
        retry: RetryPolicy {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 1.0,
        },
        call_timeout_ms: 500,
        breaker: BreakerConfig {
            failure_threshold: 100,
            window_secs: 60,
            cooldown_ms: 60_000,
        },
    }))
}

fn build_router(llm: Option<Arc<dyn LlmProvider>>) -> Arc<DomainRouter> {
    let mut disabled = TenantContext::new("dormant", Domain::Medical);
    disabled.enabled = false;

    let tenants = Arc::new(
        InMemoryTenantStore::new()
            .with_tenant(TenantContext::new("clinic", Domain::Medical))
            .with_tenant(TenantContext::new("pharma", Domain::Pharmacy))
            .with_tenant(disabled),
    );
    let resilience = fast_resilience();
    let registry = Arc::new(flows::build_registry().unwrap());
    let services = Arc::new(NodeServices::new(resilience.clone()));

    Arc::new(DomainRouter::new(
        tenants,
        Arc::new(InMemoryConversationStore::new()),
        Arc::new(IdempotencyService::new(Duration::from_secs(60))),
        IntentDetector::new(llm, resilience.clone()),
        StateMachine::new(registry, services),
        resilience,
        RouterSettings::default(),
    ))
}

fn all_text(messages: &[OutboundMessage]) -> String {
    messages
        .iter()
        .map(|m| match m {
            OutboundMessage::Text { text } => text.clone(),
            OutboundMessage::Menu { text, .. } => text.clone(),
            OutboundMessage::Link { text, url } => format!("{} {}", text, url),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn test_unknown_tenant_rejected() {
    let router = build_router(None);

    let err = router
        .handle(InboundEvent::text("ghost", "u1", "m1", "hi"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RouterError::Tenant(TenantError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_disabled_tenant_rejected() {
    let router = build_router(None);

    let err = router
        .handle(InboundEvent::text("dormant", "u1", "m1", "hi"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RouterError::Tenant(TenantError::Disabled(_))
    ));
}

#[tokio::test]
async fn test_malformed_event_rejected() {
    let router = build_router(None);

    let err = router
        .handle(InboundEvent::text("clinic", "u1", "  ", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Input(_)));

    let err = router
        .handle(InboundEvent::text("clinic", "", "m1", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Input(_)));
}

#[tokio::test]
async fn test_global_keyword_overrides_in_progress_flow() {
    let router = build_router(None);

    // Enter the booking flow, then escape with the cancel keyword even
    // though book_date is awaiting a date
    let _ = router
        .handle(InboundEvent::text("clinic", "u1", "m1", "book an appointment"))
        .await
        .unwrap();

    let response = router
        .handle(InboundEvent::text("clinic", "u1", "m2", "cancel"))
        .await
        .unwrap();

    assert!(all_text(&response.outcome.messages).contains("cancel your upcoming appointment"));
}

#[tokio::test]
async fn test_button_payload_routes_without_text() {
    let router = build_router(None);

    // Walk to the confirmation node
    let _ = router
        .handle(InboundEvent::text("clinic", "u2", "m1", "book an appointment"))
        .await
        .unwrap();
    let _ = router
        .handle(InboundEvent::text("clinic", "u2", "m2", "14/03/2026"))
        .await
        .unwrap();

    // A structured button press confirms
    let response = router
        .handle(InboundEvent::button("clinic", "u2", "m3", "yes"))
        .await
        .unwrap();

    assert!(all_text(&response.outcome.messages).contains("You're booked"));
}

#[tokio::test]
async fn test_llm_fallback_routes_ambiguous_text() {
    let llm: Arc<dyn LlmProvider> = Arc::new(ScriptedLlm::always("pay_debt"));
    let router = build_router(Some(llm));

    // No rule matches this, so the LLM's label drives the route
    let response = router
        .handle(InboundEvent::text("pharma", "u3", "m1", "sort out that thing from last month"))
        .await
        .unwrap();

    assert!(all_text(&response.outcome.messages).contains("invoice number"));
}

#[tokio::test]
async fn test_llm_outage_still_answers_event() {
    let llm: Arc<dyn LlmProvider> = Arc::new(ScriptedLlm::scripted(
        vec![
            Err(ProviderError::Unavailable("down".into())),
            Err(ProviderError::Unavailable("down".into())),
        ],
        "",
    ));
    let router = build_router(Some(llm));

    // The NLU dependency failure degrades to no-match routing; the user
    // still gets a reply
    let response = router
        .handle(InboundEvent::text("pharma", "u4", "m1", "sort out that thing"))
        .await
        .unwrap();

    assert!(!response.outcome.messages.is_empty());
    assert!(all_text(&response.outcome.messages).contains("didn't quite get that"));
}

#[tokio::test]
async fn test_conversations_are_isolated_per_channel() {
    let router = build_router(None);

    let _ = router
        .handle(InboundEvent::text("clinic", "alice", "m1", "book an appointment"))
        .await
        .unwrap();

    // Bob's fresh conversation is unaffected by Alice's flow position
    let response = router
        .handle(InboundEvent::text("clinic", "bob", "m2", "hello"))
        .await
        .unwrap();

    assert!(all_text(&response.outcome.messages).contains("How can I help you today?"));
}

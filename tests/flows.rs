//! Domain Flow Integration Tests
//!
//! End-to-end conversations through the router: medical booking and
//! cancellation, pharmacy debt lookup and payment links, amount
//! validation, and dependency-failure routing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatflow::adapters::{
    DebtLedger, ProviderError, StaticLedger, StaticPaymentLinks,
};
use chatflow::domain::{DebtInvoice, Domain, InboundEvent, OutboundMessage, TenantContext};
use chatflow::engine::{NodeServices, StateMachine};
use chatflow::flows;
use chatflow::idempotency::IdempotencyService;
use chatflow::nlu::IntentDetector;
use chatflow::resilience::{BreakerConfig, DependencyPolicy, Resilience, RetryPolicy};
use chatflow::router::{DomainRouter, RouterSettings};
use chatflow::store::{InMemoryConversationStore, InMemoryTenantStore};
use rust_decimal::Decimal;

fn demo_invoice() -> DebtInvoice {
    DebtInvoice {
        reference: "INV-1001".into(),
        balance: Decimal::new(125050, 2),
        currency: "MXN".into(),
        due_date: None,
    }
}

fn build_router(ledger: Arc<dyn DebtLedger>) -> Arc<DomainRouter> {
    let tenants = Arc::new(
        InMemoryTenantStore::new()
            .with_tenant(TenantContext::new("clinic", Domain::Medical))
            .with_tenant(TenantContext::new("pharma", Domain::Pharmacy)),
    );
    // Fast retries so failure tests do not sleep for real
    let resilience = Arc::new(Resilience::new(DependencyPolicy {
        retry: RetryPolicy {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 1.0,
        },
        call_timeout_ms: 1_000,
        breaker: BreakerConfig {
            failure_threshold: 100,
            window_secs: 60,
            cooldown_ms: 60_000,
        },
    }));
    let registry = Arc::new(flows::build_registry().unwrap());
    let services = Arc::new(
        NodeServices::new(resilience.clone())
            .with_payment(Arc::new(StaticPaymentLinks::new("https://pay.test")))
            .with_ledger(ledger),
    );

    Arc::new(DomainRouter::new(
        tenants,
        Arc::new(InMemoryConversationStore::new()),
        Arc::new(IdempotencyService::new(Duration::from_secs(60))),
        IntentDetector::new(None, resilience.clone()),
        StateMachine::new(registry, services),
        resilience,
        RouterSettings::default(),
    ))
}

fn working_ledger() -> Arc<dyn DebtLedger> {
    Arc::new(StaticLedger::new().with_invoice(demo_invoice()))
}

/// Send one text message and collect the replies
async fn say(router: &DomainRouter, tenant: &str, channel: &str, n: u32, text: &str) -> Vec<OutboundMessage> {
    router
        .handle(InboundEvent::text(tenant, channel, format!("m-{n}"), text))
        .await
        .unwrap()
        .outcome
        .messages
}

fn all_text(messages: &[OutboundMessage]) -> String {
    messages
        .iter()
        .map(|m| match m {
            OutboundMessage::Text { text } => text.clone(),
            OutboundMessage::Menu { text, options } => {
                let opts: Vec<String> = options
                    .iter()
                    .map(|o| format!("{}. {}", o.key, o.label))
                    .collect();
                format!("{} {}", text, opts.join(" "))
            }
            OutboundMessage::Link { text, url } => format!("{} {}", text, url),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn test_menu_selection_three_routes_to_cancel_flow() {
    let router = build_router(working_ledger());

    // First contact shows the welcome menu
    let replies = say(&router, "clinic", "u1", 1, "hello").await;
    assert!(all_text(&replies).contains("1. Book an appointment"));

    // "3" selects the Cancel option and enters the cancel flow
    let replies = say(&router, "clinic", "u1", 2, "3").await;
    assert!(all_text(&replies).contains("cancel your upcoming appointment"));
}

#[tokio::test]
async fn test_medical_booking_end_to_end() {
    let router = build_router(working_ledger());

    // Free-text intent routes straight into the booking flow
    let replies = say(&router, "clinic", "u2", 1, "I want to book an appointment").await;
    assert!(all_text(&replies).contains("What date works for you?"));

    // Date is consumed as the awaited slot
    let replies = say(&router, "clinic", "u2", 2, "14/03/2026").await;
    assert!(all_text(&replies).contains("Saturday, 14 March 2026"));

    // Confirmation completes the flow
    let replies = say(&router, "clinic", "u2", 3, "yes").await;
    assert!(all_text(&replies).contains("You're booked for Saturday, 14 March 2026"));

    // The conversation is terminal; the next message starts over
    let replies = say(&router, "clinic", "u2", 4, "hello again").await;
    assert!(all_text(&replies).contains("How can I help you today?"));
}

#[tokio::test]
async fn test_global_keyword_escapes_mid_flow() {
    let router = build_router(working_ledger());

    let _ = say(&router, "clinic", "u3", 1, "book an appointment").await;

    // At book_date the node awaits a date, but "agent" must still escape
    let replies = say(&router, "clinic", "u3", 2, "agent").await;
    assert!(all_text(&replies).contains("connecting you with a member of our team"));
}

#[tokio::test]
async fn test_pharmacy_payment_end_to_end() {
    let router = build_router(working_ledger());

    let replies = say(&router, "pharma", "p1", 1, "hola").await;
    assert!(all_text(&replies).contains("1. Pay an invoice"));

    let replies = say(&router, "pharma", "p1", 2, "1").await;
    assert!(all_text(&replies).contains("invoice number"));

    let replies = say(&router, "pharma", "p1", 3, "INV-1001").await;
    let text = all_text(&replies);
    assert!(text.contains("MXN 1250.50"));
    assert!(text.contains("1. Pay in full"));

    // Partial payment
    let replies = say(&router, "pharma", "p1", 4, "2").await;
    assert!(all_text(&replies).contains("outstanding balance is MXN 1250.50"));

    let replies = say(&router, "pharma", "p1", 5, "150.00").await;
    let text = all_text(&replies);
    assert!(text.contains("payment link for MXN 150.00"));
    assert!(text.contains("https://pay.test/INV-1001"));

    let replies = say(&router, "pharma", "p1", 6, "done").await;
    assert!(all_text(&replies).contains("payment of MXN 150.00 against invoice INV-1001"));
}

#[tokio::test]
async fn test_pharmacy_rejects_overpayment() {
    let router = build_router(working_ledger());

    let _ = say(&router, "pharma", "p2", 1, "hola").await;
    let _ = say(&router, "pharma", "p2", 2, "1").await;
    let _ = say(&router, "pharma", "p2", 3, "INV-1001").await;
    let _ = say(&router, "pharma", "p2", 4, "2").await;

    // More than the balance: rejected, then re-asked
    let replies = say(&router, "pharma", "p2", 5, "99999").await;
    let text = all_text(&replies);
    assert!(text.contains("more than the outstanding balance"));
    assert!(text.contains("How much would you like to pay?"));

    // A valid amount then succeeds
    let replies = say(&router, "pharma", "p2", 6, "100").await;
    assert!(all_text(&replies).contains("payment link for MXN 100.00"));
}

#[tokio::test]
async fn test_pharmacy_full_payment_uses_balance() {
    let router = build_router(working_ledger());

    let _ = say(&router, "pharma", "p3", 1, "1").await;
    // Fresh conversation: "1" has no menu to match yet, so the user gets
    // the welcome menu first
    let _ = say(&router, "pharma", "p3", 2, "1").await;
    let _ = say(&router, "pharma", "p3", 3, "INV-1001").await;

    let replies = say(&router, "pharma", "p3", 4, "1").await;
    assert!(all_text(&replies).contains("payment link for MXN 1250.50"));
}

#[tokio::test]
async fn test_unknown_invoice_reasks_reference() {
    let router = build_router(working_ledger());

    let _ = say(&router, "pharma", "p4", 1, "hola").await;
    let _ = say(&router, "pharma", "p4", 2, "1").await;

    let replies = say(&router, "pharma", "p4", 3, "INV-9999").await;
    let text = all_text(&replies);
    assert!(text.contains("couldn't find an open invoice"));
    assert!(text.contains("invoice number"));
}

/// Ledger whose backend is down
struct DownLedger;

#[async_trait]
impl DebtLedger for DownLedger {
    fn name(&self) -> &str {
        "ledger"
    }

    async fn lookup_invoice(
        &self,
        _tenant_id: &str,
        _channel_id: &str,
        _reference: &str,
    ) -> Result<Option<DebtInvoice>, ProviderError> {
        Err(ProviderError::Unavailable("ledger down".into()))
    }
}

#[tokio::test]
async fn test_ledger_outage_routes_to_service_unavailable() {
    let router = build_router(Arc::new(DownLedger));

    let _ = say(&router, "pharma", "p5", 1, "hola").await;
    let _ = say(&router, "pharma", "p5", 2, "1").await;

    // The lookup fails after retries; the user gets the outage message
    let replies = say(&router, "pharma", "p5", 3, "INV-1001").await;
    assert!(all_text(&replies).contains("technical trouble"));
}

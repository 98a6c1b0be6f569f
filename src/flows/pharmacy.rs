//! Pharmacy flow: debt lookup and payment-link resolution.
//!
//! Invoice and payment data live in conversation slots
//! ([`SlotValue::Invoice`] / [`SlotValue::Payment`]) and are validated and
//! mutated only here.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{
    ConversationState, Domain, MenuOption, OutboundMessage, PaymentSession, SlotValue,
    TenantContext,
};
use crate::engine::node::{AwaitedSlot, NodeBehavior, NodeDefinition, NodeError, NodeOutcome};
use crate::engine::registry::{GraphDefinition, NODE_FALLBACK};
use crate::engine::services::NodeServices;
use crate::nlu::rules::{INTENT_AGENT, INTENT_INVOICE, INTENT_PAY};
use crate::routing::{RoutingDecision, Trigger};

use super::common::{
    fallback_node, handoff_node, service_unavailable_node, NODE_HANDOFF,
};

pub const NODE_WELCOME: &str = "welcome";
pub const NODE_INVOICE_LOOKUP: &str = "invoice_lookup";
pub const NODE_DEBT_SUMMARY: &str = "debt_summary";
pub const NODE_PAY_AMOUNT: &str = "pay_amount";
pub const NODE_CREATE_LINK: &str = "create_link";
pub const NODE_PAYMENT_DONE: &str = "payment_done";

pub const SLOT_INVOICE_REF: &str = "invoice_reference";
pub const SLOT_INVOICE: &str = "invoice";
pub const SLOT_PAYMENT_AMOUNT: &str = "payment_amount";
pub const SLOT_PAYMENT: &str = "payment";

/// Internal chain trigger: re-ask the payment amount after validation
const CHAIN_RETRY_AMOUNT: &str = "retry_amount";

struct WelcomeBehavior;

#[async_trait]
impl NodeBehavior for WelcomeBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        _decision: &RoutingDecision,
        _tenant: &TenantContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::new(state).say(services.formatter.menu(
            "Hi! This is your pharmacy. What do you need?",
            main_menu_options(),
        )))
    }
}

fn main_menu_options() -> Vec<MenuOption> {
    vec![
        MenuOption::new("1", "Pay an invoice"),
        MenuOption::new("2", "Check my balance"),
        MenuOption::new("3", "Talk to an agent"),
    ]
}

struct InvoiceLookupBehavior;

#[async_trait]
impl NodeBehavior for InvoiceLookupBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        decision: &RoutingDecision,
        _tenant: &TenantContext,
        _services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        let text = if decision.trigger == Trigger::NoMatch {
            "Please send the invoice number as it appears on your receipt (e.g. INV-1001)."
        } else {
            "What's your invoice number? (e.g. INV-1001)"
        };
        Ok(NodeOutcome::new(state).say(OutboundMessage::text(text)))
    }
}

struct DebtSummaryBehavior;

#[async_trait]
impl NodeBehavior for DebtSummaryBehavior {
    async fn execute(
        &self,
        mut state: ConversationState,
        _decision: &RoutingDecision,
        tenant: &TenantContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        let reference = state
            .slot(SLOT_INVOICE_REF)
            .and_then(SlotValue::as_text)
            .map(str::to_string)
            .unwrap_or_default();

        let invoice = services
            .lookup_invoice(
                &tenant.tenant_id,
                &state.conversation_id.channel_id,
                &reference,
            )
            .await?;

        match invoice {
            Some(invoice) => {
                let summary = services.formatter.invoice_summary(&invoice);
                state.set_slot(SLOT_INVOICE, SlotValue::Invoice(invoice));

                Ok(NodeOutcome::new(state).say(services.formatter.menu(
                    summary,
                    vec![
                        MenuOption::new("1", "Pay in full"),
                        MenuOption::new("2", "Pay another amount"),
                        MenuOption::new("3", "Back to menu"),
                    ],
                )))
            }
            None => Ok(NodeOutcome::new(state)
                .say(OutboundMessage::text(format!(
                    "I couldn't find an open invoice under \"{}\".",
                    reference
                )))
                .then(Trigger::NoMatch)),
        }
    }
}

struct PayAmountBehavior;

#[async_trait]
impl NodeBehavior for PayAmountBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        decision: &RoutingDecision,
        _tenant: &TenantContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        if decision.trigger == Trigger::NoMatch {
            return Ok(NodeOutcome::new(state).say(OutboundMessage::text(
                "Please send just the amount, like 150.00.",
            )));
        }

        let text = match state.slot(SLOT_INVOICE).and_then(SlotValue::as_invoice) {
            Some(invoice) => format!(
                "How much would you like to pay? The outstanding balance is {}.",
                services.formatter.money(invoice.balance, &invoice.currency)
            ),
            None => "How much would you like to pay?".to_string(),
        };
        Ok(NodeOutcome::new(state).say(OutboundMessage::text(text)))
    }
}

struct CreateLinkBehavior;

impl CreateLinkBehavior {
    /// Amount must be positive and must not exceed the invoice balance
    fn validate(amount: Decimal, balance: Decimal) -> Result<(), String> {
        if amount <= Decimal::ZERO {
            return Err("The amount must be greater than zero.".to_string());
        }
        if amount > balance {
            return Err("That's more than the outstanding balance.".to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl NodeBehavior for CreateLinkBehavior {
    async fn execute(
        &self,
        mut state: ConversationState,
        _decision: &RoutingDecision,
        tenant: &TenantContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        let Some(invoice) = state
            .slot(SLOT_INVOICE)
            .and_then(SlotValue::as_invoice)
            .cloned()
        else {
            return Ok(NodeOutcome::new(state)
                .say(OutboundMessage::text("Let's find your invoice first."))
                .then(Trigger::Keyword("menu".into())));
        };

        // Chosen amount, or the full balance when none was asked for
        let amount = state
            .slot(SLOT_PAYMENT_AMOUNT)
            .and_then(SlotValue::as_amount)
            .unwrap_or(invoice.balance);

        if let Err(problem) = Self::validate(amount, invoice.balance) {
            // Drop the bad amount so a full-balance retry is possible
            state.slots.remove(SLOT_PAYMENT_AMOUNT);
            return Ok(NodeOutcome::new(state)
                .say(OutboundMessage::text(format!(
                    "{} The outstanding balance is {}.",
                    problem,
                    services.formatter.money(invoice.balance, &invoice.currency)
                )))
                .then(Trigger::Keyword(CHAIN_RETRY_AMOUNT.into())));
        }

        if !tenant.flags.payment_links_enabled {
            return Ok(NodeOutcome::new(state).say(OutboundMessage::text(
                "Online payment isn't available here yet. Reply \"agent\" and we'll sort it out.",
            )));
        }

        // Re-entering this node re-sends the existing link instead of
        // creating a second one for the same amount.
        let existing = state
            .slot(SLOT_PAYMENT)
            .and_then(SlotValue::as_payment)
            .filter(|session| {
                session.amount == amount && session.invoice_reference == invoice.reference
            })
            .and_then(|session| session.link_url.clone());

        let url = match existing {
            Some(url) => url,
            None => {
                services
                    .payment_link(amount, &invoice.currency, &invoice.reference)
                    .await?
            }
        };

        state.set_slot(
            SLOT_PAYMENT,
            SlotValue::Payment(PaymentSession {
                invoice_reference: invoice.reference.clone(),
                amount,
                currency: invoice.currency.clone(),
                link_url: Some(url.clone()),
            }),
        );

        Ok(NodeOutcome::new(state)
            .say(OutboundMessage::link(
                format!(
                    "Here's your secure payment link for {}:",
                    services.formatter.money(amount, &invoice.currency)
                ),
                url,
            ))
            .say(services.formatter.menu(
                "Let me know once you've paid.",
                vec![
                    MenuOption::new("done", "I've paid"),
                    MenuOption::new("cancel", "Cancel"),
                ],
            )))
    }
}

struct PaymentDoneBehavior;

#[async_trait]
impl NodeBehavior for PaymentDoneBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        _decision: &RoutingDecision,
        _tenant: &TenantContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        let text = match state.slot(SLOT_PAYMENT).and_then(SlotValue::as_payment) {
            Some(session) => format!(
                "Thanks! We've recorded your payment of {} against invoice {}. Your receipt is on its way.",
                services.formatter.money(session.amount, &session.currency),
                session.invoice_reference
            ),
            None => "Thanks! We've recorded your payment.".to_string(),
        };
        Ok(NodeOutcome::new(state).say(OutboundMessage::text(text)))
    }
}

/// The pharmacy debt-resolution graph
pub fn graph() -> GraphDefinition {
    let mut global = BTreeMap::new();
    global.insert("keyword:cancel".into(), NODE_WELCOME.into());
    global.insert("keyword:agent".into(), NODE_HANDOFF.into());
    global.insert("keyword:menu".into(), NODE_WELCOME.into());
    global.insert(format!("intent:{}", INTENT_PAY), NODE_INVOICE_LOOKUP.into());
    global.insert(
        format!("intent:{}", INTENT_INVOICE),
        NODE_INVOICE_LOOKUP.into(),
    );
    global.insert(format!("intent:{}", INTENT_AGENT), NODE_HANDOFF.into());

    let nodes = vec![
        NodeDefinition::new(NODE_WELCOME, NODE_FALLBACK, Arc::new(WelcomeBehavior))
            .with_options(main_menu_options())
            .with_transition("menu:1", NODE_INVOICE_LOOKUP)
            .with_transition("menu:2", NODE_INVOICE_LOOKUP)
            .with_transition("menu:3", NODE_HANDOFF),
        NodeDefinition::new(
            NODE_INVOICE_LOOKUP,
            NODE_INVOICE_LOOKUP,
            Arc::new(InvoiceLookupBehavior),
        )
        .with_awaits(AwaitedSlot::text(SLOT_INVOICE_REF))
        .with_transition("await", NODE_DEBT_SUMMARY),
        NodeDefinition::new(
            NODE_DEBT_SUMMARY,
            NODE_INVOICE_LOOKUP,
            Arc::new(DebtSummaryBehavior),
        )
        .with_options(vec![
            MenuOption::new("1", "Pay in full"),
            MenuOption::new("2", "Pay another amount"),
            MenuOption::new("3", "Back to menu"),
        ])
        .with_transition("menu:1", NODE_CREATE_LINK)
        .with_transition("menu:2", NODE_PAY_AMOUNT)
        .with_transition("menu:3", NODE_WELCOME),
        NodeDefinition::new(NODE_PAY_AMOUNT, NODE_PAY_AMOUNT, Arc::new(PayAmountBehavior))
            .with_awaits(AwaitedSlot::amount(SLOT_PAYMENT_AMOUNT))
            .with_transition("await", NODE_CREATE_LINK),
        NodeDefinition::new(NODE_CREATE_LINK, NODE_CREATE_LINK, Arc::new(CreateLinkBehavior))
            .with_options(vec![
                MenuOption::new("done", "I've paid"),
                MenuOption::new("cancel", "Cancel"),
            ])
            .with_transition("menu:done", NODE_PAYMENT_DONE)
            .with_transition("menu:cancel", NODE_WELCOME)
            .with_transition("button:paid", NODE_PAYMENT_DONE)
            .with_transition(format!("keyword:{}", CHAIN_RETRY_AMOUNT), NODE_PAY_AMOUNT),
        NodeDefinition::new(
            NODE_PAYMENT_DONE,
            NODE_WELCOME,
            Arc::new(PaymentDoneBehavior),
        )
        .terminal(),
        fallback_node(),
        handoff_node(),
        service_unavailable_node(NODE_WELCOME),
    ];

    GraphDefinition {
        domain: Domain::Pharmacy,
        entry: NODE_WELCOME.into(),
        global_transitions: global,
        nodes,
    }
}

//! Medical appointment flow: booking, rescheduling, cancellation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    ConversationState, Domain, MenuOption, OutboundMessage, SlotValue, TenantContext,
};
use crate::engine::node::{AwaitedSlot, NodeBehavior, NodeDefinition, NodeError, NodeOutcome};
use crate::engine::registry::{GraphDefinition, NODE_FALLBACK};
use crate::engine::services::NodeServices;
use crate::nlu::rules::{INTENT_AGENT, INTENT_BOOK, INTENT_CANCEL, INTENT_RESCHEDULE};
use crate::routing::{RoutingDecision, Trigger};

use super::common::{
    fallback_node, handoff_node, service_unavailable_node, yes_no_options, NODE_HANDOFF,
};

pub const NODE_WELCOME: &str = "welcome";
pub const NODE_BOOK_DATE: &str = "book_date";
pub const NODE_BOOK_CONFIRM: &str = "book_confirm";
pub const NODE_BOOK_DONE: &str = "book_done";
pub const NODE_RESCHEDULE_LOOKUP: &str = "reschedule_lookup";
pub const NODE_RESCHEDULE_DATE: &str = "reschedule_date";
pub const NODE_CANCEL_CONFIRM: &str = "cancel_confirm";
pub const NODE_CANCEL_DONE: &str = "cancel_done";

pub const SLOT_APPOINTMENT_DATE: &str = "appointment_date";
pub const SLOT_APPOINTMENT_REF: &str = "appointment_reference";

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
            "Hi! How can I help you today?",
            main_menu_options(),
        )))
    }
}

fn main_menu_options() -> Vec<MenuOption> {
    vec![
        MenuOption::new("1", "Book an appointment"),
        MenuOption::new("2", "Reschedule an appointment"),
        MenuOption::new("3", "Cancel an appointment"),
    ]
}

/// Asks for (and re-asks after unreadable input) the appointment date
struct AskDateBehavior {
    prompt: &'static str,
}

#[async_trait]
impl NodeBehavior for AskDateBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        decision: &RoutingDecision,
        _tenant: &TenantContext,
        _services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        let text = if decision.trigger == Trigger::NoMatch {
            "Sorry, I couldn't read that as a date. Please use DD/MM/YYYY.".to_string()
        } else {
            self.prompt.to_string()
        };
        Ok(NodeOutcome::new(state).say(OutboundMessage::text(text)))
    }
}

struct BookConfirmBehavior;

#[async_trait]
impl NodeBehavior for BookConfirmBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        _decision: &RoutingDecision,
        _tenant: &TenantContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        let message = match state.slot(SLOT_APPOINTMENT_DATE).and_then(SlotValue::as_date) {
            Some(date) => services.formatter.menu(
                format!(
                    "Confirm your appointment for {}?",
                    services.formatter.date(date)
                ),
                yes_no_options(),
            ),
            None => OutboundMessage::text(
                "I don't have a date yet. Please send one as DD/MM/YYYY.",
            ),
        };
        Ok(NodeOutcome::new(state).say(message))
    }
}

struct BookDoneBehavior;

#[async_trait]
impl NodeBehavior for BookDoneBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        _decision: &RoutingDecision,
        _tenant: &TenantContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        let text = match state.slot(SLOT_APPOINTMENT_DATE).and_then(SlotValue::as_date) {
            Some(date) => format!(
                "You're booked for {}. See you then!",
                services.formatter.date(date)
            ),
            None => "Your appointment is booked. See you then!".to_string(),
        };
        Ok(NodeOutcome::new(state).say(OutboundMessage::text(text)))
    }
}

struct RescheduleLookupBehavior;

#[async_trait]
impl NodeBehavior for RescheduleLookupBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        decision: &RoutingDecision,
        _tenant: &TenantContext,
        _services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        let text = if decision.trigger == Trigger::NoMatch {
            "Please send the reference number from your confirmation message."
        } else {
            "What's your appointment reference number?"
        };
        Ok(NodeOutcome::new(state).say(OutboundMessage::text(text)))
    }
}

struct CancelConfirmBehavior;

#[async_trait]
impl NodeBehavior for CancelConfirmBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        _decision: &RoutingDecision,
        _tenant: &TenantContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::new(state).say(services.formatter.menu(
            "Do you want to cancel your upcoming appointment?",
            yes_no_options(),
        )))
    }
}

struct CancelDoneBehavior;

#[async_trait]
impl NodeBehavior for CancelDoneBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        _decision: &RoutingDecision,
        _tenant: &TenantContext,
        _services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::new(state).say(OutboundMessage::text(
            "Your appointment has been cancelled. Send us a message any time to book a new one.",
        )))
    }
}

/// The medical appointment graph
pub fn graph() -> GraphDefinition {
    let mut global = BTreeMap::new();
    global.insert("keyword:cancel".into(), NODE_CANCEL_CONFIRM.into());
    global.insert("keyword:agent".into(), NODE_HANDOFF.into());
    global.insert("keyword:menu".into(), NODE_WELCOME.into());
    global.insert(format!("intent:{}", INTENT_BOOK), NODE_BOOK_DATE.into());
    global.insert(
        format!("intent:{}", INTENT_RESCHEDULE),
        NODE_RESCHEDULE_LOOKUP.into(),
    );
    global.insert(
        format!("intent:{}", INTENT_CANCEL),
        NODE_CANCEL_CONFIRM.into(),
    );
    global.insert(format!("intent:{}", INTENT_AGENT), NODE_HANDOFF.into());

    let nodes = vec![
        NodeDefinition::new(NODE_WELCOME, NODE_FALLBACK, Arc::new(WelcomeBehavior))
            .with_options(main_menu_options())
            .with_transition("menu:1", NODE_BOOK_DATE)
            .with_transition("menu:2", NODE_RESCHEDULE_LOOKUP)
            .with_transition("menu:3", NODE_CANCEL_CONFIRM),
        NodeDefinition::new(
            NODE_BOOK_DATE,
            NODE_BOOK_DATE,
            Arc::new(AskDateBehavior {
                prompt: "What date works for you? (DD/MM/YYYY)",
            }),
        )
        .with_awaits(AwaitedSlot::date(SLOT_APPOINTMENT_DATE))
        .with_transition("await", NODE_BOOK_CONFIRM),
        NodeDefinition::new(
            NODE_BOOK_CONFIRM,
            NODE_BOOK_CONFIRM,
            Arc::new(BookConfirmBehavior),
        )
        .with_options(yes_no_options())
        .with_transition("menu:yes", NODE_BOOK_DONE)
        .with_transition("menu:no", NODE_BOOK_DATE)
        .with_transition("button:yes", NODE_BOOK_DONE)
        .with_transition("button:no", NODE_BOOK_DATE),
        NodeDefinition::new(NODE_BOOK_DONE, NODE_WELCOME, Arc::new(BookDoneBehavior)).terminal(),
        NodeDefinition::new(
            NODE_RESCHEDULE_LOOKUP,
            NODE_RESCHEDULE_LOOKUP,
            Arc::new(RescheduleLookupBehavior),
        )
        .with_awaits(AwaitedSlot::text(SLOT_APPOINTMENT_REF))
        .with_transition("await", NODE_RESCHEDULE_DATE),
        NodeDefinition::new(
            NODE_RESCHEDULE_DATE,
            NODE_RESCHEDULE_DATE,
            Arc::new(AskDateBehavior {
                prompt: "What new date works for you? (DD/MM/YYYY)",
            }),
        )
        .with_awaits(AwaitedSlot::date(SLOT_APPOINTMENT_DATE))
        .with_transition("await", NODE_BOOK_CONFIRM),
        NodeDefinition::new(
            NODE_CANCEL_CONFIRM,
            NODE_CANCEL_CONFIRM,
            Arc::new(CancelConfirmBehavior),
        )
        .with_options(yes_no_options())
        .with_transition("menu:yes", NODE_CANCEL_DONE)
        .with_transition("menu:no", NODE_WELCOME)
        .with_transition("button:yes", NODE_CANCEL_DONE)
        .with_transition("button:no", NODE_WELCOME),
        NodeDefinition::new(NODE_CANCEL_DONE, NODE_WELCOME, Arc::new(CancelDoneBehavior))
            .terminal(),
        fallback_node(),
        handoff_node(),
        service_unavailable_node(NODE_WELCOME),
    ];

    GraphDefinition {
        domain: Domain::Medical,
        entry: NODE_WELCOME.into(),
        global_transitions: global,
        nodes,
    }
}

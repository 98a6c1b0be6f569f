//! Routing handler chain.
//!
//! An ordered, short-circuiting list of matchers converts NLU output plus
//! the raw inbound payload into exactly one [`RoutingDecision`]. Priority
//! is data: the chain is an explicit `Vec` in fixed order, evaluation stops
//! at the first match, and an exhausted chain yields `no-match` (which the
//! state machine routes to the node's declared fallback, never dropping
//! the event).

pub mod handlers;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ConversationState, InboundPayload, SlotValue, TenantContext};
use crate::engine::node::NodeDefinition;
use crate::nlu::NluResult;

pub use handlers::{
    AwaitedInputHandler, ButtonSelectionHandler, GlobalKeywordHandler, IntentOverrideHandler,
    MenuOptionHandler,
};

/// The resolved routing signal driving a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Trigger {
    /// Detected intent label
    Intent(String),

    /// Tenant-wide keyword trigger name
    Keyword(String),

    /// Structured button id
    Button(String),

    /// Menu option key declared by the current node
    Menu(String),

    /// Raw input consumed as the node's awaited slot
    AwaitedInput,

    /// Nothing matched; routed to the node's fallback transition
    NoMatch,
}

impl Trigger {
    /// Canonical key used in node transition tables
    pub fn key(&self) -> String {
        match self {
            Trigger::Intent(name) => format!("intent:{}", name),
            Trigger::Keyword(name) => format!("keyword:{}", name),
            Trigger::Button(id) => format!("button:{}", id),
            Trigger::Menu(key) => format!("menu:{}", key),
            Trigger::AwaitedInput => "await".to_string(),
            Trigger::NoMatch => "no-match".to_string(),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Outcome of the handler chain for one inbound event. Transient: produced
/// fresh per event, never persisted.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub trigger: Trigger,

    /// Confidence of the match in [0, 1]
    pub confidence: f32,

    /// Which handler produced this decision
    pub matched_by: &'static str,

    /// Parsed slot value for awaited input, resolved label for menus
    pub value: Option<SlotValue>,
}

impl RoutingDecision {
    pub fn new(trigger: Trigger, confidence: f32, matched_by: &'static str) -> Self {
        Self {
            trigger,
            confidence,
            matched_by,
            value: None,
        }
    }

    pub fn with_value(mut self, value: SlotValue) -> Self {
        self.value = Some(value);
        self
    }

    /// The decision an exhausted chain yields
    pub fn no_match() -> Self {
        Self::new(Trigger::NoMatch, 0.0, "none")
    }
}

/// Everything a matcher may consult
pub struct MatchContext<'a> {
    pub payload: &'a InboundPayload,
    pub nlu: &'a NluResult,
    pub state: &'a ConversationState,

    /// Definition of the node awaiting this event, if the conversation has
    /// one (fresh conversations have none until the first step)
    pub node: Option<&'a NodeDefinition>,

    pub tenant: &'a TenantContext,
}

impl<'a> MatchContext<'a> {
    /// Free text of the payload, trimmed, if any
    pub fn text(&self) -> Option<&'a str> {
        match self.payload {
            InboundPayload::Text { text } => Some(text.trim()),
            InboundPayload::Button { .. } => None,
        }
    }
}

/// A single matcher in the chain
pub trait RouteMatcher: Send + Sync {
    /// Handler name recorded on decisions it produces
    fn name(&self) -> &'static str;

    fn try_match(&self, cx: &MatchContext<'_>) -> Option<RoutingDecision>;
}

/// The ordered, short-circuiting chain
pub struct HandlerChain {
    handlers: Vec<Box<dyn RouteMatcher>>,
}

impl HandlerChain {
    /// The fixed production order: global keyword, intent override, button
    /// selection, menu option, awaited input.
    pub fn standard() -> Self {
        Self {
            handlers: vec![
                Box::new(GlobalKeywordHandler),
                Box::new(IntentOverrideHandler),
                Box::new(ButtonSelectionHandler),
                Box::new(MenuOptionHandler),
                Box::new(AwaitedInputHandler),
            ],
        }
    }

    /// A custom chain (tests, tenant experiments). Order is priority.
    pub fn new(handlers: Vec<Box<dyn RouteMatcher>>) -> Self {
        Self { handlers }
    }

    /// Evaluate the chain; always returns a decision.
    pub fn resolve(&self, cx: &MatchContext<'_>) -> RoutingDecision {
        for handler in &self.handlers {
            if let Some(decision) = handler.try_match(cx) {
                debug!(
                    matched_by = handler.name(),
                    trigger = %decision.trigger,
                    confidence = decision.confidence,
                    "Routing decision"
                );
                return decision;
            }
        }
        RoutingDecision::no_match()
    }
}

//! Node capability and declarative node definitions.
//!
//! A node couples a declarative shell (name, transition table, menu
//! options, awaited slot, terminal flag) with a [`NodeBehavior`]
//! implementation. Definitions are registered once at startup and never
//! mutated afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ConversationState, MenuOption, OutboundMessage, TenantContext};
use crate::resilience::ResilienceError;
use crate::routing::{RoutingDecision, Trigger};

use super::services::NodeServices;

/// Kind of value an awaiting node expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Text,
    Date,
    Amount,
}

/// Slot a node waits for before it can proceed
#[derive(Debug, Clone)]
pub struct AwaitedSlot {
    pub name: String,
    pub kind: SlotKind,
}

impl AwaitedSlot {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Text,
        }
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Date,
        }
    }

    pub fn amount(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Amount,
        }
    }
}

/// Failures a node behavior may surface.
///
/// Domain-level ambiguity never becomes an error: behaviors absorb it into
/// messages and fallback triggers. What remains is dependency trouble,
/// which the state machine routes to the service-unavailable node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Dependency(#[from] ResilienceError),

    #[error("Node requires an unconfigured service: {0}")]
    Unconfigured(&'static str),
}

/// Result of executing one node
#[derive(Debug)]
pub struct NodeOutcome {
    /// The conversation's new persisted state
    pub state: ConversationState,

    /// Ordered replies for the user's channel
    pub messages: Vec<OutboundMessage>,

    /// At most one immediate chain into another node within the same
    /// inbound event
    pub next_trigger: Option<Trigger>,
}

impl NodeOutcome {
    pub fn new(state: ConversationState) -> Self {
        Self {
            state,
            messages: Vec::new(),
            next_trigger: None,
        }
    }

    pub fn say(mut self, message: OutboundMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn then(mut self, trigger: Trigger) -> Self {
        self.next_trigger = Some(trigger);
        self
    }
}

/// The single capability all nodes implement.
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    async fn execute(
        &self,
        state: ConversationState,
        decision: &RoutingDecision,
        tenant: &TenantContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError>;
}

/// Behavior that leaves state untouched and says nothing (structural
/// nodes, tests)
pub struct NoopBehavior;

#[async_trait]
impl NodeBehavior for NoopBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        _decision: &RoutingDecision,
        _tenant: &TenantContext,
        _services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::new(state))
    }
}

/// Declarative node definition registered into the [`super::NodeRegistry`].
#[derive(Clone)]
pub struct NodeDefinition {
    /// Unique node name within its graph
    pub name: String,

    /// Trigger key -> target node name (see [`Trigger::key`])
    pub transitions: BTreeMap<String, String>,

    /// Target for `no-match` and invalid triggers; every node must declare
    /// one (fallback completeness is validated at startup)
    pub fallback: String,

    /// Menu options the node presents, matched by the menu-option handler
    pub options: Vec<MenuOption>,

    /// Slot the node waits for, consumed by the awaited-input handler
    pub awaits: Option<AwaitedSlot>,

    /// Terminal nodes set the conversation's terminal flag
    pub terminal: bool,

    pub behavior: Arc<dyn NodeBehavior>,
}

impl NodeDefinition {
    pub fn new(
        name: impl Into<String>,
        fallback: impl Into<String>,
        behavior: Arc<dyn NodeBehavior>,
    ) -> Self {
        Self {
            name: name.into(),
            transitions: BTreeMap::new(),
            fallback: fallback.into(),
            options: Vec::new(),
            awaits: None,
            terminal: false,
            behavior,
        }
    }

    /// A definition with no behavior of its own (structural nodes, tests)
    pub fn passive(name: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self::new(name, fallback, Arc::new(NoopBehavior))
    }

    pub fn with_transition(
        mut self,
        trigger_key: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.transitions.insert(trigger_key.into(), target.into());
        self
    }

    pub fn with_options(mut self, options: Vec<MenuOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_awaits(mut self, awaits: AwaitedSlot) -> Self {
        self.awaits = Some(awaits);
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Declared target for a trigger, if the node's own table has one
    pub fn target_for(&self, trigger: &Trigger) -> Option<&str> {
        self.transitions.get(&trigger.key()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_lookup() {
        let node = NodeDefinition::passive("welcome", "fallback")
            .with_transition("menu:1", "book_date")
            .with_transition("intent:cancel_appointment", "cancel_confirm");

        assert_eq!(node.target_for(&Trigger::Menu("1".into())), Some("book_date"));
        assert_eq!(
            node.target_for(&Trigger::Intent("cancel_appointment".into())),
            Some("cancel_confirm")
        );
        assert_eq!(node.target_for(&Trigger::Menu("9".into())), None);
    }

    #[test]
    fn test_builder_flags() {
        let node = NodeDefinition::passive("done", "done")
            .with_awaits(AwaitedSlot::amount("payment_amount"))
            .terminal();

        assert!(node.terminal);
        assert_eq!(node.awaits.as_ref().unwrap().kind, SlotKind::Amount);
    }
}
